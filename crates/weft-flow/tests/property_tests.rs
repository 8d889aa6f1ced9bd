//! Property-based tests for plan invariants.
//!
//! These tests use proptest to verify the splitter's invariants hold
//! across randomly generated inputs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use proptest::prelude::*;

use weft_flow::plan::{desired_counts, split, InvocationCount};
use weft_flow::status::{ApplicationStatus, ComponentStatus};
use weft_test_utils::pipeline_config;

fn arb_counts() -> impl Strategy<Value = Vec<InvocationCount>> {
    prop::collection::vec(0u32..40, 0..8).prop_map(|counts| {
        counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| InvocationCount::new(format!("c{i}"), count))
            .collect()
    })
}

fn totals_by_name(counts: &[InvocationCount]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for count in counts {
        *totals.entry(count.name.clone()).or_insert(0) += u64::from(count.count);
    }
    totals
}

proptest! {
    #[test]
    fn split_conserves_every_component(counts in arb_counts(), batch in 1u32..12) {
        let before = totals_by_name(&counts);
        let plan = split(counts, batch);

        let mut after = totals_by_name(&plan.local);
        for bin in &plan.remote {
            for (name, total) in totals_by_name(bin) {
                *after.entry(name).or_insert(0) += total;
            }
        }
        // Zero-count entries may be dropped during packing but carry no work.
        for (name, total) in before.iter().filter(|(_, total)| **total > 0) {
            prop_assert_eq!(after.get(name), Some(total));
        }
    }

    #[test]
    fn local_counts_fit_one_batch(counts in arb_counts(), batch in 1u32..12) {
        let plan = split(counts, batch);
        let local: u64 = plan.local.iter().map(|c| u64::from(c.count)).sum();
        prop_assert!(local <= u64::from(batch));
    }

    #[test]
    fn every_bin_but_the_last_is_exactly_full(counts in arb_counts(), batch in 1u32..12) {
        let plan = split(counts, batch);
        for (index, bin) in plan.remote.iter().enumerate() {
            let sum: u64 = bin.iter().map(|c| u64::from(c.count)).sum();
            if index + 1 < plan.remote.len() {
                prop_assert_eq!(sum, u64::from(batch));
            }
        }
        // Remote invokes themselves never exceed one batch either.
        prop_assert!(plan.remote.len() <= batch as usize);
    }

    #[test]
    fn small_totals_never_go_remote(counts in arb_counts(), batch in 1u32..12) {
        let total: u64 = counts.iter().map(|c| u64::from(c.count)).sum();
        let plan = split(counts, batch);
        if total <= u64::from(batch) {
            prop_assert!(plan.remote.is_empty());
        }
    }

    #[test]
    fn share_respects_headroom_after_ceiling_division(
        queued in 0u64..200,
        concurrency in 0u64..30,
        fleet in 1u32..6,
    ) {
        let mut config = pipeline_config();
        config.coordinator.coordinator_concurrency = fleet;

        let mut status = ApplicationStatus::default();
        status.components.insert(
            "ingest".into(),
            ComponentStatus {
                concurrency: Some(concurrency),
                queued_messages: Some(queued),
            },
        );

        let counts = desired_counts(&config, &status);
        let headroom = 10u64.saturating_sub(concurrency);
        let wanted = queued.min(headroom);
        let expected_share = wanted.div_ceil(u64::from(fleet));

        match counts.as_slice() {
            [] => prop_assert_eq!(expected_share, 0),
            [only] => {
                prop_assert_eq!(only.name.as_str(), "ingest");
                prop_assert_eq!(u64::from(only.count), expected_share);
            }
            other => prop_assert!(false, "unexpected counts: {other:?}"),
        }
    }
}
