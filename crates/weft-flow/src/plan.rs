//! Invocation planning: how many workers to start, and from where.
//!
//! A coordinator pass turns measured backlogs into per-component
//! invocation counts, then packs those counts into what it can issue
//! itself (`local`) and bins handed to invoker instances (`remote`).
//!
//! Counts are divided across the coordinator fleet rounding *up*: when
//! several coordinators run in lock step each contributes its share, and
//! over-pursuit is tolerated over under-pursuit because under-pursuit
//! strands messages.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use weft_core::config::AppConfig;

use crate::status::ApplicationStatus;

/// How many invocations one component receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationCount {
    /// Component name.
    pub name: String,
    /// Number of worker invocations to issue.
    pub count: u32,
}

impl InvocationCount {
    /// Creates a count entry.
    #[must_use]
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// A coordinator pass's dispatch plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationPlan {
    /// Counts this instance issues directly.
    pub local: Vec<InvocationCount>,
    /// Bins handed to invoker instances, one invocation each.
    pub remote: Vec<Vec<InvocationCount>>,
}

impl InvocationPlan {
    /// Returns true when there is nothing to dispatch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }

    /// Total worker invocations across local and remote counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        total(&self.local) + self.remote.iter().map(|bin| total(bin)).sum::<u64>()
    }
}

fn total(counts: &[InvocationCount]) -> u64 {
    counts.iter().map(|c| u64::from(c.count)).sum()
}

/// Computes this coordinator's share of pending work.
///
/// For each message-consuming component with both measurements present:
/// clamp the backlog to the remaining concurrency headroom, then divide by
/// the coordinator fleet size rounding up. Components with failed
/// measurements are skipped for this pass.
#[must_use]
pub fn desired_counts(config: &AppConfig, status: &ApplicationStatus) -> Vec<InvocationCount> {
    let fleet = u64::from(config.coordinator.coordinator_concurrency.max(1));
    let mut counts = Vec::new();

    for component in config.components.iter().filter(|c| c.is_from_message()) {
        let Some(measured) = status.component(&component.name) else {
            continue;
        };
        let (Some(queued), Some(concurrency)) = (measured.queued_messages, measured.concurrency)
        else {
            continue;
        };

        let headroom = u64::from(component.max_concurrency()).saturating_sub(concurrency);
        let wanted = queued.min(headroom);
        let share = wanted.div_ceil(fleet);
        if share > 0 {
            let count = u32::try_from(share).unwrap_or(u32::MAX);
            counts.push(InvocationCount::new(component.name.clone(), count));
        }
    }

    counts
}

/// Packs counts into a plan bounded by `max_batch` invocations per issuer.
///
/// When the total fits the batch, everything is local. Otherwise bins of
/// exactly `max_batch` are filled greedily (splitting oversized
/// per-component counts across bins) until either the remainder fits
/// alongside the remote invokes themselves (it becomes local) or
/// `max_batch − 1` bins exist, in which case the remainder ships as one
/// final remote bin.
#[must_use]
pub fn split(counts: Vec<InvocationCount>, max_batch: u32) -> InvocationPlan {
    let max_batch = max_batch.max(1);
    let batch = u64::from(max_batch);
    if total(&counts) <= batch {
        return InvocationPlan {
            local: counts,
            remote: Vec::new(),
        };
    }

    let mut remaining: VecDeque<InvocationCount> =
        counts.into_iter().filter(|c| c.count > 0).collect();
    let mut plan = InvocationPlan::default();

    loop {
        let left: u64 = remaining.iter().map(|c| u64::from(c.count)).sum();
        if left == 0 {
            break;
        }
        // Enough capacity left to invoke the accumulated remote invokers
        // and still run the remainder here.
        if left <= batch.saturating_sub(plan.remote.len() as u64) {
            plan.local = remaining.into_iter().collect();
            break;
        }
        // The batch is exhausted by invoker invokes alone; everything
        // left rides in one final bin.
        if plan.remote.len() as u64 == batch - 1 {
            plan.remote.push(remaining.into_iter().collect());
            break;
        }
        plan.remote.push(fill_bin(&mut remaining, max_batch));
    }

    plan
}

fn fill_bin(remaining: &mut VecDeque<InvocationCount>, max_batch: u32) -> Vec<InvocationCount> {
    let mut bin = Vec::new();
    let mut room = max_batch;
    while room > 0 {
        let Some(front) = remaining.front_mut() else {
            break;
        };
        let take = front.count.min(room);
        bin.push(InvocationCount::new(front.name.clone(), take));
        front.count -= take;
        room -= take;
        if front.count == 0 {
            remaining.pop_front();
        }
    }
    bin
}

/// Computes the full plan for one coordinator pass.
#[must_use]
pub fn plan(config: &AppConfig, status: &ApplicationStatus) -> InvocationPlan {
    split(
        desired_counts(config, status),
        config.coordinator.max_invocation_count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(entries: &[(&str, u32)]) -> Vec<InvocationCount> {
        entries
            .iter()
            .map(|(name, count)| InvocationCount::new(*name, *count))
            .collect()
    }

    #[test]
    fn small_total_stays_local() {
        let plan = split(counts(&[("a", 2), ("b", 3)]), 6);
        assert_eq!(plan.local, counts(&[("a", 2), ("b", 3)]));
        assert!(plan.remote.is_empty());
    }

    #[test]
    fn oversized_component_splits_across_bins() {
        // Raw counts a:12, b:1, c:2 with a batch of 6: two full bins of a,
        // and the remainder (3) fits locally beside the two invoker calls.
        let plan = split(counts(&[("a", 12), ("b", 1), ("c", 2)]), 6);
        assert_eq!(
            plan.remote,
            vec![counts(&[("a", 6)]), counts(&[("a", 6)])]
        );
        assert_eq!(plan.local, counts(&[("b", 1), ("c", 2)]));
    }

    #[test]
    fn bins_sum_to_exactly_the_batch() {
        let plan = split(counts(&[("a", 4), ("b", 4), ("c", 4)]), 5);
        for bin in &plan.remote {
            assert_eq!(bin.iter().map(|c| c.count).sum::<u32>(), 5);
        }
        assert_eq!(plan.total(), 12);
    }

    #[test]
    fn remainder_too_big_for_local_ships_as_final_bin() {
        // Batch 3: after two bins (batch − 1) the remainder of 2 exceeds
        // the remaining capacity of 1, so it rides as one last bin.
        let plan = split(counts(&[("a", 8)]), 3);
        assert_eq!(plan.remote.len(), 3);
        assert_eq!(plan.remote[0], counts(&[("a", 3)]));
        assert_eq!(plan.remote[1], counts(&[("a", 3)]));
        assert_eq!(plan.remote[2], counts(&[("a", 2)]));
        assert!(plan.local.is_empty());
    }

    #[test]
    fn conserves_total_count() {
        let entries = counts(&[("a", 17), ("b", 9), ("c", 1), ("d", 30)]);
        let before: u64 = entries.iter().map(|c| u64::from(c.count)).sum();
        let plan = split(entries, 10);
        assert_eq!(plan.total(), before);
    }

    mod desired {
        use super::*;
        use crate::status::{ApplicationStatus, ComponentStatus};
        use weft_core::config::AppConfig;

        fn config(fleet: u32) -> AppConfig {
            AppConfig::from_json(&format!(
                r#"{{
                    "name": "pipeline",
                    "version": "1",
                    "deployId": 1,
                    "deployment": {{"region": "us-east-1", "s3Bucket": "b", "s3KeyPrefix": "p"}},
                    "coordinator": {{
                        "coordinatorConcurrency": {fleet},
                        "maxApiConcurrency": 4,
                        "maxInvocationCount": 6,
                        "minInterval": 10
                    }},
                    "roles": [{{"name": "worker"}}],
                    "components": [{{
                        "name": "ingest",
                        "kind": "fromMessage",
                        "worker": {{"handler": "h", "memory": 256, "timeout": 30, "role": "worker"}},
                        "maxConcurrency": 10,
                        "queueWaitSeconds": 0
                    }}]
                }}"#
            ))
            .expect("fixture should parse")
        }

        fn status(concurrency: Option<u64>, queued: Option<u64>) -> ApplicationStatus {
            let mut status = ApplicationStatus::default();
            status.components.insert(
                "ingest".into(),
                ComponentStatus {
                    concurrency,
                    queued_messages: queued,
                },
            );
            status
        }

        #[test]
        fn clamps_to_headroom() {
            let counts = desired_counts(&config(1), &status(Some(7), Some(100)));
            assert_eq!(counts, vec![InvocationCount::new("ingest", 3)]);
        }

        #[test]
        fn backlog_smaller_than_headroom_wins() {
            let counts = desired_counts(&config(1), &status(Some(0), Some(4)));
            assert_eq!(counts, vec![InvocationCount::new("ingest", 4)]);
        }

        #[test]
        fn share_rounds_up_across_the_fleet() {
            let counts = desired_counts(&config(3), &status(Some(0), Some(7)));
            assert_eq!(counts, vec![InvocationCount::new("ingest", 3)]);
        }

        #[test]
        fn failed_measurements_are_skipped() {
            assert!(desired_counts(&config(1), &status(None, Some(5))).is_empty());
            assert!(desired_counts(&config(1), &status(Some(2), None)).is_empty());
            assert!(desired_counts(&config(1), &ApplicationStatus::default()).is_empty());
        }

        #[test]
        fn saturated_component_yields_nothing() {
            let counts = desired_counts(&config(1), &status(Some(10), Some(50)));
            assert!(counts.is_empty());
        }
    }
}
