//! Routing engine: delivering worker results downstream.
//!
//! A component's routing rule turns a completion's `(error, result)` pair
//! into `{target, payload}` dispatches. Name-based rules never propagate
//! data on failure; expression rules always run and may route anything,
//! including the error itself. Expression results are loosely typed and
//! validated entry by entry: anything that isn't an object with a
//! non-empty string `target` is silently dropped.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;

use weft_core::config::{AppConfig, ComponentKind, RouteTargets};
use weft_core::invoke::FunctionInvoker;
use weft_core::queue::QueueGateway;
use weft_core::resource_map::ResourceMap;

use crate::error::{Error, Result};

/// A compiled routing expression.
///
/// Receives the completion's error and result; returns a single
/// `{target, payload}` object or a list of them as a loose JSON value.
pub type RoutingExpr = Arc<dyn Fn(Option<&str>, Option<&Value>) -> Value + Send + Sync>;

/// A component's routing rule.
#[derive(Clone, Default)]
pub enum Routing {
    /// No downstream.
    #[default]
    None,
    /// A single downstream component receiving the result.
    One(String),
    /// Several downstream components, each receiving the result.
    Many(Vec<String>),
    /// A compiled expression producing `{target, payload}` entries.
    Expr(RoutingExpr),
}

impl fmt::Debug for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("Routing::None"),
            Self::One(name) => write!(f, "Routing::One({name})"),
            Self::Many(names) => write!(f, "Routing::Many({names:?})"),
            Self::Expr(_) => f.write_str("Routing::Expr(..)"),
        }
    }
}

/// One resolved dispatch: where to send which payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedDispatch {
    /// Target component name.
    pub target: String,
    /// Payload delivered to the target.
    pub payload: Value,
}

impl Routing {
    /// Builds the rule from configured targets and an optional compiled
    /// expression. The expression, when present, replaces the static
    /// targets; it is the compiled form of the same configuration entry.
    #[must_use]
    pub fn from_parts(targets: Option<&RouteTargets>, expr: Option<RoutingExpr>) -> Self {
        if let Some(expr) = expr {
            return Self::Expr(expr);
        }
        match targets {
            None => Self::None,
            Some(RouteTargets::One(name)) => Self::One(name.clone()),
            Some(RouteTargets::Many(names)) => Self::Many(names.clone()),
        }
    }

    /// Evaluates the rule against a completion outcome.
    ///
    /// Name-based rules yield nothing when `error` is set; expression
    /// rules always run. Malformed expression entries are dropped.
    #[must_use]
    pub fn evaluate(&self, error: Option<&str>, result: Option<&Value>) -> Vec<RoutedDispatch> {
        match self {
            Self::None => Vec::new(),
            Self::One(name) => named_dispatches(std::slice::from_ref(name), error, result),
            Self::Many(names) => named_dispatches(names, error, result),
            Self::Expr(expr) => expression_dispatches(expr(error, result)),
        }
    }
}

fn named_dispatches(
    names: &[String],
    error: Option<&str>,
    result: Option<&Value>,
) -> Vec<RoutedDispatch> {
    if error.is_some() {
        return Vec::new();
    }
    names
        .iter()
        .map(|name| RoutedDispatch {
            target: name.clone(),
            payload: result.cloned().unwrap_or(Value::Null),
        })
        .collect()
}

fn expression_dispatches(value: Value) -> Vec<RoutedDispatch> {
    let entries = match value {
        Value::Array(entries) => entries,
        other => vec![other],
    };
    entries.into_iter().filter_map(parse_entry).collect()
}

fn parse_entry(entry: Value) -> Option<RoutedDispatch> {
    let object = entry.as_object()?;
    let target = object.get("target")?.as_str()?;
    if target.is_empty() {
        return None;
    }
    Some(RoutedDispatch {
        target: target.to_string(),
        payload: object.get("payload").cloned().unwrap_or(Value::Null),
    })
}

/// Dispatches routed results to their target components.
#[derive(Clone)]
pub struct RoutingEngine {
    config: Arc<AppConfig>,
    map: Arc<ResourceMap>,
    queues: QueueGateway,
    invoker: Arc<dyn FunctionInvoker>,
}

impl fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingEngine").finish_non_exhaustive()
    }
}

impl RoutingEngine {
    /// Creates an engine over the deployment's gateways.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        map: Arc<ResourceMap>,
        queues: QueueGateway,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Self {
            config,
            map,
            queues,
            invoker,
        }
    }

    /// Evaluates `routing` and dispatches every resolved pair concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first dispatch error; the remaining dispatches still
    /// run to completion.
    pub async fn route(
        &self,
        routing: &Routing,
        error: Option<&str>,
        result: Option<&Value>,
    ) -> Result<()> {
        let dispatches = routing.evaluate(error, result);
        if dispatches.is_empty() {
            return Ok(());
        }

        let results = join_all(dispatches.iter().map(|d| self.dispatch(d))).await;
        let total = results.len();
        let mut first_error = None;
        for (dispatch, outcome) in dispatches.iter().zip(results) {
            if let Err(err) = outcome {
                tracing::warn!(target = %dispatch.target, error = %err, "routed dispatch failed");
                first_error.get_or_insert(err);
            }
        }
        tracing::debug!(total, "routing dispatches complete");
        first_error.map_or(Ok(()), Err)
    }

    async fn dispatch(&self, dispatch: &RoutedDispatch) -> Result<()> {
        let Some(component) = self.config.component(&dispatch.target) else {
            return Err(Error::InvalidDestination {
                target: dispatch.target.clone(),
            });
        };

        match component.kind {
            ComponentKind::FromMessage => {
                let queue = self.map.input_queue(&component.name)?;
                self.queues.send_json(queue, &dispatch.payload).await?;
            }
            ComponentKind::FromInvocation => {
                let function = self.map.function(&component.name)?;
                self.invoker
                    .invoke_event(function, &dispatch.payload)
                    .await?;
            }
            ComponentKind::Internal => {
                return Err(Error::InvalidDestination {
                    target: dispatch.target.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn named_routing_skips_on_error() {
        let routing = Routing::Many(vec!["a".into(), "b".into()]);
        assert!(routing.evaluate(Some("boom"), None).is_empty());

        let dispatches = routing.evaluate(None, Some(&json!({"x": 2})));
        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].target, "a");
        assert_eq!(dispatches[0].payload, json!({"x": 2}));
    }

    #[test]
    fn single_name_routes_result_unchanged() {
        let routing = Routing::One("b".into());
        let dispatches = routing.evaluate(None, Some(&json!([1, 2])));
        assert_eq!(
            dispatches,
            vec![RoutedDispatch {
                target: "b".into(),
                payload: json!([1, 2]),
            }]
        );
    }

    #[test]
    fn expression_runs_even_on_error() {
        let expr: RoutingExpr = Arc::new(|error, _result| {
            json!({"target": "deadletter", "payload": {"error": error}})
        });
        let routing = Routing::Expr(expr);
        let dispatches = routing.evaluate(Some("boom"), None);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].target, "deadletter");
        assert_eq!(dispatches[0].payload, json!({"error": "boom"}));
    }

    #[test]
    fn malformed_expression_entries_are_dropped() {
        let expr: RoutingExpr = Arc::new(|_error, _result| {
            json!([
                {"target": "a", "payload": {"k": 1}},
                null,
                42,
                {"payload": {"k": 2}},
                {"target": ""},
                {"target": "b", "payload": {"k": 2}},
            ])
        });
        let routing = Routing::Expr(expr);
        let dispatches = routing.evaluate(None, None);
        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].target, "a");
        assert_eq!(dispatches[1].target, "b");
    }

    #[test]
    fn expression_entry_without_payload_routes_null() {
        let expr: RoutingExpr = Arc::new(|_error, _result| json!({"target": "a"}));
        let dispatches = Routing::Expr(expr).evaluate(None, None);
        assert_eq!(dispatches[0].payload, Value::Null);
    }

    #[test]
    fn from_parts_prefers_expression() {
        let expr: RoutingExpr = Arc::new(|_e, _r| json!([]));
        let routing = Routing::from_parts(Some(&RouteTargets::One("a".into())), Some(expr));
        assert!(matches!(routing, Routing::Expr(_)));

        let routing = Routing::from_parts(Some(&RouteTargets::One("a".into())), None);
        assert!(matches!(routing, Routing::One(name) if name == "a"));

        assert!(matches!(Routing::from_parts(None, None), Routing::None));
    }
}
