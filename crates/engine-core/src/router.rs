//! Catalog-validated intent routing with lock-aware rejection. Routing
//! failures are result values; only handler registration mistakes and
//! handler-raised faults are errors.

use std::collections::BTreeMap;

use contracts::{IntentRecord, RouteCode, RouteResult};
use serde_json::Value;

use crate::catalog::{self, LockPolicy};
use crate::error::EngineError;

/// Named handler binding resolved by the engine's sink. Bindings rather than
/// stored closures: the engine owns every collaborator a handler touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentBinding {
    ResetRequest,
    Layer(String),
}

pub trait IntentSink {
    /// The engine-supplied lock predicate over the current unlock summary.
    fn is_node_locked(&self, node_ref: &str) -> bool;

    fn invoke(
        &mut self,
        binding: &IntentBinding,
        routing_target: &str,
        intent: &IntentRecord,
    ) -> Result<Value, EngineError>;
}

#[derive(Debug)]
pub struct IntentRouter {
    handlers: BTreeMap<String, IntentBinding>,
    strict: bool,
}

impl IntentRouter {
    pub fn new(strict: bool) -> Self {
        Self {
            handlers: BTreeMap::new(),
            strict,
        }
    }

    /// Duplicate registration is a programming error, not a last-writer win.
    pub fn register(
        &mut self,
        intent_type: &str,
        binding: IntentBinding,
    ) -> Result<(), EngineError> {
        if self.handlers.contains_key(intent_type) {
            return Err(EngineError::DuplicateIntentHandler {
                intent_type: intent_type.to_string(),
            });
        }
        self.handlers.insert(intent_type.to_string(), binding);
        Ok(())
    }

    pub fn has_handler(&self, intent_type: &str) -> bool {
        self.handlers.contains_key(intent_type)
    }

    pub fn route(
        &self,
        intent: &IntentRecord,
        sink: &mut dyn IntentSink,
    ) -> Result<RouteResult, EngineError> {
        let intent_type = intent.intent_type.trim();
        if intent_type.is_empty() {
            return Ok(RouteResult::rejected(
                RouteCode::IntentCatalogMissing,
                None,
                Some("intent type must be a non-empty string".to_string()),
            ));
        }
        let Some(spec) = catalog::intent_spec(intent_type) else {
            return Ok(RouteResult::rejected(
                RouteCode::IntentCatalogMissing,
                None,
                None,
            ));
        };

        if self.strict {
            if let Err(reason) = (spec.validate_payload)(&intent.payload) {
                return Ok(RouteResult::rejected(
                    RouteCode::IntentPayloadInvalid,
                    Some(spec.routing_target.to_string()),
                    Some(reason),
                ));
            }
        }

        if spec.lock_policy == LockPolicy::RejectIfTargetLocked {
            if let Some(target_ref) = intent.target_ref() {
                if sink.is_node_locked(target_ref) {
                    return Ok(RouteResult::rejected(
                        RouteCode::IntentTargetLocked,
                        Some(spec.routing_target.to_string()),
                        None,
                    ));
                }
            }
        }

        let Some(binding) = self.handlers.get(intent_type) else {
            return Ok(RouteResult::rejected(
                RouteCode::IntentHandlerMissing,
                Some(spec.routing_target.to_string()),
                None,
            ));
        };

        let result = sink.invoke(binding, spec.routing_target, intent)?;
        Ok(RouteResult::routed(spec.routing_target, result))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct StubSink {
        locked_refs: Vec<String>,
        invoked: Vec<String>,
    }

    impl StubSink {
        fn new(locked_refs: &[&str]) -> Self {
            Self {
                locked_refs: locked_refs.iter().map(|s| s.to_string()).collect(),
                invoked: Vec::new(),
            }
        }
    }

    impl IntentSink for StubSink {
        fn is_node_locked(&self, node_ref: &str) -> bool {
            self.locked_refs.iter().any(|locked| locked == node_ref)
        }

        fn invoke(
            &mut self,
            _binding: &IntentBinding,
            routing_target: &str,
            intent: &IntentRecord,
        ) -> Result<Value, EngineError> {
            self.invoked.push(intent.intent_type.clone());
            Ok(json!({"routed_to": routing_target}))
        }
    }

    fn start_job(target_ref: &str) -> IntentRecord {
        IntentRecord::new(
            "START_JOB",
            json!({"targetRef": target_ref, "jobId": "mine"}),
        )
    }

    #[test]
    fn unknown_and_empty_types_miss_the_catalog() {
        let router = IntentRouter::new(true);
        let mut sink = StubSink::new(&[]);

        let result = router
            .route(&IntentRecord::new("TIME_TRAVEL", json!({})), &mut sink)
            .expect("routes");
        assert_eq!(result.code, RouteCode::IntentCatalogMissing);

        let result = router
            .route(&IntentRecord::new("  ", json!({})), &mut sink)
            .expect("routes");
        assert_eq!(result.code, RouteCode::IntentCatalogMissing);
        assert!(sink.invoked.is_empty());
    }

    #[test]
    fn strict_mode_rejects_invalid_payloads() {
        let router = IntentRouter::new(true);
        let mut sink = StubSink::new(&[]);

        let result = router
            .route(&IntentRecord::new("START_JOB", json!({})), &mut sink)
            .expect("routes");
        assert_eq!(result.code, RouteCode::IntentPayloadInvalid);
        assert_eq!(result.routing_target.as_deref(), Some("progressLayer"));
        assert!(result.reason.is_some());
    }

    #[test]
    fn locked_targets_are_rejected_before_handler_lookup() {
        let router = IntentRouter::new(true);
        let mut sink = StubSink::new(&["layer:idle/sublayer:main/section:jobs"]);

        let result = router
            .route(&start_job("layer:idle/sublayer:main/section:jobs"), &mut sink)
            .expect("routes");
        assert_eq!(result.code, RouteCode::IntentTargetLocked);
        assert!(!result.ok);
        assert!(sink.invoked.is_empty());
    }

    #[test]
    fn missing_handler_is_recoverable_and_routed_invokes() {
        let mut router = IntentRouter::new(true);
        let mut sink = StubSink::new(&[]);

        let result = router
            .route(&start_job("layer:idle"), &mut sink)
            .expect("routes");
        assert_eq!(result.code, RouteCode::IntentHandlerMissing);

        router
            .register("START_JOB", IntentBinding::Layer("idle".to_string()))
            .expect("registers");
        let result = router
            .route(&start_job("layer:idle"), &mut sink)
            .expect("routes");
        assert_eq!(result.code, RouteCode::IntentRouted);
        assert!(result.ok);
        assert_eq!(result.routing_target.as_deref(), Some("progressLayer"));
        assert_eq!(sink.invoked, vec!["START_JOB".to_string()]);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut router = IntentRouter::new(false);
        router
            .register("START_JOB", IntentBinding::Layer("idle".to_string()))
            .expect("registers");
        let err = router
            .register("START_JOB", IntentBinding::Layer("other".to_string()))
            .expect_err("rejected");
        assert!(matches!(err, EngineError::DuplicateIntentHandler { .. }));
    }
}
