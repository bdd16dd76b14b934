use std::fmt;

use contracts::ValidationIssue;

/// Fatal runtime and startup failures. Recoverable intent outcomes are
/// reported as `RouteResult` values, never through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    DefinitionRejected(Vec<ValidationIssue>),
    TickInProgress,
    PhaseOrderViolation {
        expected: Option<&'static str>,
        entered: &'static str,
    },
    InvalidDelta(f64),
    DerivedWriteRejected {
        path: String,
    },
    InvalidStatePath {
        path: String,
        reason: String,
    },
    PatchTargetNotObject {
        path: String,
    },
    CrossLayerWrite {
        layer_id: String,
        suffix: String,
    },
    EventPayloadInvalid {
        event_type: &'static str,
        reason: String,
    },
    EventPhaseNotAllowed {
        event_type: &'static str,
        phase: &'static str,
    },
    EventBudgetExceeded {
        events_processed: u64,
        max_events_per_tick: u64,
    },
    UnlockPhaseInvalid {
        phase: String,
    },
    UnlockConditionInvalid {
        node_ref: String,
        reason: String,
    },
    DuplicateIntentHandler {
        intent_type: String,
    },
    EmptyLayerType,
    DuplicateLayerFactory {
        layer_type: String,
    },
    UnknownLayerType {
        layer_type: String,
    },
    LayerContractMismatch {
        layer_id: String,
        reason: String,
    },
    UnknownLayer {
        layer_id: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefinitionRejected(issues) => {
                write!(f, "definition rejected with {} issue(s):", issues.len())?;
                for issue in issues {
                    write!(f, " [{:?} at {}: {}]", issue.code, issue.path, issue.message)?;
                }
                Ok(())
            }
            Self::TickInProgress => write!(f, "tick() called re-entrantly"),
            Self::PhaseOrderViolation { expected, entered } => match expected {
                Some(expected) => write!(
                    f,
                    "phase order violation: entered {entered}, expected {expected}"
                ),
                None => write!(
                    f,
                    "phase order violation: entered {entered} after the final phase"
                ),
            },
            Self::InvalidDelta(dt) => write!(f, "invalid tick delta: {dt}"),
            Self::DerivedWriteRejected { path } => {
                write!(f, "canonical write into derived namespace rejected: {path}")
            }
            Self::InvalidStatePath { path, reason } => {
                write!(f, "invalid state path {path}: {reason}")
            }
            Self::PatchTargetNotObject { path } => {
                write!(f, "patch target at {path} is not an object")
            }
            Self::CrossLayerWrite { layer_id, suffix } => {
                write!(f, "layer {layer_id} attempted cross-layer write: {suffix}")
            }
            Self::EventPayloadInvalid { event_type, reason } => {
                write!(f, "invalid payload for {event_type}: {reason}")
            }
            Self::EventPhaseNotAllowed { event_type, phase } => {
                write!(f, "{event_type} may not be published during phase {phase}")
            }
            Self::EventBudgetExceeded {
                events_processed,
                max_events_per_tick,
            } => write!(
                f,
                "event dispatch exceeded maxEventsPerTick ({events_processed} > {max_events_per_tick}); recursive publish loop suspected"
            ),
            Self::UnlockPhaseInvalid { phase } => {
                write!(f, "unlock evaluation requires phase end-of-tick, got {phase}")
            }
            Self::UnlockConditionInvalid { node_ref, reason } => {
                write!(f, "invalid unlock condition on {node_ref}: {reason}")
            }
            Self::DuplicateIntentHandler { intent_type } => {
                write!(f, "intent handler already registered for {intent_type}")
            }
            Self::EmptyLayerType => write!(f, "layer type must be a non-empty string"),
            Self::DuplicateLayerFactory { layer_type } => {
                write!(f, "layer factory already registered for {layer_type}")
            }
            Self::UnknownLayerType { layer_type } => {
                write!(f, "no layer factory registered for {layer_type}")
            }
            Self::LayerContractMismatch { layer_id, reason } => {
                write!(f, "layer {layer_id} violates the layer contract: {reason}")
            }
            Self::UnknownLayer { layer_id } => write!(f, "no layer instance with id {layer_id}"),
        }
    }
}

impl std::error::Error for EngineError {}
