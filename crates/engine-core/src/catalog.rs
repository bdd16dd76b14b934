//! Process-wide event and intent catalogs as compile-time tables.

use contracts::EventType;
use serde_json::Value;

use crate::phase::Phase;

type PayloadValidator = fn(&Value) -> Result<(), String>;

#[derive(Debug)]
pub struct EventSpec {
    pub event_type: EventType,
    pub producers: &'static [&'static str],
    pub consumers: &'static [&'static str],
    pub allowed_phases: &'static [Phase],
    pub validate_payload: PayloadValidator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPolicy {
    None,
    RejectIfTargetLocked,
}

#[derive(Debug)]
pub struct IntentSpec {
    pub intent_type: &'static str,
    pub routing_target: &'static str,
    pub lock_policy: LockPolicy,
    pub validate_payload: PayloadValidator,
}

fn require_string_field(payload: &Value, field: &'static str) -> Result<(), String> {
    match payload.get(field) {
        Some(Value::String(raw)) if !raw.trim().is_empty() => Ok(()),
        Some(_) => Err(format!("{field} must be a non-empty string")),
        None => Err(format!("missing {field}")),
    }
}

fn validate_target_ref(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "targetRef")
}

fn validate_layer_id(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "layerId")
}

fn validate_job_payload(payload: &Value) -> Result<(), String> {
    require_string_field(payload, "targetRef")?;
    require_string_field(payload, "jobId")
}

const UNLOCKED: EventSpec = EventSpec {
    event_type: EventType::Unlocked,
    producers: &["UnlockEvaluator"],
    consumers: &[],
    allowed_phases: &[Phase::UnlockEvaluation],
    validate_payload: validate_target_ref,
};

const LAYER_RESET_REQUESTED: EventSpec = EventSpec {
    event_type: EventType::LayerResetRequested,
    producers: &["IntentRouter", "progressLayer"],
    consumers: &[],
    allowed_phases: &[Phase::Input, Phase::LayerUpdate, Phase::EventDispatch],
    validate_payload: validate_layer_id,
};

const LAYER_RESET_EXECUTED: EventSpec = EventSpec {
    event_type: EventType::LayerResetExecuted,
    producers: &["LayerResetService"],
    consumers: &["progressLayer"],
    allowed_phases: &[Phase::EventDispatch],
    validate_payload: validate_layer_id,
};

const JOB_STARTED: EventSpec = EventSpec {
    event_type: EventType::JobStarted,
    producers: &["progressLayer"],
    consumers: &[],
    allowed_phases: &[Phase::Input, Phase::LayerUpdate],
    validate_payload: validate_job_payload,
};

const JOB_STOPPED: EventSpec = EventSpec {
    event_type: EventType::JobStopped,
    producers: &["progressLayer"],
    consumers: &[],
    allowed_phases: &[Phase::Input, Phase::LayerUpdate],
    validate_payload: validate_job_payload,
};

const JOB_COMPLETED: EventSpec = EventSpec {
    event_type: EventType::JobCompleted,
    producers: &["progressLayer"],
    consumers: &[],
    allowed_phases: &[Phase::LayerUpdate],
    validate_payload: validate_job_payload,
};

pub const EVENT_CATALOG: [&EventSpec; 6] = [
    &UNLOCKED,
    &LAYER_RESET_REQUESTED,
    &LAYER_RESET_EXECUTED,
    &JOB_STARTED,
    &JOB_STOPPED,
    &JOB_COMPLETED,
];

/// Total lookup: the catalog covers every event type by construction.
pub fn event_spec(event_type: EventType) -> &'static EventSpec {
    match event_type {
        EventType::Unlocked => &UNLOCKED,
        EventType::LayerResetRequested => &LAYER_RESET_REQUESTED,
        EventType::LayerResetExecuted => &LAYER_RESET_EXECUTED,
        EventType::JobStarted => &JOB_STARTED,
        EventType::JobStopped => &JOB_STOPPED,
        EventType::JobCompleted => &JOB_COMPLETED,
    }
}

pub const INTENT_CATALOG: [IntentSpec; 5] = [
    IntentSpec {
        intent_type: "START_JOB",
        routing_target: "progressLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate_payload: validate_job_payload,
    },
    IntentSpec {
        intent_type: "STOP_JOB",
        routing_target: "progressLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate_payload: validate_job_payload,
    },
    IntentSpec {
        intent_type: "REQUEST_LAYER_RESET",
        routing_target: "LayerResetService",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate_payload: validate_layer_id,
    },
    IntentSpec {
        intent_type: "PULL_GACHA",
        routing_target: "gachaLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate_payload: validate_target_ref,
    },
    IntentSpec {
        intent_type: "ACTIVATE_MINIGAME",
        routing_target: "minigameLayer",
        lock_policy: LockPolicy::RejectIfTargetLocked,
        validate_payload: validate_target_ref,
    },
];

pub fn intent_spec(intent_type: &str) -> Option<&'static IntentSpec> {
    INTENT_CATALOG
        .iter()
        .find(|spec| spec.intent_type == intent_type)
}
