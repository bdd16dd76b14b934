//! v1 cross-boundary contracts for the engine core, API, persistence, and UI hosts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod definition;
mod ui;

pub use definition::{
    DefinitionMeta, EffectDef, ElementDef, GameDefinition, LayerDef, ResetDef, SectionDef,
    SoftcapDef, SublayerDef,
};
pub use ui::{UiElementNode, UiLayerNode, UiSectionNode, UiSublayerNode, UiTree};

pub const SCHEMA_VERSION_V1: &str = "1.0";

pub(crate) fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Engine tuning knobs. Every field has a serde default so a definition's
/// `systems` block may override any subset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_max_events_per_tick")]
    pub max_events_per_tick: u64,
    #[serde(default = "default_max_dispatch_cycles_per_tick")]
    pub max_dispatch_cycles_per_tick: u64,
    #[serde(default = "default_strict_events")]
    pub strict_events: bool,
    #[serde(default = "default_strict_intents")]
    pub strict_intents: bool,
    #[serde(default = "default_fixed_dt_seconds")]
    pub fixed_dt_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events_per_tick: default_max_events_per_tick(),
            max_dispatch_cycles_per_tick: default_max_dispatch_cycles_per_tick(),
            strict_events: default_strict_events(),
            strict_intents: default_strict_intents(),
            fixed_dt_seconds: default_fixed_dt_seconds(),
        }
    }
}

fn default_max_events_per_tick() -> u64 {
    1_000
}

fn default_max_dispatch_cycles_per_tick() -> u64 {
    8
}

fn default_strict_events() -> bool {
    true
}

fn default_strict_intents() -> bool {
    true
}

fn default_fixed_dt_seconds() -> f64 {
    0.05
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Unlocked,
    LayerResetRequested,
    LayerResetExecuted,
    JobStarted,
    JobStopped,
    JobCompleted,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unlocked => "UNLOCKED",
            Self::LayerResetRequested => "LAYER_RESET_REQUESTED",
            Self::LayerResetExecuted => "LAYER_RESET_EXECUTED",
            Self::JobStarted => "JOB_STARTED",
            Self::JobStopped => "JOB_STOPPED",
            Self::JobCompleted => "JOB_COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub event_type: EventType,
    #[serde(default = "empty_object")]
    pub payload: Value,
    pub ts: u64,
    pub source: String,
    pub phase: Option<String>,
    #[serde(default = "empty_object")]
    pub meta: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentRecord {
    #[serde(rename = "type")]
    pub intent_type: String,
    #[serde(default = "empty_object")]
    pub payload: Value,
    #[serde(default = "default_intent_source")]
    pub source: String,
}

fn default_intent_source() -> String {
    "ui".to_string()
}

impl IntentRecord {
    pub fn new(intent_type: impl Into<String>, payload: Value) -> Self {
        Self {
            intent_type: intent_type.into(),
            payload,
            source: default_intent_source(),
        }
    }

    pub fn target_ref(&self) -> Option<&str> {
        self.payload
            .get("targetRef")
            .and_then(Value::as_str)
            .filter(|raw| !raw.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteCode {
    IntentRouted,
    IntentCatalogMissing,
    IntentPayloadInvalid,
    IntentTargetLocked,
    IntentHandlerMissing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteResult {
    pub ok: bool,
    pub code: RouteCode,
    #[serde(rename = "routingTarget", default)]
    pub routing_target: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
}

impl RouteResult {
    pub fn rejected(
        code: RouteCode,
        routing_target: Option<String>,
        reason: Option<String>,
    ) -> Self {
        Self {
            ok: false,
            code,
            routing_target,
            reason,
            result: None,
        }
    }

    pub fn routed(routing_target: impl Into<String>, result: Value) -> Self {
        Self {
            ok: true,
            code: RouteCode::IntentRouted,
            routing_target: Some(routing_target.into()),
            reason: None,
            result: Some(result),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub cycles_processed: u64,
    pub events_processed: u64,
    pub delivered_handlers: u64,
    pub deferred_events: u64,
    pub deferred_due_to_cycle_limit: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnlockSummary {
    #[serde(rename = "unlockedRefs")]
    pub unlocked_refs: Vec<String>,
    pub unlocked: BTreeMap<String, bool>,
    pub transitions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetPreview {
    #[serde(rename = "layerId")]
    pub layer_id: String,
    #[serde(rename = "keepPaths")]
    pub keep_paths: Vec<String>,
    #[serde(rename = "hasKeepRules")]
    pub has_keep_rules: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub dt: f64,
    #[serde(rename = "intentsRouted")]
    pub intents_routed: Vec<RouteResult>,
    #[serde(rename = "updatedLayers")]
    pub updated_layers: Vec<String>,
    #[serde(rename = "dispatchedHandlers")]
    pub dispatched_handlers: u64,
    pub dispatch: DispatchReport,
    pub unlocks: UnlockSummary,
    pub ui: UiTree,
}

/// Full persistable snapshot: the unit an external saver consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    pub canonical: Value,
    pub derived: Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    SchemaVersionUnsupported,
    MissingGameId,
    EmptyId,
    ReservedIdCharacter,
    DuplicateSiblingId,
    UnknownLayerType,
    InvalidUnlockCondition,
    UnresolvedUnlockPath,
    InvalidTargetRef,
    UnresolvedTargetRef,
    InvalidSoftcapScope,
    UnresolvedSoftcapScope,
    InvalidSoftcapEntry,
    InvalidSystemsConfig,
    StateRootNotObject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub path: String,
    pub message: String,
    pub hint: String,
}

impl ValidationIssue {
    pub fn new(
        code: IssueCode,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    GameNotFound,
    InvalidDefinition,
    InvalidIntent,
    InvalidQuery,
    ContractVersionUnsupported,
    GameStateConflict,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}
