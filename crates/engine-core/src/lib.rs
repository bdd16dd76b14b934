//! Deterministic six-phase tick pipeline for data-driven incremental games:
//! validated event bus, intent router, unlock evaluator, and the
//! canonical/derived state store, orchestrated by a phase state machine.

pub mod bus;
pub mod catalog;
pub mod condition;
pub mod engine;
pub mod error;
pub mod layer;
pub mod layers;
pub mod modifier;
pub mod noderef;
pub mod phase;
pub mod registry;
pub mod reset;
pub mod router;
pub mod softcap;
pub mod store;
pub mod time;
pub mod unlock;
pub mod validate;

pub use bus::{EventBus, EventDraft, EventSink, SubscriberEntry, SubscriberId, SubscriptionToken};
pub use engine::GameEngine;
pub use error::EngineError;
pub use layer::{Layer, LayerContext};
pub use phase::{Phase, PHASE_ORDER};
pub use registry::{LayerFactory, LayerRegistry};
pub use reset::LayerResetService;
pub use router::{IntentBinding, IntentRouter, IntentSink};
pub use store::StateStore;
pub use time::{FixedTimeSource, TimeSource};
pub use unlock::{UnlockEvaluator, UNLOCK_EVALUATION_PHASE};
