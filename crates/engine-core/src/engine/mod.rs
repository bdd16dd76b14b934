//! Tick orchestration: the six-phase state machine, runtime wiring, and the
//! host-facing engine surface.

use std::collections::BTreeMap;

use contracts::{EngineConfig, GameDefinition, IntentRecord, StateSnapshot, TickSummary};
use serde_json::Value;

use crate::bus::{EventBus, SubscriptionToken};
use crate::error::EngineError;
use crate::layer::{Layer, LayerContext};
use crate::modifier::ModifierResolver;
use crate::noderef;
use crate::phase::{Phase, PHASE_ORDER};
use crate::reset::LayerResetService;
use crate::router::IntentRouter;
use crate::store::StateStore;
use crate::time::TimeSource;
use crate::unlock::UnlockEvaluator;

mod init;
mod render;
mod tick;

#[derive(Debug)]
pub struct GameEngine {
    definition: GameDefinition,
    config: EngineConfig,
    store: StateStore,
    bus: EventBus,
    router: IntentRouter,
    evaluator: UnlockEvaluator,
    modifiers: ModifierResolver,
    resets: LayerResetService,
    layers: Vec<Box<dyn Layer>>,
    time: Box<dyn TimeSource>,
    pending_intents: Vec<IntentRecord>,
    subscription_tokens: Vec<SubscriptionToken>,
    phase_cursor: Option<usize>,
    in_tick: bool,
    current_tick: u64,
    last_summary: Option<TickSummary>,
}

/// Lock predicate over the unlock summary in derived state. Before the
/// first unlock evaluation there is no summary and nothing is locked; once
/// one exists, only refs it marks `true` are unlocked.
pub(crate) fn node_locked(store: &StateStore, node_ref: &str) -> bool {
    let Ok(normalized) = noderef::normalize(node_ref) else {
        return true;
    };
    match store.get("derived.unlocks.unlocked") {
        Some(Value::Object(entries)) => {
            !matches!(entries.get(&normalized), Some(Value::Bool(true)))
        }
        _ => false,
    }
}

impl GameEngine {
    pub fn definition(&self) -> &GameDefinition {
        &self.definition
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn game_id(&self) -> &str {
        &self.definition.meta.game_id
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Host-side canonical writes between ticks (e.g. an external driver
    /// crediting resources). Callers must not mutate the store mid-tick.
    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.store.snapshot()
    }

    /// Appends to the next tick's input queue.
    pub fn enqueue_intent(&mut self, intent: IntentRecord) {
        self.pending_intents.push(intent);
    }

    pub fn is_node_locked(&self, node_ref: &str) -> bool {
        node_locked(&self.store, node_ref)
    }

    pub fn unlock_progress(&self) -> BTreeMap<String, f64> {
        self.evaluator.evaluate_progress_all(&self.store)
    }

    pub fn last_tick_summary(&self) -> Option<&TickSummary> {
        self.last_summary.as_ref()
    }

    fn enter_phase(&mut self, phase: Phase) -> Result<(), EngineError> {
        let expected_index = self.phase_cursor.map_or(0, |index| index + 1);
        let expected = PHASE_ORDER.get(expected_index).copied();
        if expected != Some(phase) {
            return Err(EngineError::PhaseOrderViolation {
                expected: expected.map(Phase::as_str),
                entered: phase.as_str(),
            });
        }
        self.phase_cursor = Some(expected_index);
        self.bus.set_allowed_phase(Some(phase));
        Ok(())
    }

    /// Releases every tracked subscription and tears layers down in reverse
    /// creation order.
    pub fn destroy(&mut self) -> Result<(), EngineError> {
        for token in std::mem::take(&mut self.subscription_tokens) {
            self.bus.unsubscribe(token);
        }
        {
            let Self {
                layers,
                store,
                bus,
                modifiers,
                resets,
                ..
            } = self;
            for layer in layers.iter_mut().rev() {
                let layer_id = layer.id().to_string();
                let mut ctx = LayerContext::new(&layer_id, store, bus, modifiers, resets);
                layer.destroy(&mut ctx)?;
            }
        }
        self.layers.clear();
        Ok(())
    }
}
