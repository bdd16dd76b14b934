use contracts::{EventRecord, EventType, RouteResult};
use serde_json::{json, Value};

use crate::bus::{EventDraft, EventSink, SubscriberEntry, SubscriberId};
use crate::router::{IntentBinding, IntentSink};
use crate::unlock::UNLOCK_EVALUATION_PHASE;

use super::*;

/// Delivers dispatched events to layer `on_event` hooks and to the reset
/// service. Handler publishes flow through the bus reborrow.
struct EngineEventSink<'a> {
    layers: &'a mut Vec<Box<dyn Layer>>,
    store: &'a mut StateStore,
    modifiers: &'a ModifierResolver,
    resets: &'a LayerResetService,
}

impl EventSink for EngineEventSink<'_> {
    fn deliver(
        &mut self,
        subscriber: &SubscriberEntry,
        event: &EventRecord,
        bus: &mut EventBus,
    ) -> Result<(), EngineError> {
        match &subscriber.target {
            SubscriberId::Layer(layer_id) => {
                let Some(layer) = self
                    .layers
                    .iter_mut()
                    .find(|layer| layer.id() == layer_id.as_str())
                else {
                    return Err(EngineError::UnknownLayer {
                        layer_id: layer_id.clone(),
                    });
                };
                let owned_id = layer.id().to_string();
                let mut ctx =
                    LayerContext::new(&owned_id, self.store, bus, self.modifiers, self.resets);
                layer.on_event(event, &mut ctx)
            }
            SubscriberId::ResetService => {
                if event.event_type == EventType::LayerResetRequested {
                    let layer_id = event
                        .payload
                        .get("layerId")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let reason = event.payload.get("reason").and_then(Value::as_str);
                    self.resets.execute(self.store, bus, layer_id, reason)?;
                }
                Ok(())
            }
            SubscriberId::Probe(_) => Ok(()),
        }
    }
}

/// Resolves intent handler bindings: the reset-request handler and layer
/// `on_intent` hooks.
struct EngineIntentSink<'a> {
    layers: &'a mut Vec<Box<dyn Layer>>,
    store: &'a mut StateStore,
    bus: &'a mut EventBus,
    modifiers: &'a ModifierResolver,
    resets: &'a LayerResetService,
}

impl IntentSink for EngineIntentSink<'_> {
    fn is_node_locked(&self, node_ref: &str) -> bool {
        node_locked(self.store, node_ref)
    }

    fn invoke(
        &mut self,
        binding: &IntentBinding,
        _routing_target: &str,
        intent: &contracts::IntentRecord,
    ) -> Result<Value, EngineError> {
        match binding {
            IntentBinding::ResetRequest => {
                let layer_id = intent
                    .payload
                    .get("layerId")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let mut payload = json!({
                    "layerId": layer_id,
                    "sourceIntent": intent.intent_type,
                });
                if let Some(reason) = intent.payload.get("reason").and_then(Value::as_str) {
                    payload["reason"] = json!(reason);
                }
                self.bus.publish(
                    EventDraft::new(EventType::LayerResetRequested, payload)
                        .from_source("IntentRouter"),
                )?;

                let preview = self.resets.preview(layer_id);
                Ok(json!({
                    "layerId": preview.layer_id,
                    "keepPaths": preview.keep_paths,
                    "hasKeepRules": preview.has_keep_rules,
                }))
            }
            IntentBinding::Layer(layer_id) => {
                let Some(layer) = self
                    .layers
                    .iter_mut()
                    .find(|layer| layer.id() == layer_id.as_str())
                else {
                    return Err(EngineError::UnknownLayer {
                        layer_id: layer_id.clone(),
                    });
                };
                let owned_id = layer.id().to_string();
                let mut ctx = LayerContext::new(
                    &owned_id,
                    self.store,
                    self.bus,
                    self.modifiers,
                    self.resets,
                );
                layer.on_intent(intent, &mut ctx)
            }
        }
    }
}

impl GameEngine {
    /// Advances exactly one frame through the fixed phase sequence. Fatal
    /// conditions abort the tick; recoverable intent outcomes land in the
    /// summary.
    pub fn tick(&mut self) -> Result<TickSummary, EngineError> {
        if self.in_tick {
            return Err(EngineError::TickInProgress);
        }
        self.in_tick = true;
        let result = self.run_tick();
        self.in_tick = false;
        self.bus.set_allowed_phase(None);
        result
    }

    fn run_tick(&mut self) -> Result<TickSummary, EngineError> {
        self.phase_cursor = None;
        self.current_tick += 1;
        let tick = self.current_tick;
        self.bus.set_clock(tick);

        self.enter_phase(Phase::Input)?;
        let pending = std::mem::take(&mut self.pending_intents);
        let intents_routed = self.route_pending(&pending)?;

        self.enter_phase(Phase::Time)?;
        let dt = self.time.delta_seconds();
        if !dt.is_finite() || dt < 0.0 {
            return Err(EngineError::InvalidDelta(dt));
        }

        self.enter_phase(Phase::LayerUpdate)?;
        let updated_layers = self.update_layers(dt)?;
        self.refresh_layer_views()?;

        self.enter_phase(Phase::EventDispatch)?;
        let dispatched_handlers = {
            let Self {
                layers,
                store,
                bus,
                modifiers,
                resets,
                ..
            } = self;
            let mut sink = EngineEventSink {
                layers,
                store,
                modifiers,
                resets,
            };
            bus.dispatch_queued(&mut sink)?
        };
        let dispatch = self.bus.last_dispatch_report();

        self.enter_phase(Phase::UnlockEvaluation)?;
        let unlocks = {
            let Self {
                evaluator,
                store,
                bus,
                ..
            } = self;
            evaluator.evaluate_all(UNLOCK_EVALUATION_PHASE, store, bus)?
        };
        self.store.set_derived(
            "unlocks",
            json!({
                "unlockedRefs": &unlocks.unlocked_refs,
                "unlocked": &unlocks.unlocked,
                "transitions": &unlocks.transitions,
            }),
        )?;

        self.enter_phase(Phase::Render)?;
        let ui = render::compose_ui(&self.definition, &unlocks);

        let summary = TickSummary {
            tick,
            dt,
            intents_routed,
            updated_layers,
            dispatched_handlers,
            dispatch,
            unlocks,
            ui,
        };
        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    fn route_pending(
        &mut self,
        pending: &[contracts::IntentRecord],
    ) -> Result<Vec<RouteResult>, EngineError> {
        let Self {
            router,
            layers,
            store,
            bus,
            modifiers,
            resets,
            ..
        } = self;
        let mut sink = EngineIntentSink {
            layers,
            store,
            bus,
            modifiers,
            resets,
        };
        let mut results = Vec::with_capacity(pending.len());
        for intent in pending {
            results.push(router.route(intent, &mut sink)?);
        }
        Ok(results)
    }

    /// Layers update in definition order, never sorted.
    fn update_layers(&mut self, dt: f64) -> Result<Vec<String>, EngineError> {
        let Self {
            layers,
            store,
            bus,
            modifiers,
            resets,
            ..
        } = self;
        let mut updated = Vec::with_capacity(layers.len());
        for layer in layers.iter_mut() {
            let layer_id = layer.id().to_string();
            let mut ctx = LayerContext::new(&layer_id, store, bus, modifiers, resets);
            layer.update(dt, &mut ctx)?;
            updated.push(layer_id);
        }
        Ok(updated)
    }

    /// Host hook after layer updates: snapshot every layer's view model into
    /// derived state.
    fn refresh_layer_views(&mut self) -> Result<(), EngineError> {
        let mut views = Vec::with_capacity(self.layers.len());
        {
            let Self {
                layers,
                store,
                bus,
                modifiers,
                resets,
                ..
            } = self;
            for layer in layers.iter() {
                let layer_id = layer.id().to_string();
                let ctx = LayerContext::new(&layer_id, store, bus, modifiers, resets);
                let view = layer.view_model(&ctx);
                views.push((layer_id, view));
            }
        }
        for (layer_id, view) in views {
            self.store.set_derived(&format!("views.{layer_id}"), view)?;
        }
        Ok(())
    }
}
