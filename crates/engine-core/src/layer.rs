//! The Layer contract and the scoped context handed to every instance.

use contracts::{EventRecord, EventType, IntentRecord, ResetPreview};
use serde_json::Value;

use crate::bus::{EventBus, EventDraft, SubscriberId, SubscriptionToken};
use crate::error::EngineError;
use crate::modifier::ModifierResolver;
use crate::reset::LayerResetService;
use crate::store::StateStore;

/// Contract every layer instance must honor. Layers own the state slice
/// under `layers.<id>` and coordinate with the rest of the world only
/// through events and intents.
pub trait Layer: std::fmt::Debug + Send + Sync {
    fn id(&self) -> &str;
    fn type_name(&self) -> &str;
    fn init(&mut self, ctx: &mut LayerContext<'_>) -> Result<(), EngineError>;
    fn update(&mut self, dt: f64, ctx: &mut LayerContext<'_>) -> Result<(), EngineError>;
    fn on_event(&mut self, event: &EventRecord, ctx: &mut LayerContext<'_>)
        -> Result<(), EngineError>;
    fn destroy(&mut self, ctx: &mut LayerContext<'_>) -> Result<(), EngineError>;
    fn view_model(&self, ctx: &LayerContext<'_>) -> Value;

    /// Catalog intent types this layer serves; the engine registers them on
    /// the router during initialization.
    fn handled_intents(&self) -> &[&'static str] {
        &[]
    }

    fn on_intent(
        &mut self,
        intent: &IntentRecord,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Value, EngineError> {
        let _ = (intent, ctx);
        Ok(Value::Null)
    }
}

/// Scoped facade over the engine's collaborators. Reads are global; writes
/// are confined to the layer's own namespace.
pub struct LayerContext<'a> {
    layer_id: &'a str,
    store: &'a mut StateStore,
    bus: &'a mut EventBus,
    modifiers: &'a ModifierResolver,
    resets: &'a LayerResetService,
}

impl<'a> LayerContext<'a> {
    pub fn new(
        layer_id: &'a str,
        store: &'a mut StateStore,
        bus: &'a mut EventBus,
        modifiers: &'a ModifierResolver,
        resets: &'a LayerResetService,
    ) -> Self {
        Self {
            layer_id,
            store,
            bus,
            modifiers,
            resets,
        }
    }

    pub fn layer_id(&self) -> &str {
        self.layer_id
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.store.get(path)
    }

    /// The subtree at `layers.<layerId>`, if any writes landed yet.
    pub fn get_own(&self) -> Option<&Value> {
        self.store.get(&format!("layers.{}", self.layer_id))
    }

    fn own_path(&self, suffix: &str) -> Result<String, EngineError> {
        let suffix = suffix.trim();
        if suffix.is_empty() {
            return Err(EngineError::InvalidStatePath {
                path: suffix.to_string(),
                reason: "empty own-state suffix".to_string(),
            });
        }
        if suffix == "layers" || suffix.starts_with("layers.") {
            return Err(EngineError::CrossLayerWrite {
                layer_id: self.layer_id.to_string(),
                suffix: suffix.to_string(),
            });
        }
        Ok(format!("layers.{}.{}", self.layer_id, suffix))
    }

    pub fn set_own(&mut self, suffix: &str, value: Value) -> Result<(), EngineError> {
        let path = self.own_path(suffix)?;
        self.store.set(&path, value)
    }

    pub fn patch_own(&mut self, suffix: &str, partial: Value) -> Result<(), EngineError> {
        let path = self.own_path(suffix)?;
        self.store.patch(&path, partial)
    }

    /// Queue-only publish attributed to this layer unless the draft already
    /// names a source.
    pub fn publish(&mut self, draft: EventDraft) -> Result<(), EngineError> {
        let draft = if draft.source.is_none() {
            draft.from_source(self.layer_id)
        } else {
            draft
        };
        self.bus.publish(draft)
    }

    pub fn subscribe(&mut self, event_type: EventType) -> SubscriptionToken {
        self.bus.subscribe(
            event_type,
            SubscriberId::Layer(self.layer_id.to_string()),
            Some(self.layer_id.to_string()),
        )
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.bus.unsubscribe(token)
    }

    pub fn resolve_modifier(&self, target_ref: &str, key: &str, base: f64) -> f64 {
        self.modifiers.resolve(target_ref, key, base)
    }

    pub fn reset_preview(&self, layer_id: &str) -> ResetPreview {
        self.resets.preview(layer_id)
    }
}

#[cfg(test)]
mod tests {
    use contracts::{EngineConfig, GameDefinition};
    use serde_json::json;

    use super::*;

    fn collaborators() -> (StateStore, EventBus, ModifierResolver, LayerResetService) {
        let definition = serde_json::from_value::<GameDefinition>(json!({
            "meta": {"schemaVersion": "1.0", "gameId": "ctx-tests"},
            "state": {"resources": {"xp": 3}},
            "layers": [{"id": "idle", "type": "progressLayer"}]
        }))
        .expect("definition deserializes");
        (
            StateStore::new(definition.state.clone()),
            EventBus::new(&EngineConfig::default()),
            ModifierResolver::from_definition(&definition),
            LayerResetService::from_definition(&definition),
        )
    }

    #[test]
    fn own_writes_are_prefixed_and_cross_layer_writes_rejected() {
        let (mut store, mut bus, modifiers, resets) = collaborators();
        let mut ctx = LayerContext::new("idle", &mut store, &mut bus, &modifiers, &resets);

        ctx.set_own("jobs.mine", json!({"active": true})).expect("set_own");
        assert_eq!(
            ctx.get("layers.idle.jobs.mine.active"),
            Some(&json!(true))
        );
        assert_eq!(ctx.get_own().and_then(|own| own.get("jobs")).is_some(), true);

        let err = ctx
            .set_own("layers.other.jobs", json!(1))
            .expect_err("cross-layer rejected");
        assert!(matches!(err, EngineError::CrossLayerWrite { .. }));
        let err = ctx
            .patch_own("layers.other", json!({"x": 1}))
            .expect_err("cross-layer rejected");
        assert!(matches!(err, EngineError::CrossLayerWrite { .. }));
        assert_eq!(ctx.get("layers.other"), None);
    }

    #[test]
    fn reads_are_global_and_untouched_by_scoping() {
        let (mut store, mut bus, modifiers, resets) = collaborators();
        let ctx = LayerContext::new("idle", &mut store, &mut bus, &modifiers, &resets);
        assert_eq!(ctx.get("resources.xp"), Some(&json!(3)));
    }
}
