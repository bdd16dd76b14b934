use contracts::EventType;
use serde_json::Value;

use crate::bus::SubscriberId;
use crate::catalog;
use crate::registry::LayerRegistry;
use crate::router::IntentBinding;
use crate::validate;

use super::*;

fn engine_config(definition: &GameDefinition) -> EngineConfig {
    let systems = Value::Object(definition.systems.clone().into_iter().collect());
    // Unparsable systems blocks are caught by the validation gate.
    serde_json::from_value(systems).unwrap_or_default()
}

impl GameEngine {
    /// Fixed-timestep runtime using the definition's configured delta.
    pub fn with_fixed_timestep(
        definition: GameDefinition,
        registry: &LayerRegistry,
    ) -> Result<Self, EngineError> {
        let dt = engine_config(&definition).fixed_dt_seconds;
        Self::new(
            definition,
            registry,
            Box::new(crate::time::FixedTimeSource::new(dt)),
        )
    }

    /// Validates the definition and builds a fully wired runtime. Any
    /// validation issue aborts with the aggregate list; no partial runtime
    /// is ever observable.
    pub fn new(
        definition: GameDefinition,
        registry: &LayerRegistry,
        time: Box<dyn TimeSource>,
    ) -> Result<Self, EngineError> {
        let issues = validate::validate_definition(&definition, registry);
        if !issues.is_empty() {
            return Err(EngineError::DefinitionRejected(issues));
        }

        let config = engine_config(&definition);
        let store = StateStore::new(definition.state.clone());
        let mut bus = EventBus::new(&config);
        let mut router = IntentRouter::new(config.strict_intents);
        let evaluator = UnlockEvaluator::from_definition(&definition)?;
        let modifiers = ModifierResolver::from_definition(&definition);
        let resets = LayerResetService::from_definition(&definition);

        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(definition.layers.len());
        for layer_def in &definition.layers {
            layers.push(registry.create_layer(layer_def)?);
        }

        router.register("REQUEST_LAYER_RESET", IntentBinding::ResetRequest)?;
        let mut subscription_tokens = vec![bus.subscribe(
            EventType::LayerResetRequested,
            SubscriberId::ResetService,
            None,
        )];

        for layer in &layers {
            for spec in catalog::EVENT_CATALOG {
                let consumes = spec
                    .consumers
                    .iter()
                    .any(|consumer| *consumer == layer.type_name());
                if consumes {
                    subscription_tokens.push(bus.subscribe(
                        spec.event_type,
                        SubscriberId::Layer(layer.id().to_string()),
                        Some(layer.id().to_string()),
                    ));
                }
            }
            for intent_type in layer.handled_intents() {
                router.register(intent_type, IntentBinding::Layer(layer.id().to_string()))?;
            }
        }

        let mut engine = Self {
            definition,
            config,
            store,
            bus,
            router,
            evaluator,
            modifiers,
            resets,
            layers,
            time,
            pending_intents: Vec::new(),
            subscription_tokens,
            phase_cursor: None,
            in_tick: false,
            current_tick: 0,
            last_summary: None,
        };
        engine.init_layers()?;
        Ok(engine)
    }

    fn init_layers(&mut self) -> Result<(), EngineError> {
        let Self {
            layers,
            store,
            bus,
            modifiers,
            resets,
            ..
        } = self;
        for layer in layers.iter_mut() {
            let layer_id = layer.id().to_string();
            let mut ctx = LayerContext::new(&layer_id, store, bus, modifiers, resets);
            layer.init(&mut ctx)?;
        }
        Ok(())
    }
}
