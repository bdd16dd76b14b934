//! Factory lookup for layer types, with contract assertion at creation.

use std::collections::BTreeMap;

use contracts::LayerDef;

use crate::error::EngineError;
use crate::layer::Layer;
use crate::layers;

pub type LayerFactory = fn(&LayerDef) -> Box<dyn Layer>;

#[derive(Debug, Default)]
pub struct LayerRegistry {
    factories: BTreeMap<String, LayerFactory>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the layers this crate ships.
    pub fn with_builtin_layers() -> Self {
        Self {
            factories: BTreeMap::from([(
                layers::PROGRESS_LAYER_TYPE.to_string(),
                layers::progress_layer_factory as LayerFactory,
            )]),
        }
    }

    pub fn register(&mut self, layer_type: &str, factory: LayerFactory) -> Result<(), EngineError> {
        let layer_type = layer_type.trim();
        if layer_type.is_empty() {
            return Err(EngineError::EmptyLayerType);
        }
        if self.factories.contains_key(layer_type) {
            return Err(EngineError::DuplicateLayerFactory {
                layer_type: layer_type.to_string(),
            });
        }
        self.factories.insert(layer_type.to_string(), factory);
        Ok(())
    }

    pub fn contains(&self, layer_type: &str) -> bool {
        self.factories.contains_key(layer_type)
    }

    /// Instantiates and asserts the returned object echoes the definition's
    /// identity. A mismatch is fatal during initialization.
    pub fn create_layer(&self, def: &LayerDef) -> Result<Box<dyn Layer>, EngineError> {
        let Some(factory) = self.factories.get(&def.layer_type) else {
            return Err(EngineError::UnknownLayerType {
                layer_type: def.layer_type.clone(),
            });
        };
        let instance = factory(def);
        if instance.id() != def.id {
            return Err(EngineError::LayerContractMismatch {
                layer_id: def.id.clone(),
                reason: format!("factory returned id {}", instance.id()),
            });
        }
        if instance.type_name() != def.layer_type {
            return Err(EngineError::LayerContractMismatch {
                layer_id: def.id.clone(),
                reason: format!("factory returned type {}", instance.type_name()),
            });
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_types_and_duplicates() {
        let mut registry = LayerRegistry::new();
        assert!(matches!(
            registry.register("  ", layers::progress_layer_factory),
            Err(EngineError::EmptyLayerType)
        ));

        registry
            .register("progressLayer", layers::progress_layer_factory)
            .expect("registers");
        assert!(matches!(
            registry.register("progressLayer", layers::progress_layer_factory),
            Err(EngineError::DuplicateLayerFactory { .. })
        ));
    }

    #[test]
    fn create_layer_asserts_identity_echo() {
        let registry = LayerRegistry::with_builtin_layers();
        let def = LayerDef {
            id: "idle".to_string(),
            layer_type: "progressLayer".to_string(),
            unlock: None,
            reset: None,
            softcaps: Vec::new(),
            sublayers: Vec::new(),
        };
        let instance = registry.create_layer(&def).expect("creates");
        assert_eq!(instance.id(), "idle");
        assert_eq!(instance.type_name(), "progressLayer");

        let unknown = LayerDef {
            layer_type: "voidLayer".to_string(),
            ..def
        };
        assert!(matches!(
            registry.create_layer(&unknown),
            Err(EngineError::UnknownLayerType { .. })
        ));
    }
}
