//! Layer reset: rebuild canonical state from the definition baseline while
//! preserving the layer's keep paths.

use std::collections::BTreeMap;

use contracts::{EventType, GameDefinition, ResetPreview};
use serde_json::json;

use crate::bus::{EventBus, EventDraft};
use crate::error::EngineError;
use crate::store::{resolve_path, write_path, StateStore};

#[derive(Debug)]
pub struct LayerResetService {
    baseline: serde_json::Value,
    keep_paths_by_layer: BTreeMap<String, Vec<String>>,
}

impl LayerResetService {
    pub fn from_definition(definition: &GameDefinition) -> Self {
        let mut keep_paths_by_layer = BTreeMap::new();
        for layer in &definition.layers {
            let keep_paths: Vec<String> = layer
                .reset
                .as_ref()
                .map(|reset| {
                    reset
                        .keep
                        .iter()
                        .map(|path| path.trim().to_string())
                        .filter(|path| !path.is_empty() && !path.starts_with("derived"))
                        .collect()
                })
                .unwrap_or_default();
            keep_paths_by_layer.insert(layer.id.clone(), keep_paths);
        }
        Self {
            baseline: definition.state.clone(),
            keep_paths_by_layer,
        }
    }

    /// Sanitized, in-order keep paths. Unknown layers simply have no rules.
    pub fn preview(&self, layer_id: &str) -> ResetPreview {
        let keep_paths = self
            .keep_paths_by_layer
            .get(layer_id)
            .cloned()
            .unwrap_or_default();
        ResetPreview {
            layer_id: layer_id.to_string(),
            has_keep_rules: !keep_paths.is_empty(),
            keep_paths,
        }
    }

    /// All-or-nothing reset: the canonical namespace is swapped in a single
    /// step, so no intermediate tree is ever observable.
    pub fn execute(
        &self,
        store: &mut StateStore,
        bus: &mut EventBus,
        layer_id: &str,
        reason: Option<&str>,
    ) -> Result<Vec<String>, EngineError> {
        let current = store.snapshot().canonical;
        let mut baseline = self.baseline.clone();

        let mut preserved_keys = Vec::new();
        for keep_path in self
            .keep_paths_by_layer
            .get(layer_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            if let Some(value) = resolve_path(&current, keep_path) {
                write_path(&mut baseline, keep_path, value.clone())?;
                preserved_keys.push(keep_path.clone());
            }
        }

        store.replace_canonical(baseline);
        bus.publish(
            EventDraft::new(
                EventType::LayerResetExecuted,
                json!({
                    "layerId": layer_id,
                    "preservedKeys": preserved_keys,
                    "reason": reason.unwrap_or("reset-executed"),
                }),
            )
            .from_source("LayerResetService"),
        )?;
        Ok(preserved_keys)
    }
}
