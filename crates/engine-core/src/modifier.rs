//! Softcap index keyed by (normalized scope reference, key).

use std::collections::BTreeMap;

use contracts::{GameDefinition, SoftcapDef};

use crate::noderef;
use crate::softcap::softcap;

#[derive(Debug, Default)]
pub struct ModifierResolver {
    index: BTreeMap<(String, String), Vec<SoftcapDef>>,
}

fn entry_is_well_formed(entry: &SoftcapDef) -> bool {
    !entry.key.trim().is_empty()
        && entry.threshold.is_finite()
        && entry.threshold > 0.0
        && entry.power.is_finite()
        && entry.power > 0.0
        && entry.power <= 1.0
}

impl ModifierResolver {
    /// Indexes every layer's softcaps in declaration order. Malformed
    /// entries and unparsable scope references are skipped here, never at
    /// resolve time.
    pub fn from_definition(definition: &GameDefinition) -> Self {
        let mut index: BTreeMap<(String, String), Vec<SoftcapDef>> = BTreeMap::new();
        for layer in &definition.layers {
            for entry in &layer.softcaps {
                let Ok(scope) = noderef::normalize(&entry.scope) else {
                    continue;
                };
                if !entry_is_well_formed(entry) {
                    continue;
                }
                index
                    .entry((scope, entry.key.trim().to_string()))
                    .or_default()
                    .push(entry.clone());
            }
        }
        Self { index }
    }

    /// Applies every indexed softcap for the pair in declaration order.
    /// Unindexed pairs return `base` untouched; the result is always finite.
    pub fn resolve(&self, target_ref: &str, key: &str, base: f64) -> f64 {
        if !base.is_finite() {
            return 0.0;
        }
        let Ok(scope) = noderef::normalize(target_ref) else {
            return base;
        };
        let Some(entries) = self.index.get(&(scope, key.to_string())) else {
            return base;
        };
        entries
            .iter()
            .fold(base, |value, entry| softcap(value, entry.threshold, entry.power))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn resolver() -> ModifierResolver {
        let definition = serde_json::from_value::<GameDefinition>(json!({
            "meta": {"schemaVersion": "1.0", "gameId": "modifier-tests"},
            "state": {},
            "layers": [{
                "id": "idle",
                "type": "progressLayer",
                "softcaps": [
                    {"scope": " layer:idle / sublayer:main ", "key": "rate", "threshold": 100.0, "power": 0.5},
                    {"scope": "layer:idle/sublayer:main", "key": "rate", "threshold": 150.0, "power": 0.5},
                    {"scope": "not a ref", "key": "rate", "threshold": 10.0, "power": 0.5},
                    {"scope": "layer:idle", "key": "rate", "threshold": -3.0, "power": 0.5},
                    {"scope": "layer:idle", "key": "rate", "threshold": 10.0, "power": 1.5}
                ]
            }]
        }))
        .expect("definition deserializes");
        ModifierResolver::from_definition(&definition)
    }

    #[test]
    fn composes_matching_softcaps_in_declaration_order() {
        let resolver = resolver();
        // 400 -> 100*(400/100)^0.5 = 200 -> 150*(200/150)^0.5 ~ 173.2
        let resolved = resolver.resolve("layer:idle/sublayer:main", "rate", 400.0);
        assert!((resolved - 150.0 * (200.0_f64 / 150.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn normalizes_scope_before_lookup() {
        let resolver = resolver();
        let spaced = resolver.resolve("  layer:idle /sublayer:main", "rate", 400.0);
        let canonical = resolver.resolve("layer:idle/sublayer:main", "rate", 400.0);
        assert_eq!(spaced, canonical);
    }

    #[test]
    fn malformed_entries_are_skipped_at_index_time() {
        let resolver = resolver();
        // Both layer:idle entries were invalid, so the pair is unindexed.
        assert_eq!(resolver.resolve("layer:idle", "rate", 500.0), 500.0);
    }

    #[test]
    fn unindexed_pairs_and_bad_refs_return_base() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("layer:idle/sublayer:main", "yield", 42.0), 42.0);
        assert_eq!(resolver.resolve("not a ref", "rate", 42.0), 42.0);
        assert_eq!(resolver.resolve("layer:idle", "rate", f64::NAN), 0.0);
    }
}
