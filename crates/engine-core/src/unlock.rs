//! End-of-tick unlock evaluation. Unlock state is monotone within a session:
//! entries only move from locked to unlocked, so only locked entries are
//! ever re-evaluated.

use std::collections::BTreeMap;

use contracts::{EventType, GameDefinition, UnlockSummary};
use serde_json::json;

use crate::bus::{EventBus, EventDraft};
use crate::condition::{self, Condition};
use crate::error::EngineError;
use crate::noderef::ParsedNodeRef;
use crate::store::StateStore;

pub const UNLOCK_EVALUATION_PHASE: &str = "end-of-tick";

#[derive(Debug)]
struct UnlockTarget {
    node_ref: String,
    condition: Condition,
    unlocked: bool,
}

#[derive(Debug)]
pub struct UnlockEvaluator {
    targets: Vec<UnlockTarget>,
}

fn parse_unlock(
    raw: Option<&serde_json::Value>,
    node_ref: &str,
) -> Result<Condition, EngineError> {
    match raw {
        None => Ok(Condition::Always(true)),
        Some(raw) => condition::parse_condition(raw).map_err(|err| {
            EngineError::UnlockConditionInvalid {
                node_ref: node_ref.to_string(),
                reason: err.to_string(),
            }
        }),
    }
}

impl UnlockEvaluator {
    /// Enumerates every reachable node depth-first (layer, then each
    /// sublayer, section, element, siblings in array order) and parses its
    /// unlock condition. Every entry starts locked.
    pub fn from_definition(definition: &GameDefinition) -> Result<Self, EngineError> {
        let mut targets = Vec::new();
        let mut push = |node_ref: String, raw: Option<&serde_json::Value>| {
            parse_unlock(raw, &node_ref).map(|condition| {
                targets.push(UnlockTarget {
                    node_ref,
                    condition,
                    unlocked: false,
                })
            })
        };

        for layer in &definition.layers {
            let layer_ref = ParsedNodeRef::layer(&layer.id);
            push(layer_ref.format(), layer.unlock.as_ref())?;
            for sublayer in &layer.sublayers {
                let sublayer_ref = layer_ref.child(1, &sublayer.id);
                push(sublayer_ref.format(), sublayer.unlock.as_ref())?;
                for section in &sublayer.sections {
                    let section_ref = sublayer_ref.child(2, &section.id);
                    push(section_ref.format(), section.unlock.as_ref())?;
                    for element in &section.elements {
                        let element_ref = section_ref.child(3, &element.id);
                        push(element_ref.format(), element.unlock.as_ref())?;
                    }
                }
            }
        }

        Ok(Self { targets })
    }

    pub fn is_unlocked(&self, node_ref: &str) -> bool {
        self.targets
            .iter()
            .any(|target| target.unlocked && target.node_ref == node_ref)
    }

    fn build_summary(&self) -> UnlockSummary {
        let mut summary = UnlockSummary::default();
        for target in &self.targets {
            summary
                .unlocked
                .insert(target.node_ref.clone(), target.unlocked);
            if target.unlocked {
                summary.unlocked_refs.push(target.node_ref.clone());
            }
        }
        summary
    }

    /// Current unlock state without re-evaluating anything.
    pub fn summary(&self) -> UnlockSummary {
        self.build_summary()
    }

    /// Evaluates all still-locked targets against the current canonical
    /// state; publishes `UNLOCKED` for each transition, in enumeration
    /// order. Unlocked entries are retained untouched (monotone).
    pub fn evaluate_all(
        &mut self,
        phase: &str,
        store: &StateStore,
        bus: &mut EventBus,
    ) -> Result<UnlockSummary, EngineError> {
        if phase != UNLOCK_EVALUATION_PHASE {
            return Err(EngineError::UnlockPhaseInvalid {
                phase: phase.to_string(),
            });
        }

        let mut transitions = Vec::new();
        for target in &mut self.targets {
            if target.unlocked {
                continue;
            }
            if condition::evaluate(&target.condition, store) {
                target.unlocked = true;
                transitions.push(target.node_ref.clone());
                bus.publish(
                    EventDraft::new(
                        EventType::Unlocked,
                        json!({"targetRef": target.node_ref}),
                    )
                    .from_source("UnlockEvaluator"),
                )?;
            }
        }

        let mut summary = self.build_summary();
        summary.transitions = transitions;
        Ok(summary)
    }

    /// Progress estimate per target; pure with respect to the store.
    pub fn evaluate_progress_all(&self, store: &StateStore) -> BTreeMap<String, f64> {
        self.targets
            .iter()
            .map(|target| {
                (
                    target.node_ref.clone(),
                    condition::estimate_progress(&target.condition, store),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use contracts::EngineConfig;
    use serde_json::{json, Value};

    use crate::phase::Phase;

    use super::*;

    fn definition() -> GameDefinition {
        serde_json::from_value::<GameDefinition>(json!({
            "meta": {"schemaVersion": "1.0", "gameId": "unlock-tests"},
            "state": {"resources": {"xp": 0}},
            "layers": [{
                "id": "idle",
                "type": "progressLayer",
                "sublayers": [{
                    "id": "main",
                    "type": "standard",
                    "sections": [{
                        "id": "jobs",
                        "elements": [
                            {"id": "always-on", "type": "job"},
                            {"id": "xp-gated", "type": "job",
                             "unlock": {"resourceGte": {"path": "resources.xp", "amount": 1}}}
                        ]
                    }]
                }]
            }]
        }))
        .expect("definition deserializes")
    }

    fn fixture() -> (UnlockEvaluator, StateStore, EventBus) {
        let definition = definition();
        let evaluator = UnlockEvaluator::from_definition(&definition).expect("builds");
        let store = StateStore::new(definition.state.clone());
        let mut bus = EventBus::new(&EngineConfig::default());
        bus.set_allowed_phase(Some(Phase::UnlockEvaluation));
        (evaluator, store, bus)
    }

    #[test]
    fn enumeration_covers_every_node_in_definition_order() {
        let (evaluator, store, _) = fixture();
        let progress = evaluator.evaluate_progress_all(&store);
        let refs: Vec<&str> = progress.keys().map(String::as_str).collect();
        assert_eq!(refs.len(), 5);
        assert!(refs.contains(&"layer:idle"));
        assert!(refs.contains(&"layer:idle/sublayer:main/section:jobs/element:xp-gated"));
    }

    #[test]
    fn evaluate_all_requires_end_of_tick_phase() {
        let (mut evaluator, store, mut bus) = fixture();
        let err = evaluator
            .evaluate_all("layer-update", &store, &mut bus)
            .expect_err("wrong phase rejected");
        assert!(matches!(err, EngineError::UnlockPhaseInvalid { .. }));
    }

    #[test]
    fn transitions_are_monotone_and_published_once() {
        let (mut evaluator, mut store, mut bus) = fixture();

        let first = evaluator
            .evaluate_all(UNLOCK_EVALUATION_PHASE, &store, &mut bus)
            .expect("evaluates");
        assert_eq!(first.transitions.len(), 4);
        assert!(!first.unlocked["layer:idle/sublayer:main/section:jobs/element:xp-gated"]);
        assert_eq!(bus.queue_len(), 4);

        store.set("resources.xp", json!(1)).expect("set");
        let second = evaluator
            .evaluate_all(UNLOCK_EVALUATION_PHASE, &store, &mut bus)
            .expect("evaluates");
        assert_eq!(
            second.transitions,
            vec!["layer:idle/sublayer:main/section:jobs/element:xp-gated".to_string()]
        );
        assert_eq!(bus.queue_len(), 5);

        // Dropping the resource does not re-lock.
        store.set("resources.xp", json!(0)).expect("set");
        let third = evaluator
            .evaluate_all(UNLOCK_EVALUATION_PHASE, &store, &mut bus)
            .expect("evaluates");
        assert!(third.transitions.is_empty());
        assert!(third.unlocked["layer:idle/sublayer:main/section:jobs/element:xp-gated"]);
        assert_eq!(bus.queue_len(), 5);
    }

    #[test]
    fn progress_stays_within_unit_interval() {
        let (evaluator, mut store, _) = fixture();
        store.set("resources.xp", json!(0.4)).expect("set");
        for (_, progress) in evaluator.evaluate_progress_all(&store) {
            assert!((0.0..=1.0).contains(&progress));
        }
        assert_eq!(
            evaluator.evaluate_progress_all(&store)
                ["layer:idle/sublayer:main/section:jobs/element:xp-gated"],
            0.4
        );
    }

    #[test]
    fn missing_unlock_defaults_to_always_true() {
        let (mut evaluator, store, mut bus) = fixture();
        let summary = evaluator
            .evaluate_all(UNLOCK_EVALUATION_PHASE, &store, &mut bus)
            .expect("evaluates");
        assert!(summary.unlocked["layer:idle"]);
        assert!(summary.unlocked["layer:idle/sublayer:main"]);
    }

    #[test]
    fn invalid_condition_fails_construction() {
        let mut definition = definition();
        definition.layers[0].unlock = Some(Value::String("nope".to_string()));
        let err = UnlockEvaluator::from_definition(&definition).expect_err("rejected");
        assert!(matches!(err, EngineError::UnlockConditionInvalid { .. }));
    }
}
