//! Property suite for the quantified invariants: unlock monotonicity,
//! node-reference round-trips, and progress bounds.

use contracts::GameDefinition;
use engine_core::condition::{estimate_progress, evaluate, parse_condition};
use engine_core::noderef;
use engine_core::store::StateStore;
use engine_core::{FixedTimeSource, GameEngine, LayerRegistry};
use proptest::prelude::*;
use serde_json::json;

fn gated_engine(thresholds: &[f64]) -> GameEngine {
    let elements: Vec<serde_json::Value> = thresholds
        .iter()
        .enumerate()
        .map(|(index, threshold)| {
            json!({
                "id": format!("gate-{index}"),
                "type": "job",
                "unlock": {"resourceGte": {"path": "resources.xp", "amount": threshold}}
            })
        })
        .collect();
    let definition = serde_json::from_value::<GameDefinition>(json!({
        "meta": {"schemaVersion": "1.0", "gameId": "properties"},
        "state": {"resources": {"xp": 0}},
        "layers": [{
            "id": "idle",
            "type": "progressLayer",
            "sublayers": [{
                "id": "main",
                "type": "standard",
                "sections": [{"id": "jobs", "elements": elements}]
            }]
        }]
    }))
    .expect("definition deserializes");
    GameEngine::new(
        definition,
        &LayerRegistry::with_builtin_layers(),
        Box::new(FixedTimeSource::new(0.05)),
    )
    .expect("engine initializes")
}

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,7}"
}

fn reference_strategy() -> impl Strategy<Value = String> {
    (
        id_strategy(),
        proptest::option::of((
            id_strategy(),
            proptest::option::of((id_strategy(), proptest::option::of(id_strategy()))),
        )),
    )
        .prop_map(|(layer, rest)| {
            let mut reference = format!("layer:{layer}");
            if let Some((sublayer, rest)) = rest {
                reference.push_str(&format!("/sublayer:{sublayer}"));
                if let Some((section, element)) = rest {
                    reference.push_str(&format!("/section:{section}"));
                    if let Some(element) = element {
                        reference.push_str(&format!("/element:{element}"));
                    }
                }
            }
            reference
        })
}

proptest! {
    #[test]
    fn unlocks_never_revert_under_arbitrary_resource_churn(
        thresholds in proptest::collection::vec(0.0_f64..100.0, 1..4),
        xp_values in proptest::collection::vec(0.0_f64..150.0, 1..12),
    ) {
        let mut engine = gated_engine(&thresholds);
        let mut previously_unlocked: Vec<String> = Vec::new();

        for xp in xp_values {
            engine.store_mut().set("resources.xp", json!(xp)).expect("set");
            let summary = engine.tick().expect("ticks");
            for node_ref in &previously_unlocked {
                prop_assert_eq!(summary.unlocks.unlocked.get(node_ref), Some(&true));
            }
            previously_unlocked = summary.unlocks.unlocked_refs.clone();
        }
    }

    #[test]
    fn canonical_references_round_trip(reference in reference_strategy()) {
        let parsed = noderef::parse(&reference).expect("parses");
        prop_assert_eq!(parsed.format(), reference.clone());
        prop_assert_eq!(noderef::normalize(&reference).expect("normalizes"), reference);
    }

    #[test]
    fn whitespace_variants_normalize_to_canonical(
        reference in reference_strategy(),
        pad in "[ \t]{0,3}",
    ) {
        let spaced = reference
            .split('/')
            .map(|segment| format!("{pad}{segment}{pad}"))
            .collect::<Vec<_>>()
            .join("/");
        prop_assert_eq!(noderef::normalize(&spaced).expect("normalizes"), reference);
    }

    #[test]
    fn progress_estimates_stay_in_unit_interval(
        current in -1_000.0_f64..1_000.0,
        target in -1_000.0_f64..1_000.0,
        op in prop_oneof![
            Just("gt"), Just("gte"), Just("lt"), Just("lte"), Just("eq"), Just("neq")
        ],
    ) {
        let store = StateStore::new(json!({"resources": {"value": current}}));
        let condition = parse_condition(
            &json!({"compare": {"path": "resources.value", "op": op, "value": target}}),
        )
        .expect("condition parses");

        let progress = estimate_progress(&condition, &store);
        prop_assert!((0.0..=1.0).contains(&progress));

        // Satisfied conditions always report full progress; strict
        // operators at the boundary never do.
        if evaluate(&condition, &store) {
            prop_assert_eq!(progress, 1.0);
        } else if (op == "gt" || op == "lt") && current == target {
            prop_assert!(progress < 1.0);
        }
    }

    #[test]
    fn strict_boundary_negation_reports_full_progress(target in -100.0_f64..100.0) {
        let store = StateStore::new(json!({"resources": {"value": target}}));
        let strict = parse_condition(
            &json!({"compare": {"path": "resources.value", "op": "gt", "value": target}}),
        )
        .expect("condition parses");
        let negated = parse_condition(
            &json!({"not": {"compare": {"path": "resources.value", "op": "gt", "value": target}}}),
        )
        .expect("condition parses");

        prop_assert!(estimate_progress(&strict, &store) < 1.0);
        prop_assert_eq!(estimate_progress(&negated, &store), 1.0);
    }
}
