//! Startup gate: every schema and reference issue is collected and reported
//! together; nothing partial ever initializes.

use std::collections::BTreeSet;

use contracts::{EngineConfig, GameDefinition, IssueCode, ValidationIssue};
use serde_json::Value;

use crate::condition;
use crate::noderef;
use crate::registry::LayerRegistry;
use crate::store::resolve_path;

const SUPPORTED_MAJOR: &str = "1";

fn id_issue(id: &str, path: &str) -> Option<ValidationIssue> {
    if id.trim().is_empty() {
        return Some(ValidationIssue::new(
            IssueCode::EmptyId,
            path,
            "id must be a non-empty string",
            "give every node a stable, non-empty id",
        ));
    }
    if id.contains(['.', '/', ':']) || id.chars().any(char::is_whitespace) {
        return Some(ValidationIssue::new(
            IssueCode::ReservedIdCharacter,
            path,
            format!("id {id:?} contains a reserved character"),
            "ids may not contain '.', '/', ':' or whitespace",
        ));
    }
    None
}

fn check_sibling_ids<'a, I>(ids: I, base_path: &str, issues: &mut Vec<ValidationIssue>)
where
    I: Iterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    for (index, id) in ids.enumerate() {
        if !seen.insert(id) {
            issues.push(ValidationIssue::new(
                IssueCode::DuplicateSiblingId,
                format!("{base_path}/{index}/id"),
                format!("duplicate sibling id {id:?}"),
                "sibling ids must be unique within their scope",
            ));
        }
    }
}

fn check_unlock(
    raw: Option<&Value>,
    path: &str,
    state: &Value,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(raw) = raw else { return };
    match condition::parse_condition(raw) {
        Err(err) => issues.push(ValidationIssue::new(
            IssueCode::InvalidUnlockCondition,
            path,
            err.to_string(),
            "unlock conditions are single-operator objects; see the condition grammar",
        )),
        Ok(parsed) => {
            for state_path in condition::state_paths(&parsed) {
                if resolve_path(state, state_path).is_none() {
                    issues.push(ValidationIssue::new(
                        IssueCode::UnresolvedUnlockPath,
                        path,
                        format!("unlock path {state_path:?} is absent from the initial state"),
                        "seed the path in the definition's state block",
                    ));
                }
            }
        }
    }
}

fn check_node_ref(
    raw: &str,
    path: &str,
    known_refs: &BTreeSet<String>,
    invalid_code: IssueCode,
    unresolved_code: IssueCode,
    issues: &mut Vec<ValidationIssue>,
) {
    match noderef::normalize(raw) {
        Err(err) => issues.push(ValidationIssue::new(
            invalid_code,
            path,
            format!("invalid node reference {raw:?}: {err}"),
            "use layer:<id>[/sublayer:<id>[/section:<id>[/element:<id>]]]",
        )),
        Ok(normalized) => {
            if !known_refs.contains(&normalized) {
                issues.push(ValidationIssue::new(
                    unresolved_code,
                    path,
                    format!("node reference {normalized:?} does not resolve"),
                    "reference an existing layer, sublayer, section, or element",
                ));
            }
        }
    }
}

fn collect_node_refs(definition: &GameDefinition) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for layer in &definition.layers {
        let layer_ref = noderef::ParsedNodeRef::layer(&layer.id);
        refs.insert(layer_ref.format());
        for sublayer in &layer.sublayers {
            let sublayer_ref = layer_ref.child(1, &sublayer.id);
            refs.insert(sublayer_ref.format());
            for section in &sublayer.sections {
                let section_ref = sublayer_ref.child(2, &section.id);
                refs.insert(section_ref.format());
                for element in &section.elements {
                    refs.insert(section_ref.child(3, &element.id).format());
                }
            }
        }
    }
    refs
}

/// Runs every schema and reference check, returning the aggregate issue
/// list. Empty means the definition may initialize a runtime.
pub fn validate_definition(
    definition: &GameDefinition,
    registry: &LayerRegistry,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let major = definition
        .meta
        .schema_version
        .split('.')
        .next()
        .unwrap_or_default();
    if major != SUPPORTED_MAJOR {
        issues.push(ValidationIssue::new(
            IssueCode::SchemaVersionUnsupported,
            "/meta/schemaVersion",
            format!(
                "schema version {:?} is not supported",
                definition.meta.schema_version
            ),
            format!("this engine supports schema major version {SUPPORTED_MAJOR} (e.g. \"1.0\")"),
        ));
    }
    if definition.meta.game_id.trim().is_empty() {
        issues.push(ValidationIssue::new(
            IssueCode::MissingGameId,
            "/meta/gameId",
            "gameId must be a non-empty string",
            "set meta.gameId to a stable identifier",
        ));
    }
    if !definition.state.is_object() {
        issues.push(ValidationIssue::new(
            IssueCode::StateRootNotObject,
            "/state",
            "initial state must be an object",
            "wrap the initial canonical state in an object",
        ));
    }

    let systems = Value::Object(definition.systems.clone().into_iter().collect());
    if serde_json::from_value::<EngineConfig>(systems).is_err() {
        issues.push(ValidationIssue::new(
            IssueCode::InvalidSystemsConfig,
            "/systems",
            "systems block does not deserialize as engine configuration",
            "systems values must match the engine config field types",
        ));
    }

    let known_refs = collect_node_refs(definition);

    check_sibling_ids(
        definition.layers.iter().map(|layer| layer.id.as_str()),
        "/layers",
        &mut issues,
    );

    for (layer_index, layer) in definition.layers.iter().enumerate() {
        let layer_path = format!("/layers/{layer_index}");
        if let Some(issue) = id_issue(&layer.id, &format!("{layer_path}/id")) {
            issues.push(issue);
        }
        if !registry.contains(&layer.layer_type) {
            issues.push(ValidationIssue::new(
                IssueCode::UnknownLayerType,
                format!("{layer_path}/type"),
                format!("no factory registered for layer type {:?}", layer.layer_type),
                "register the layer type before initializing, or fix the definition",
            ));
        }
        check_unlock(
            layer.unlock.as_ref(),
            &format!("{layer_path}/unlock"),
            &definition.state,
            &mut issues,
        );

        for (cap_index, cap) in layer.softcaps.iter().enumerate() {
            let cap_path = format!("{layer_path}/softcaps/{cap_index}");
            check_node_ref(
                &cap.scope,
                &format!("{cap_path}/scope"),
                &known_refs,
                IssueCode::InvalidSoftcapScope,
                IssueCode::UnresolvedSoftcapScope,
                &mut issues,
            );
            if cap.key.trim().is_empty()
                || !cap.threshold.is_finite()
                || cap.threshold <= 0.0
                || !cap.power.is_finite()
                || cap.power <= 0.0
                || cap.power > 1.0
            {
                issues.push(ValidationIssue::new(
                    IssueCode::InvalidSoftcapEntry,
                    cap_path,
                    "softcap requires a key, a positive threshold, and a power in (0, 1]",
                    "fix or remove the softcap entry",
                ));
            }
        }

        check_sibling_ids(
            layer.sublayers.iter().map(|sublayer| sublayer.id.as_str()),
            &format!("{layer_path}/sublayers"),
            &mut issues,
        );
        for (sublayer_index, sublayer) in layer.sublayers.iter().enumerate() {
            let sublayer_path = format!("{layer_path}/sublayers/{sublayer_index}");
            if let Some(issue) = id_issue(&sublayer.id, &format!("{sublayer_path}/id")) {
                issues.push(issue);
            }
            check_unlock(
                sublayer.unlock.as_ref(),
                &format!("{sublayer_path}/unlock"),
                &definition.state,
                &mut issues,
            );

            check_sibling_ids(
                sublayer.sections.iter().map(|section| section.id.as_str()),
                &format!("{sublayer_path}/sections"),
                &mut issues,
            );
            for (section_index, section) in sublayer.sections.iter().enumerate() {
                let section_path = format!("{sublayer_path}/sections/{section_index}");
                if let Some(issue) = id_issue(&section.id, &format!("{section_path}/id")) {
                    issues.push(issue);
                }
                check_unlock(
                    section.unlock.as_ref(),
                    &format!("{section_path}/unlock"),
                    &definition.state,
                    &mut issues,
                );

                check_sibling_ids(
                    section.elements.iter().map(|element| element.id.as_str()),
                    &format!("{section_path}/elements"),
                    &mut issues,
                );
                for (element_index, element) in section.elements.iter().enumerate() {
                    let element_path = format!("{section_path}/elements/{element_index}");
                    if let Some(issue) = id_issue(&element.id, &format!("{element_path}/id")) {
                        issues.push(issue);
                    }
                    check_unlock(
                        element.unlock.as_ref(),
                        &format!("{element_path}/unlock"),
                        &definition.state,
                        &mut issues,
                    );
                    if let Some(effect) = &element.effect {
                        check_node_ref(
                            &effect.target_ref,
                            &format!("{element_path}/effect/targetRef"),
                            &known_refs,
                            IssueCode::InvalidTargetRef,
                            IssueCode::UnresolvedTargetRef,
                            &mut issues,
                        );
                    }
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn registry() -> LayerRegistry {
        LayerRegistry::with_builtin_layers()
    }

    fn valid_definition() -> GameDefinition {
        serde_json::from_value::<GameDefinition>(json!({
            "meta": {"schemaVersion": "1.0", "gameId": "validate-tests"},
            "state": {"resources": {"xp": 0}},
            "layers": [{
                "id": "idle",
                "type": "progressLayer",
                "softcaps": [{"scope": "layer:idle", "key": "rate", "threshold": 100.0, "power": 0.5}],
                "sublayers": [{
                    "id": "main",
                    "type": "standard",
                    "sections": [{
                        "id": "jobs",
                        "elements": [{
                            "id": "mine",
                            "type": "job",
                            "unlock": {"resourceGte": {"path": "resources.xp", "amount": 1}},
                            "effect": {"targetRef": "layer:idle"}
                        }]
                    }]
                }]
            }]
        }))
        .expect("definition deserializes")
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<IssueCode> {
        issues.iter().map(|issue| issue.code).collect()
    }

    #[test]
    fn valid_definition_passes_clean() {
        assert!(validate_definition(&valid_definition(), &registry()).is_empty());
    }

    #[test]
    fn issues_are_aggregated_not_short_circuited() {
        let mut definition = valid_definition();
        definition.meta.schema_version = "2.0".to_string();
        definition.meta.game_id = "".to_string();
        definition.layers[0].sublayers[0].sections[0].elements[0].effect =
            Some(contracts::EffectDef {
                target_ref: "layer:ghost".to_string(),
            });

        let issues = validate_definition(&definition, &registry());
        let codes = codes(&issues);
        assert!(codes.contains(&IssueCode::SchemaVersionUnsupported));
        assert!(codes.contains(&IssueCode::MissingGameId));
        assert!(codes.contains(&IssueCode::UnresolvedTargetRef));
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn duplicate_sibling_ids_are_flagged_with_pointer_paths() {
        let mut definition = valid_definition();
        let clone = definition.layers[0].sublayers[0].clone();
        definition.layers[0].sublayers.push(clone);

        let issues = validate_definition(&definition, &registry());
        assert!(issues
            .iter()
            .any(|issue| issue.code == IssueCode::DuplicateSiblingId
                && issue.path == "/layers/0/sublayers/1/id"));
    }

    #[test]
    fn unlock_paths_must_resolve_in_initial_state() {
        let mut definition = valid_definition();
        definition.layers[0].unlock =
            Some(json!({"resourceGte": {"path": "resources.mana", "amount": 1}}));

        let issues = validate_definition(&definition, &registry());
        assert_eq!(codes(&issues), vec![IssueCode::UnresolvedUnlockPath]);
    }

    #[test]
    fn malformed_unlock_and_ids_are_startup_fatal() {
        let mut definition = valid_definition();
        definition.layers[0].unlock = Some(json!({"whenReady": true}));
        definition.layers[0].sublayers[0].id = "ma.in".to_string();

        let issues = validate_definition(&definition, &registry());
        let codes = codes(&issues);
        assert!(codes.contains(&IssueCode::InvalidUnlockCondition));
        assert!(codes.contains(&IssueCode::ReservedIdCharacter));
    }

    #[test]
    fn unknown_layer_type_is_reported() {
        let mut definition = valid_definition();
        definition.layers[0].layer_type = "voidLayer".to_string();

        let issues = validate_definition(&definition, &registry());
        assert!(codes(&issues).contains(&IssueCode::UnknownLayerType));
    }

    #[test]
    fn bad_systems_block_is_reported() {
        let mut definition = valid_definition();
        definition
            .systems
            .insert("max_events_per_tick".to_string(), json!("lots"));

        let issues = validate_definition(&definition, &registry());
        assert!(codes(&issues).contains(&IssueCode::InvalidSystemsConfig));
    }
}
