//! Canonical vs derived state split, enforced as a runtime invariant.

use serde_json::{Map, Value};

use contracts::StateSnapshot;

use crate::error::EngineError;

const DERIVED_ROOT: &str = "derived";

#[derive(Debug, Clone)]
pub struct StateStore {
    canonical: Value,
    derived: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub(crate) fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cursor = root;
    for segment in path.split('.') {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

pub(crate) fn write_path(root: &mut Value, path: &str, value: Value) -> Result<(), EngineError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(EngineError::InvalidStatePath {
            path: path.to_string(),
            reason: "empty path segment".to_string(),
        });
    }

    let mut cursor = root;
    for segment in &segments[..segments.len() - 1] {
        let Some(map) = cursor.as_object_mut() else {
            return Err(EngineError::InvalidStatePath {
                path: path.to_string(),
                reason: format!("segment {segment} is not an object"),
            });
        };
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(empty_object);
    }
    let Some(map) = cursor.as_object_mut() else {
        return Err(EngineError::InvalidStatePath {
            path: path.to_string(),
            reason: "parent of final segment is not an object".to_string(),
        });
    };
    map.insert(segments[segments.len() - 1].to_string(), value);
    Ok(())
}

impl StateStore {
    /// Builds the store from the definition's initial canonical tree. The
    /// validation gate guarantees an object root; anything else collapses to
    /// an empty tree rather than poisoning every later read.
    pub fn new(initial_canonical: Value) -> Self {
        let canonical = if initial_canonical.is_object() {
            initial_canonical
        } else {
            empty_object()
        };
        Self {
            canonical,
            derived: empty_object(),
        }
    }

    fn guard_canonical_path(path: &str) -> Result<(), EngineError> {
        if path.trim().is_empty() {
            return Err(EngineError::InvalidStatePath {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }
        if path == DERIVED_ROOT || path.starts_with("derived.") {
            return Err(EngineError::DerivedWriteRejected {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /// Reads canonical state, or derived state under the `derived.` prefix.
    /// Missing segments read as the absent marker (`None`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path == DERIVED_ROOT {
            return Some(&self.derived);
        }
        if let Some(derived_path) = path.strip_prefix("derived.") {
            return resolve_path(&self.derived, derived_path);
        }
        resolve_path(&self.canonical, path)
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<(), EngineError> {
        Self::guard_canonical_path(path)?;
        write_path(&mut self.canonical, path, value)
    }

    /// Shallow-merges the partial's keys into the node at `path`, which must
    /// be absent or an object.
    pub fn patch(&mut self, path: &str, partial: Value) -> Result<(), EngineError> {
        Self::guard_canonical_path(path)?;
        let Value::Object(entries) = partial else {
            return Err(EngineError::InvalidStatePath {
                path: path.to_string(),
                reason: "patch value must be an object".to_string(),
            });
        };
        match resolve_path(&self.canonical, path) {
            None => write_path(&mut self.canonical, path, empty_object())?,
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(EngineError::PatchTargetNotObject {
                    path: path.to_string(),
                })
            }
        }
        for (key, value) in entries {
            write_path(&mut self.canonical, &format!("{path}.{key}"), value)?;
        }
        Ok(())
    }

    pub fn set_derived(&mut self, path: &str, value: Value) -> Result<(), EngineError> {
        if path.trim().is_empty() {
            return Err(EngineError::InvalidStatePath {
                path: path.to_string(),
                reason: "empty path".to_string(),
            });
        }
        write_path(&mut self.derived, path, value)
    }

    /// Atomically replaces the canonical namespace; used by the reset
    /// service so observers never see an intermediate tree.
    pub(crate) fn replace_canonical(&mut self, baseline: Value) {
        self.canonical = if baseline.is_object() {
            baseline
        } else {
            empty_object()
        };
    }

    /// Owned deep copy of both namespaces, consistent at the call instant.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            canonical: self.canonical.clone(),
            derived: self.derived.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_and_get_round_trip_through_nested_paths() {
        let mut store = StateStore::new(json!({"resources": {"xp": 0}}));
        store.set("resources.xp", json!(12)).expect("set succeeds");
        store.set("layers.idle.jobs.mine", json!({"active": true})).expect("set succeeds");

        assert_eq!(store.get("resources.xp"), Some(&json!(12)));
        assert_eq!(
            store.get("layers.idle.jobs.mine.active"),
            Some(&json!(true))
        );
        assert_eq!(store.get("resources.gold"), None);
        assert_eq!(store.get("resources.xp.deeper"), None);
    }

    #[test]
    fn canonical_writes_into_derived_namespace_fail_without_mutation() {
        let mut store = StateStore::new(json!({}));
        store.set_derived("unlocks", json!({"count": 1})).expect("derived write");

        let err = store.set("derived.unlocks", json!(0)).expect_err("rejected");
        assert!(matches!(err, EngineError::DerivedWriteRejected { .. }));
        let err = store.set("derived", json!(0)).expect_err("rejected");
        assert!(matches!(err, EngineError::DerivedWriteRejected { .. }));
        let err = store
            .patch("derived.unlocks", json!({"count": 2}))
            .expect_err("rejected");
        assert!(matches!(err, EngineError::DerivedWriteRejected { .. }));

        assert_eq!(store.get("derived.unlocks.count"), Some(&json!(1)));
    }

    #[test]
    fn derived_prefix_routes_reads_to_the_derived_tree() {
        let mut store = StateStore::new(json!({"unlocks": "canonical-shadow"}));
        store.set_derived("unlocks.total", json!(3)).expect("derived write");

        assert_eq!(store.get("derived.unlocks.total"), Some(&json!(3)));
        assert_eq!(store.get("unlocks"), Some(&json!("canonical-shadow")));
    }

    #[test]
    fn patch_merges_into_objects_and_rejects_scalars() {
        let mut store = StateStore::new(json!({"resources": {"xp": 1}}));
        store
            .patch("resources", json!({"gold": 5}))
            .expect("patch merges");
        assert_eq!(store.get("resources.xp"), Some(&json!(1)));
        assert_eq!(store.get("resources.gold"), Some(&json!(5)));

        store
            .patch("flags", json!({"intro": true}))
            .expect("patch creates missing node");
        assert_eq!(store.get("flags.intro"), Some(&json!(true)));

        let err = store
            .patch("resources.xp", json!({"nested": 1}))
            .expect_err("scalar target rejected");
        assert!(matches!(err, EngineError::PatchTargetNotObject { .. }));
    }

    #[test]
    fn snapshot_is_an_owned_copy_of_both_namespaces() {
        let mut store = StateStore::new(json!({"resources": {"xp": 1}}));
        store.set_derived("unlocks.total", json!(0)).expect("derived write");
        let snapshot = store.snapshot();

        store.set("resources.xp", json!(99)).expect("set succeeds");
        store.set_derived("unlocks.total", json!(9)).expect("derived write");

        assert_eq!(snapshot.canonical["resources"]["xp"], json!(1));
        assert_eq!(snapshot.derived["unlocks"]["total"], json!(0));
    }
}
