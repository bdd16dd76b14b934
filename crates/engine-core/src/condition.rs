//! Unlock condition expressions: a tagged AST parsed once from definition
//! JSON, then evaluated against canonical state snapshots.

use std::fmt;

use serde_json::Value;

use crate::store::StateStore;

/// Strict threshold operators at the boundary must never report full
/// progress while still locked.
const STRICT_PROGRESS_CAP: f64 = 1.0 - 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl CompareOp {
    fn from_raw(raw: &str) -> Option<Self> {
        match raw {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "eq" => Some(Self::Eq),
            "neq" => Some(Self::Neq),
            _ => None,
        }
    }

    fn apply(self, current: f64, target: f64) -> bool {
        match self {
            Self::Gt => current > target,
            Self::Gte => current >= target,
            Self::Lt => current < target,
            Self::Lte => current <= target,
            Self::Eq => current == target,
            Self::Neq => current != target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Always(bool),
    ResourceGte { path: String, amount: f64 },
    Compare { path: String, op: CompareOp, value: f64 },
    Flag { path: String },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    NotAnObject,
    NoOperator,
    MultipleOperators,
    UnknownOperator(String),
    InvalidPayload { operator: &'static str, reason: String },
    EmptyChildren(&'static str),
    InvalidCompareOp(String),
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "condition must be an object"),
            Self::NoOperator => write!(f, "condition object has no operator key"),
            Self::MultipleOperators => write!(f, "condition object has more than one operator key"),
            Self::UnknownOperator(operator) => write!(f, "unknown operator: {operator}"),
            Self::InvalidPayload { operator, reason } => {
                write!(f, "invalid payload for {operator}: {reason}")
            }
            Self::EmptyChildren(operator) => {
                write!(f, "{operator} requires at least one child condition")
            }
            Self::InvalidCompareOp(raw) => write!(f, "invalid compare op: {raw}"),
        }
    }
}

impl std::error::Error for ConditionError {}

fn payload_path(payload: &Value, operator: &'static str) -> Result<String, ConditionError> {
    match payload.get("path").and_then(Value::as_str) {
        Some(path) if !path.trim().is_empty() => Ok(path.trim().to_string()),
        _ => Err(ConditionError::InvalidPayload {
            operator,
            reason: "missing or empty path".to_string(),
        }),
    }
}

fn payload_number(payload: &Value, field: &str, operator: &'static str) -> Result<f64, ConditionError> {
    match payload.get(field).and_then(Value::as_f64) {
        Some(number) if number.is_finite() => Ok(number),
        _ => Err(ConditionError::InvalidPayload {
            operator,
            reason: format!("missing or non-finite {field}"),
        }),
    }
}

fn parse_children(raw: &Value, operator: &'static str) -> Result<Vec<Condition>, ConditionError> {
    let Some(entries) = raw.as_array() else {
        return Err(ConditionError::InvalidPayload {
            operator,
            reason: "expected an array of conditions".to_string(),
        });
    };
    if entries.is_empty() {
        return Err(ConditionError::EmptyChildren(operator));
    }
    entries.iter().map(parse_condition).collect()
}

/// Parses the single-operator object form. This is the only place condition
/// errors can surface; evaluation over the parsed AST is total.
pub fn parse_condition(raw: &Value) -> Result<Condition, ConditionError> {
    let Some(object) = raw.as_object() else {
        return Err(ConditionError::NotAnObject);
    };
    let mut keys = object.keys();
    let Some(operator) = keys.next() else {
        return Err(ConditionError::NoOperator);
    };
    if keys.next().is_some() {
        return Err(ConditionError::MultipleOperators);
    }
    let payload = &object[operator];

    match operator.as_str() {
        "always" => match payload.as_bool() {
            Some(flag) => Ok(Condition::Always(flag)),
            None => Err(ConditionError::InvalidPayload {
                operator: "always",
                reason: "expected a boolean".to_string(),
            }),
        },
        "resourceGte" => Ok(Condition::ResourceGte {
            path: payload_path(payload, "resourceGte")?,
            amount: payload_number(payload, "amount", "resourceGte")?,
        }),
        "compare" => {
            let path = payload_path(payload, "compare")?;
            let value = payload_number(payload, "value", "compare")?;
            let raw_op = payload.get("op").and_then(Value::as_str).unwrap_or_default();
            let Some(op) = CompareOp::from_raw(raw_op) else {
                return Err(ConditionError::InvalidCompareOp(raw_op.to_string()));
            };
            Ok(Condition::Compare { path, op, value })
        }
        "flag" => match payload {
            Value::String(path) if !path.trim().is_empty() => Ok(Condition::Flag {
                path: path.trim().to_string(),
            }),
            Value::Object(_) => Ok(Condition::Flag {
                path: payload_path(payload, "flag")?,
            }),
            _ => Err(ConditionError::InvalidPayload {
                operator: "flag",
                reason: "expected a path string or {path}".to_string(),
            }),
        },
        "all" => Ok(Condition::All(parse_children(payload, "all")?)),
        "any" => Ok(Condition::Any(parse_children(payload, "any")?)),
        "not" => Ok(Condition::Not(Box::new(parse_condition(payload)?))),
        other => Err(ConditionError::UnknownOperator(other.to_string())),
    }
}

/// Collects every canonical state path the condition reads.
pub fn state_paths(condition: &Condition) -> Vec<&str> {
    let mut paths = Vec::new();
    collect_paths(condition, &mut paths);
    paths
}

fn collect_paths<'a>(condition: &'a Condition, paths: &mut Vec<&'a str>) {
    match condition {
        Condition::Always(_) => {}
        Condition::ResourceGte { path, .. }
        | Condition::Compare { path, .. }
        | Condition::Flag { path } => paths.push(path),
        Condition::All(children) | Condition::Any(children) => {
            for child in children {
                collect_paths(child, paths);
            }
        }
        Condition::Not(child) => collect_paths(child, paths),
    }
}

fn read_number(store: &StateStore, path: &str) -> Option<f64> {
    store.get(path).and_then(Value::as_f64).filter(|n| n.is_finite())
}

/// Pure truth evaluation. Missing paths and wrong-typed values read as
/// `false`; evaluation never fails.
pub fn evaluate(condition: &Condition, store: &StateStore) -> bool {
    match condition {
        Condition::Always(flag) => *flag,
        Condition::ResourceGte { path, amount } => {
            read_number(store, path).is_some_and(|current| current >= *amount)
        }
        Condition::Compare { path, op, value } => {
            read_number(store, path).is_some_and(|current| op.apply(current, *value))
        }
        Condition::Flag { path } => matches!(store.get(path), Some(Value::Bool(true))),
        Condition::All(children) => children.iter().all(|child| evaluate(child, store)),
        Condition::Any(children) => children.iter().any(|child| evaluate(child, store)),
        Condition::Not(child) => !evaluate(child, store),
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn binary(satisfied: bool) -> f64 {
    if satisfied {
        1.0
    } else {
        0.0
    }
}

fn threshold_progress(current: f64, target: f64, at_least: bool, strict: bool) -> f64 {
    let satisfied = if at_least {
        if strict {
            current > target
        } else {
            current >= target
        }
    } else if strict {
        current < target
    } else {
        current <= target
    };
    if satisfied {
        return 1.0;
    }

    let raw = if target == 0.0 {
        1.0 / (1.0 + current.abs())
    } else {
        let ratio = match (at_least, target > 0.0) {
            (true, true) => current / target,
            (true, false) => target / current,
            (false, true) => target / current,
            (false, false) => current / target,
        };
        clamp01(ratio)
    };
    if strict {
        raw.min(STRICT_PROGRESS_CAP)
    } else {
        raw
    }
}

/// Deterministic progress estimate in `[0, 1]` for UI placeholders.
pub fn estimate_progress(condition: &Condition, store: &StateStore) -> f64 {
    match condition {
        Condition::Always(flag) => binary(*flag),
        Condition::Flag { .. } => binary(evaluate(condition, store)),
        Condition::ResourceGte { path, amount } => {
            if *amount <= 0.0 {
                return binary(evaluate(condition, store));
            }
            let Some(current) = read_number(store, path) else {
                return 0.0;
            };
            clamp01(current / amount)
        }
        Condition::Compare { path, op, value } => {
            let Some(current) = read_number(store, path) else {
                return 0.0;
            };
            match op {
                CompareOp::Eq | CompareOp::Neq => binary(op.apply(current, *value)),
                CompareOp::Gt => threshold_progress(current, *value, true, true),
                CompareOp::Gte => threshold_progress(current, *value, true, false),
                CompareOp::Lt => threshold_progress(current, *value, false, true),
                CompareOp::Lte => threshold_progress(current, *value, false, false),
            }
        }
        Condition::All(children) => {
            let total: f64 = children
                .iter()
                .map(|child| estimate_progress(child, store))
                .sum();
            total / children.len() as f64
        }
        Condition::Any(children) => children
            .iter()
            .map(|child| estimate_progress(child, store))
            .fold(0.0, f64::max),
        Condition::Not(child) => {
            if evaluate(condition, store) {
                1.0
            } else {
                clamp01(1.0 - estimate_progress(child, store))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_with(state: Value) -> StateStore {
        StateStore::new(state)
    }

    fn parsed(raw: Value) -> Condition {
        parse_condition(&raw).expect("condition parses")
    }

    #[test]
    fn parse_accepts_each_operator() {
        parsed(json!({"always": true}));
        parsed(json!({"resourceGte": {"path": "resources.xp", "amount": 5}}));
        parsed(json!({"compare": {"path": "resources.xp", "op": "lt", "value": 3}}));
        parsed(json!({"flag": "flags.tutorialDone"}));
        parsed(json!({"all": [{"always": true}]}));
        parsed(json!({"any": [{"always": false}, {"always": true}]}));
        parsed(json!({"not": {"always": false}}));
    }

    #[test]
    fn parse_rejects_malformed_inputs_with_distinct_codes() {
        assert_eq!(parse_condition(&json!(7)), Err(ConditionError::NotAnObject));
        assert_eq!(parse_condition(&json!({})), Err(ConditionError::NoOperator));
        assert_eq!(
            parse_condition(&json!({"always": true, "flag": "flags.x"})),
            Err(ConditionError::MultipleOperators)
        );
        assert_eq!(
            parse_condition(&json!({"untilDawn": true})),
            Err(ConditionError::UnknownOperator("untilDawn".to_string()))
        );
        assert_eq!(
            parse_condition(&json!({"all": []})),
            Err(ConditionError::EmptyChildren("all"))
        );
        assert_eq!(
            parse_condition(&json!({"compare": {"path": "resources.xp", "op": "between", "value": 1}})),
            Err(ConditionError::InvalidCompareOp("between".to_string()))
        );
        assert!(matches!(
            parse_condition(&json!({"resourceGte": {"path": "resources.xp"}})),
            Err(ConditionError::InvalidPayload { operator: "resourceGte", .. })
        ));
    }

    #[test]
    fn missing_paths_and_wrong_types_evaluate_false() {
        let store = store_with(json!({"resources": {"xp": "plenty"}}));
        assert!(!evaluate(
            &parsed(json!({"resourceGte": {"path": "resources.xp", "amount": 1}})),
            &store
        ));
        assert!(!evaluate(
            &parsed(json!({"resourceGte": {"path": "resources.gold", "amount": 1}})),
            &store
        ));
        assert!(!evaluate(&parsed(json!({"flag": "flags.missing"})), &store));
    }

    #[test]
    fn logical_operators_short_circuit_over_state() {
        let store = store_with(json!({"resources": {"xp": 10}, "flags": {"done": true}}));
        assert!(evaluate(
            &parsed(json!({"all": [
                {"resourceGte": {"path": "resources.xp", "amount": 5}},
                {"flag": "flags.done"}
            ]})),
            &store
        ));
        assert!(evaluate(
            &parsed(json!({"any": [
                {"flag": "flags.absent"},
                {"resourceGte": {"path": "resources.xp", "amount": 5}}
            ]})),
            &store
        ));
        assert!(evaluate(&parsed(json!({"not": {"flag": "flags.absent"}})), &store));
    }

    #[test]
    fn resource_progress_is_linear_and_clamped() {
        let store = store_with(json!({"resources": {"xp": 25}}));
        let half = parsed(json!({"resourceGte": {"path": "resources.xp", "amount": 50}}));
        assert!((estimate_progress(&half, &store) - 0.5).abs() < 1e-12);

        let met = parsed(json!({"resourceGte": {"path": "resources.xp", "amount": 10}}));
        assert_eq!(estimate_progress(&met, &store), 1.0);

        let zero_target = parsed(json!({"resourceGte": {"path": "resources.xp", "amount": 0}}));
        assert_eq!(estimate_progress(&zero_target, &store), 1.0);
    }

    #[test]
    fn strict_threshold_at_boundary_stays_below_one() {
        let store = store_with(json!({"resources": {"xp": 100}}));
        let strict = parsed(json!({"compare": {"path": "resources.xp", "op": "gt", "value": 100}}));
        let progress = estimate_progress(&strict, &store);
        assert!(progress < 1.0);
        assert!(progress > 0.99);

        let negated = parsed(
            json!({"not": {"compare": {"path": "resources.xp", "op": "gt", "value": 100}}}),
        );
        assert_eq!(estimate_progress(&negated, &store), 1.0);
    }

    #[test]
    fn at_most_and_negative_targets_mirror_the_formula() {
        let store = store_with(json!({"resources": {"debt": -5, "heat": 20}}));
        let cooling =
            parsed(json!({"compare": {"path": "resources.heat", "op": "lte", "value": 10}}));
        assert!((estimate_progress(&cooling, &store) - 0.5).abs() < 1e-12);

        let deep_debt =
            parsed(json!({"compare": {"path": "resources.debt", "op": "lte", "value": -10}}));
        assert!((estimate_progress(&deep_debt, &store) - 0.5).abs() < 1e-12);

        let zero_boundary =
            parsed(json!({"compare": {"path": "resources.heat", "op": "lte", "value": 0}}));
        assert!((estimate_progress(&zero_boundary, &store) - 1.0 / 21.0).abs() < 1e-12);
    }

    #[test]
    fn aggregate_progress_uses_mean_and_max() {
        let store = store_with(json!({"resources": {"xp": 25}}));
        let all = parsed(json!({"all": [
            {"always": true},
            {"resourceGte": {"path": "resources.xp", "amount": 50}}
        ]}));
        assert!((estimate_progress(&all, &store) - 0.75).abs() < 1e-12);

        let any = parsed(json!({"any": [
            {"resourceGte": {"path": "resources.xp", "amount": 100}},
            {"resourceGte": {"path": "resources.xp", "amount": 50}}
        ]}));
        assert!((estimate_progress(&any, &store) - 0.5).abs() < 1e-12);
    }
}
