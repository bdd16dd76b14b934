use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::empty_object;

/// Root of a content pack. Immutable after the validation gate accepts it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameDefinition {
    pub meta: DefinitionMeta,
    #[serde(default)]
    pub systems: BTreeMap<String, Value>,
    #[serde(default = "empty_object")]
    pub state: Value,
    #[serde(default)]
    pub layers: Vec<LayerDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionMeta {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(rename = "gameId")]
    pub game_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerDef {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(default)]
    pub unlock: Option<Value>,
    #[serde(default)]
    pub reset: Option<ResetDef>,
    #[serde(default)]
    pub softcaps: Vec<SoftcapDef>,
    #[serde(default)]
    pub sublayers: Vec<SublayerDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResetDef {
    #[serde(default)]
    pub keep: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoftcapDef {
    pub scope: String,
    pub key: String,
    pub threshold: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SublayerDef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub sublayer_type: String,
    #[serde(default)]
    pub unlock: Option<Value>,
    #[serde(default)]
    pub sections: Vec<SectionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionDef {
    pub id: String,
    #[serde(default)]
    pub unlock: Option<Value>,
    #[serde(default)]
    pub elements: Vec<ElementDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElementDef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub element_type: String,
    #[serde(default)]
    pub unlock: Option<Value>,
    #[serde(default)]
    pub effect: Option<EffectDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectDef {
    #[serde(rename = "targetRef")]
    pub target_ref: String,
}
