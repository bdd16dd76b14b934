use serde::{Deserialize, Serialize};

/// Read-only projection of currently-unlocked nodes. A node is omitted when
/// it or any ancestor is locked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UiTree {
    pub layers: Vec<UiLayerNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiLayerNode {
    pub id: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(rename = "nodeRef")]
    pub node_ref: String,
    pub sublayers: Vec<UiSublayerNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiSublayerNode {
    pub id: String,
    #[serde(rename = "type")]
    pub sublayer_type: String,
    #[serde(rename = "nodeRef")]
    pub node_ref: String,
    pub sections: Vec<UiSectionNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiSectionNode {
    pub id: String,
    #[serde(rename = "nodeRef")]
    pub node_ref: String,
    pub elements: Vec<UiElementNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiElementNode {
    pub id: String,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(rename = "nodeRef")]
    pub node_ref: String,
}
