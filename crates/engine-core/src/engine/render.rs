use contracts::{
    GameDefinition, UiElementNode, UiLayerNode, UiSectionNode, UiSublayerNode, UiTree,
    UnlockSummary,
};

use crate::noderef::ParsedNodeRef;

/// Pure projection of the definition filtered by the unlock summary. A node
/// is omitted when it or any ancestor is locked; nesting makes ancestor
/// omission cascade structurally.
pub(super) fn compose_ui(definition: &GameDefinition, unlocks: &UnlockSummary) -> UiTree {
    let unlocked =
        |node_ref: &str| unlocks.unlocked.get(node_ref).copied().unwrap_or(false);

    let mut layers = Vec::new();
    for layer in &definition.layers {
        let layer_ref = ParsedNodeRef::layer(&layer.id);
        let layer_ref_text = layer_ref.format();
        if !unlocked(&layer_ref_text) {
            continue;
        }

        let mut sublayers = Vec::new();
        for sublayer in &layer.sublayers {
            let sublayer_ref = layer_ref.child(1, &sublayer.id);
            let sublayer_ref_text = sublayer_ref.format();
            if !unlocked(&sublayer_ref_text) {
                continue;
            }

            let mut sections = Vec::new();
            for section in &sublayer.sections {
                let section_ref = sublayer_ref.child(2, &section.id);
                let section_ref_text = section_ref.format();
                if !unlocked(&section_ref_text) {
                    continue;
                }

                let mut elements = Vec::new();
                for element in &section.elements {
                    let element_ref_text = section_ref.child(3, &element.id).format();
                    if !unlocked(&element_ref_text) {
                        continue;
                    }
                    elements.push(UiElementNode {
                        id: element.id.clone(),
                        element_type: element.element_type.clone(),
                        node_ref: element_ref_text,
                    });
                }
                sections.push(UiSectionNode {
                    id: section.id.clone(),
                    node_ref: section_ref_text,
                    elements,
                });
            }
            sublayers.push(UiSublayerNode {
                id: sublayer.id.clone(),
                sublayer_type: sublayer.sublayer_type.clone(),
                node_ref: sublayer_ref_text,
                sections,
            });
        }
        layers.push(UiLayerNode {
            id: layer.id.clone(),
            layer_type: layer.layer_type.clone(),
            node_ref: layer_ref_text,
            sublayers,
        });
    }

    UiTree { layers }
}
