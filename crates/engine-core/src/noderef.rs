//! Canonical node references: `layer:<id>[/sublayer:<id>[/section:<id>[/element:<id>]]]`.

use std::fmt;

const SCOPE_ORDER: [&str; 4] = ["layer", "sublayer", "section", "element"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRefError {
    Empty,
    EmptySegment,
    BadFormat,
    EmptyId,
    UnknownScope,
    DuplicateScope,
    OutOfOrder,
    LayerRequired,
}

impl NodeRefError {
    pub fn code(self) -> &'static str {
        match self {
            Self::Empty => "NODE_REF_EMPTY",
            Self::EmptySegment => "NODE_REF_EMPTY_SEGMENT",
            Self::BadFormat => "NODE_REF_BAD_FORMAT",
            Self::EmptyId => "NODE_REF_EMPTY_ID",
            Self::UnknownScope => "NODE_REF_UNKNOWN_SCOPE",
            Self::DuplicateScope => "NODE_REF_DUPLICATE_SCOPE",
            Self::OutOfOrder => "NODE_REF_OUT_OF_ORDER",
            Self::LayerRequired => "NODE_REF_LAYER_REQUIRED",
        }
    }
}

impl fmt::Display for NodeRefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::error::Error for NodeRefError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedNodeRef {
    pub layer: Option<String>,
    pub sublayer: Option<String>,
    pub section: Option<String>,
    pub element: Option<String>,
}

impl ParsedNodeRef {
    pub fn layer(layer_id: &str) -> Self {
        Self {
            layer: Some(layer_id.to_string()),
            ..Self::default()
        }
    }

    fn scopes(&self) -> [(&'static str, Option<&String>); 4] {
        [
            ("layer", self.layer.as_ref()),
            ("sublayer", self.sublayer.as_ref()),
            ("section", self.section.as_ref()),
            ("element", self.element.as_ref()),
        ]
    }

    /// Canonical text rendering. Byte-identical for equivalent references.
    pub fn format(&self) -> String {
        let mut rendered = String::new();
        for (scope, id) in self.scopes() {
            let Some(id) = id else { break };
            if !rendered.is_empty() {
                rendered.push('/');
            }
            rendered.push_str(scope);
            rendered.push(':');
            rendered.push_str(id);
        }
        rendered
    }

    pub fn child(&self, scope_index: usize, id: &str) -> Self {
        let mut next = self.clone();
        match scope_index {
            0 => next.layer = Some(id.to_string()),
            1 => next.sublayer = Some(id.to_string()),
            2 => next.section = Some(id.to_string()),
            _ => next.element = Some(id.to_string()),
        }
        next
    }
}

impl fmt::Display for ParsedNodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Total parser: never panics, never mutates input. Whitespace around each
/// segment, scope name, and id is trimmed.
pub fn parse(raw: &str) -> Result<ParsedNodeRef, NodeRefError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NodeRefError::Empty);
    }

    let mut parsed = ParsedNodeRef::default();
    let mut last_scope: Option<usize> = None;
    for segment in trimmed.split('/') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(NodeRefError::EmptySegment);
        }
        let Some((scope, id)) = segment.split_once(':') else {
            return Err(NodeRefError::BadFormat);
        };
        let scope = scope.trim();
        let id = id.trim();
        let Some(scope_index) = SCOPE_ORDER.iter().position(|known| *known == scope) else {
            return Err(NodeRefError::UnknownScope);
        };
        if id.is_empty() {
            return Err(NodeRefError::EmptyId);
        }
        match last_scope {
            None if scope_index != 0 => return Err(NodeRefError::LayerRequired),
            Some(prev) if scope_index == prev => return Err(NodeRefError::DuplicateScope),
            Some(prev) if scope_index < prev => return Err(NodeRefError::OutOfOrder),
            Some(prev) if scope_index != prev + 1 => return Err(NodeRefError::OutOfOrder),
            _ => {}
        }
        parsed = parsed.child(scope_index, id);
        last_scope = Some(scope_index);
    }

    Ok(parsed)
}

/// Trims whitespace variants and re-renders in canonical scope order.
pub fn normalize(raw: &str) -> Result<String, NodeRefError> {
    parse(raw).map(|parsed| parsed.format())
}
