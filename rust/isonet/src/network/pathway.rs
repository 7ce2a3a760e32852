//! Pathway graphs in the cytoscape-like JSON layout.

use super::element::Position;
use crate::errors::InputValidationError;
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt::Display;

/// An identifier that may arrive as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl IdValue {
    /// Integer value if this id is a whole number, also when written as text.
    pub fn as_compound_id(&self) -> Option<i64> {
        match self {
            IdValue::Int(x) => Some(*x),
            IdValue::Float(x) => float_to_id(*x),
            IdValue::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_id))
            }
        }
    }
}

fn float_to_id(x: f64) -> Option<i64> {
    (x.is_finite() && x.fract() == 0.0).then_some(x as i64)
}

impl Display for IdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdValue::Int(x) => write!(f, "{}", x),
            IdValue::Float(x) => match float_to_id(*x) {
                Some(i) => write!(f, "{}", i),
                None => write!(f, "{}", x),
            },
            IdValue::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayNodeData {
    pub id: IdValue,
    #[serde(rename = "Label", alias = "label", default)]
    pub label: Option<String>,
    #[serde(default)]
    pub compound_id: Option<IdValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayNode {
    pub data: PathwayNodeData,
    #[serde(default)]
    pub position: Position,
}

impl PathwayNode {
    pub fn label(&self) -> String {
        match &self.data.label {
            Some(l) => l.clone(),
            None => self.data.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayEdgeData {
    pub source: IdValue,
    pub target: IdValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathwayEdge {
    pub data: PathwayEdgeData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathwayGraph {
    #[serde(default)]
    pub nodes: Vec<PathwayNode>,
    #[serde(default)]
    pub edges: Vec<PathwayEdge>,
}

impl PathwayGraph {
    /// Accepts both `{nodes, edges}` and `{elements: {nodes, edges}}`.
    pub fn from_json(json: &str) -> Result<Self, InputValidationError> {
        let mut value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| InputValidationError::InvalidPathway {
                msg: e.to_string(),
            })?;
        if !value.is_object() {
            return Err(InputValidationError::InvalidPathway {
                msg: "expected a JSON object".to_string(),
            });
        }
        let graph = match value.get_mut("elements") {
            Some(elements) => elements.take(),
            None => value,
        };
        serde_json::from_value(graph).map_err(|e| InputValidationError::InvalidPathway {
            msg: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_and_bare_documents() {
        let bare = r#"{
            "nodes": [{"data": {"id": "n1", "Label": "Glucose", "compound_id": 31}, "position": {"x": 1.0, "y": 2.0}}],
            "edges": [{"data": {"source": "n1", "target": "n2"}}]
        }"#;
        let wrapped = format!(r#"{{"elements": {}}}"#, bare);

        let a = PathwayGraph::from_json(bare).unwrap();
        let b = PathwayGraph::from_json(&wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.nodes.len(), 1);
        assert_eq!(a.nodes[0].label(), "Glucose");
        assert_eq!(a.nodes[0].position.x, Some(1.0));
        assert_eq!(a.edges[0].data.target.to_string(), "n2");
    }

    #[test]
    fn test_malformed_wrapped_document_is_rejected() {
        // Node without an id.
        let err = PathwayGraph::from_json(
            r#"{"elements": {"nodes": [{"data": {"Label": "x"}}], "edges": []}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, InputValidationError::InvalidPathway { .. }));

        let err = PathwayGraph::from_json(r#"{"elements": [1, 2]}"#).unwrap_err();
        assert!(matches!(err, InputValidationError::InvalidPathway { .. }));
    }

    #[test]
    fn test_compound_id_forms() {
        assert_eq!(IdValue::Int(7).as_compound_id(), Some(7));
        assert_eq!(IdValue::Float(7.0).as_compound_id(), Some(7));
        assert_eq!(IdValue::Float(7.5).as_compound_id(), None);
        assert_eq!(IdValue::Text(" 12 ".to_string()).as_compound_id(), Some(12));
        assert_eq!(IdValue::Text("C00031".to_string()).as_compound_id(), None);
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(PathwayGraph::from_json("[1, 2]").is_err());
        assert!(PathwayGraph::from_json("not json").is_err());
        assert!(PathwayGraph::from_json(r#"{"nodes": [{"data": {}}]}"#).is_err());
    }
}
