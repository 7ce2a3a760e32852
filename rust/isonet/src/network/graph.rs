//! Serializable view of a [`Network`](super::Network).
//!
//! Non-finite numbers become `null`.

use super::connection::NetworkConnection;
use super::element::{
    ExperimentSeries,
    Mids,
    NetworkElement,
    NodeType,
    Position,
    Quantification,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

fn finite_vec(xs: &[f64]) -> Vec<Option<f64>> {
    xs.iter().copied().map(finite).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidData {
    pub values: Vec<Option<f64>>,
    pub err: Vec<Option<f64>>,
    pub experiment: String,
    pub condition: String,
    pub fractional_contribution: Option<f64>,
}

impl From<&Mids> for MidData {
    fn from(m: &Mids) -> Self {
        Self {
            values: finite_vec(&m.values),
            err: finite_vec(&m.err),
            experiment: m.experiment.clone(),
            condition: m.condition.clone(),
            fractional_contribution: finite(m.fractional_contribution),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantificationData {
    pub value: Vec<Option<f64>>,
    pub err: Vec<Option<f64>>,
    pub experiment: String,
    pub representative_condition: Option<String>,
}

impl From<&Quantification> for QuantificationData {
    fn from(q: &Quantification) -> Self {
        Self {
            value: finite_vec(&q.value),
            err: finite_vec(&q.err),
            experiment: q.experiment.clone(),
            representative_condition: q.representative_condition.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesData {
    pub value: Vec<Option<f64>>,
    pub experiment: String,
}

impl From<&ExperimentSeries> for SeriesData {
    fn from(s: &ExperimentSeries) -> Self {
        Self {
            value: finite_vec(&s.value),
            experiment: s.experiment.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub name: String,
    pub id: String,
    pub node_id: Option<i64>,
    pub mz: Option<f64>,
    pub rt: Option<f64>,
    pub quantification: Vec<QuantificationData>,
    pub mids: Vec<MidData>,
    pub pool_variability: Option<f64>,
    pub fc_variability: Option<f64>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub fc: Vec<SeriesData>,
    pub fc_pool: Vec<SeriesData>,
}

impl From<&NetworkElement> for NodeData {
    fn from(e: &NetworkElement) -> Self {
        Self {
            name: e.name.clone(),
            id: e.graph_id().to_string(),
            node_id: e.compound_id,
            mz: e.mz.and_then(finite),
            rt: e.rt.and_then(finite),
            quantification: e.quantification.iter().map(Into::into).collect(),
            mids: e.mids.iter().map(Into::into).collect(),
            pool_variability: finite(e.pool_variability),
            fc_variability: finite(e.fc_variability),
            node_type: e.node_type,
            fc: e.fc.iter().map(Into::into).collect(),
            fc_pool: e.fc_pool.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub data: NodeData,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub source: String,
    pub target: String,
    pub experiment: String,
    pub connections: BTreeMap<String, f64>,
    pub min_distance: Option<f64>,
    pub max_distance: Option<f64>,
    pub mean_distance: Option<f64>,
    pub median_distance: Option<f64>,
}

impl EdgeData {
    pub(crate) fn new(conn: &NetworkConnection, source: String, target: String) -> Self {
        Self {
            source,
            target,
            experiment: conn.experiment.clone(),
            connections: conn.connections.clone(),
            min_distance: conn.min_distance.and_then(finite),
            max_distance: conn.max_distance.and_then(finite),
            mean_distance: conn.mean_distance.and_then(finite),
            median_distance: conn.median_distance.and_then(finite),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub data: EdgeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub experiments: Vec<String>,
    pub conditions: Vec<String>,
}

impl NetworkGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.data.id == id)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
