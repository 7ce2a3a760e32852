use crate::stats;
use std::collections::BTreeMap;

/// One side of an edge: a node in the arena or a raw graph identifier.
///
/// Pathway edges name their endpoints by pathway id, and edges whose node
/// was replaced by a pathway copy keep the old id. Both are resolved when
/// the graph is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Node(usize),
    Label(String),
}

/// Significant alignments between two nodes within one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConnection {
    pub source: Endpoint,
    pub target: Endpoint,
    pub experiment: String,
    /// Distance per condition pair, keyed `"{cond1}_{cond2}"`.
    pub connections: BTreeMap<String, f64>,
    pub min_distance: Option<f64>,
    pub max_distance: Option<f64>,
    pub mean_distance: Option<f64>,
    pub median_distance: Option<f64>,
}

impl NetworkConnection {
    pub fn new(source: Endpoint, target: Endpoint, experiment: &str) -> Self {
        Self {
            source,
            target,
            experiment: experiment.to_string(),
            connections: BTreeMap::new(),
            min_distance: None,
            max_distance: None,
            mean_distance: None,
            median_distance: None,
        }
    }

    pub fn add_connection(&mut self, key: String, distance: f64) {
        self.connections.insert(key, distance);
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Recomputes the distance aggregates from the current connections.
    pub fn finalize(&mut self) {
        if self.connections.is_empty() {
            self.min_distance = None;
            self.max_distance = None;
            self.mean_distance = None;
            self.median_distance = None;
            return;
        }
        let distances: Vec<f64> = self.connections.values().copied().collect();
        self.min_distance = distances.iter().copied().reduce(f64::min);
        self.max_distance = distances.iter().copied().reduce(f64::max);
        self.mean_distance = Some(stats::mean(&distances));
        self.median_distance = Some(stats::median(&distances));
    }
}
