use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[default]
    Unknown,
    Mapped,
    Pathway,
}

/// MID of one metabolite for one (experiment, condition).
#[derive(Debug, Clone, PartialEq)]
pub struct Mids {
    pub experiment: String,
    pub condition: String,
    pub values: Vec<f64>,
    pub err: Vec<f64>,
    pub fractional_contribution: f64,
}

impl Mids {
    pub fn abs_sum(&self) -> f64 {
        self.values.iter().map(|v| v.abs()).sum()
    }

    pub fn m0(&self) -> Option<f64> {
        self.values.first().copied()
    }
}

/// Summed quantification for every condition of one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantification {
    pub experiment: String,
    pub value: Vec<f64>,
    pub err: Vec<f64>,
    /// Condition with the largest summed quantification, if any is positive.
    pub representative_condition: Option<String>,
}

/// Per-condition values of one experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSeries {
    pub experiment: String,
    pub value: Vec<f64>,
}

/// Mean label position, `sum(i * v_i) / (len - 1)`, zero for MIDs of length <= 1.
///
/// ```
/// use isonet::network::fractional_contribution;
///
/// assert_eq!(fractional_contribution(&[0.0, 0.0, 1.0]), 1.0);
/// assert_eq!(fractional_contribution(&[1.0]), 0.0);
/// ```
pub fn fractional_contribution(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let weighted: f64 = values.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    weighted / (values.len() - 1) as f64
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkElement {
    pub name: String,
    pub compound_id: Option<i64>,
    /// Identifier in the output graph, the name is used when unset.
    pub graph_id: Option<String>,
    pub mz: Option<f64>,
    pub rt: Option<f64>,
    pub mids: Vec<Mids>,
    pub quantification: Vec<Quantification>,
    pub fc: Vec<ExperimentSeries>,
    pub fc_pool: Vec<ExperimentSeries>,
    pub pool_variability: f64,
    pub fc_variability: f64,
    pub position: Position,
    pub node_type: NodeType,
}

impl NetworkElement {
    pub fn new(name: String, compound_id: Option<i64>, mz: Option<f64>, rt: Option<f64>) -> Self {
        Self {
            name,
            compound_id,
            graph_id: None,
            mz,
            rt,
            mids: Vec::new(),
            quantification: Vec::new(),
            fc: Vec::new(),
            fc_pool: Vec::new(),
            pool_variability: f64::NAN,
            fc_variability: f64::NAN,
            position: Position::default(),
            node_type: NodeType::Unknown,
        }
    }

    /// Node for a pathway entry that matched no measured metabolite.
    pub fn pathway_placeholder(label: String, graph_id: String, position: Position) -> Self {
        Self {
            graph_id: Some(graph_id),
            position,
            node_type: NodeType::Pathway,
            ..Self::new(label, None, None, None)
        }
    }

    /// Copy of a measured node placed on a pathway.
    pub fn mapped_copy(&self, label: String, graph_id: String, position: Position) -> Self {
        Self {
            name: label,
            graph_id: Some(graph_id),
            position,
            node_type: NodeType::Mapped,
            ..self.clone()
        }
    }

    pub fn graph_id(&self) -> &str {
        self.graph_id.as_deref().unwrap_or(&self.name)
    }

    /// Stores the MID and returns its fractional contribution.
    pub fn add_mids(
        &mut self,
        experiment: &str,
        condition: &str,
        values: Vec<f64>,
        err: Vec<f64>,
    ) -> f64 {
        let fc = fractional_contribution(&values);
        self.mids.push(Mids {
            experiment: experiment.to_string(),
            condition: condition.to_string(),
            values,
            err,
            fractional_contribution: fc,
        });
        fc
    }

    pub fn get_mids(&self, experiment: &str, condition: &str) -> Option<&Mids> {
        self.mids
            .iter()
            .find(|m| m.experiment == experiment && m.condition == condition)
    }
}
