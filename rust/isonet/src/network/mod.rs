//! Contextualization network of metabolites with similar labeling.
//!
//! Nodes are metabolites with their MIDs per (experiment, condition). Two
//! nodes are connected within an experiment when at least one pair of their
//! labeled conditions aligns significantly better than random MIDs of the
//! same lengths.

mod connection;
mod element;
mod graph;
mod pathway;

pub use connection::{
    Endpoint,
    NetworkConnection,
};
pub use element::{
    ExperimentSeries,
    Mids,
    NetworkElement,
    NodeType,
    Position,
    Quantification,
    fractional_contribution,
};
pub use graph::{
    EdgeData,
    GraphEdge,
    GraphNode,
    MidData,
    NetworkGraph,
    NodeData,
    QuantificationData,
    SeriesData,
};
pub use pathway::{
    IdValue,
    PathwayEdge,
    PathwayGraph,
    PathwayNode,
};

use crate::alignment::{
    MidAligner,
    NullModelCache,
};
use crate::config::{
    NetworkConfig,
    build_pool,
};
use crate::errors::{
    InputValidationError,
    Result,
};
use crate::isotopologue::parse_isotopomer_label;
use crate::progress::{
    PercentReporter,
    ProgressSink,
    map_with_progress,
};
use crate::stats;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use std::collections::{
    BTreeSet,
    HashMap,
};
use tracing::{
    debug,
    info,
    warn,
};

/// One row of the long-format MID table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidTableRow {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_compound_id")]
    pub compound_id: Option<i64>,
    #[serde(deserialize_with = "deserialize_isotopomer")]
    pub mass_isotopomer: usize,
    #[serde(default, alias = "mean")]
    pub mids: Option<f64>,
    #[serde(default, alias = "std")]
    pub cis: Option<f64>,
    #[serde(default)]
    pub intensity_mean: Option<f64>,
    #[serde(default)]
    pub intensity_se: Option<f64>,
    #[serde(default)]
    pub mz: Option<f64>,
    #[serde(default)]
    pub rt: Option<f64>,
    pub experiment: String,
    pub condition: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IsotopomerField {
    Index(u64),
    Label(String),
}

fn deserialize_isotopomer<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match IsotopomerField::deserialize(deserializer)? {
        IsotopomerField::Index(i) => Ok(i as usize),
        IsotopomerField::Label(label) => {
            let trimmed = label.trim();
            match trimmed.parse::<usize>() {
                Ok(i) => Ok(i),
                Err(_) => parse_isotopomer_label(trimmed).map_err(serde::de::Error::custom),
            }
        }
    }
}

fn deserialize_compound_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<IdValue>::deserialize(deserializer)?.and_then(|id| id.as_compound_id()))
}

fn finite_or_zero(x: Option<f64>) -> f64 {
    match x {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Missing MID entries stay missing.
fn value_or_nan(x: Option<f64>) -> f64 {
    x.unwrap_or(f64::NAN)
}

/// The contextualization network.
///
/// Built in three steps: [`Network::read_mid_table`], optionally
/// [`Network::read_pathway`], then [`Network::setup_connections`].
#[derive(Debug, Clone)]
pub struct Network {
    config: NetworkConfig,
    nodes: Vec<NetworkElement>,
    edges: Vec<NetworkConnection>,
    experiments: Vec<String>,
    conditions: Vec<String>,
    condition_pairs: Vec<(String, String)>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            edges: Vec::new(),
            experiments: Vec::new(),
            conditions: Vec::new(),
            condition_pairs: Vec::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn nodes(&self) -> &[NetworkElement] {
        &self.nodes
    }

    pub fn edges(&self) -> &[NetworkConnection] {
        &self.edges
    }

    pub fn experiments(&self) -> &[String] {
        &self.experiments
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// Candidate (condition, condition) pairs compared in every experiment.
    pub fn condition_pairs(&self) -> &[(String, String)] {
        &self.condition_pairs
    }

    /// Builds nodes from the long-format MID table and returns how many were added.
    pub fn read_mid_table(&mut self, rows: &[MidTableRow]) -> Result<usize> {
        for row in rows {
            if !self.experiments.contains(&row.experiment) {
                self.experiments.push(row.experiment.clone());
            }
            if !self.conditions.contains(&row.condition) {
                self.conditions.push(row.condition.clone());
            }
        }
        let labeled: Vec<&String> = self
            .conditions
            .iter()
            .filter(|c| !self.config.excluded_conditions.contains(c))
            .collect();
        self.condition_pairs = labeled
            .iter()
            .flat_map(|a| labeled.iter().map(move |b| ((*a).clone(), (*b).clone())))
            .collect();

        let mut order: Vec<&str> = Vec::new();
        let mut by_name: HashMap<&str, Vec<&MidTableRow>> = HashMap::new();
        for row in rows {
            by_name
                .entry(row.name.as_str())
                .or_insert_with(|| {
                    order.push(row.name.as_str());
                    Vec::new()
                })
                .push(row);
        }

        let mut added = 0;
        for name in order {
            let metabolite_rows = &by_name[name];
            if let Some(node) = self.build_node(name, metabolite_rows) {
                self.nodes.push(node);
                added += 1;
            }
        }
        info!(
            "Built {} nodes from {} rows ({} experiments, {} conditions)",
            added,
            rows.len(),
            self.experiments.len(),
            self.conditions.len()
        );
        Ok(added)
    }

    fn build_node(&self, name: &str, rows: &[&MidTableRow]) -> Option<NetworkElement> {
        let mut groups: HashMap<(&str, &str), Vec<&MidTableRow>> = HashMap::new();
        for row in rows {
            groups
                .entry((row.experiment.as_str(), row.condition.as_str()))
                .or_default()
                .push(row);
        }
        for group in groups.values_mut() {
            group.sort_by_key(|r| r.mass_isotopomer);
        }

        if !groups.values().any(|g| g.len() >= self.config.min_mid_len) {
            debug!("Skipping {}: no MID reaches {} isotopomers", name, self.config.min_mid_len);
            return None;
        }

        for experiment in &self.experiments {
            for condition in &self.config.unlabeled_conditions {
                let m0 = groups
                    .get(&(experiment.as_str(), condition.as_str()))
                    .and_then(|g| g.first())
                    .map(|r| value_or_nan(r.mids));
                // A missing M+0 is not evidence of labeling.
                if let Some(m0) = m0 {
                    if m0.is_finite() && m0 < self.config.m0_threshold {
                        debug!(
                            "Skipping {}: M+0 {:.3} in unlabeled {}/{} is below {}",
                            name, m0, experiment, condition, self.config.m0_threshold
                        );
                        return None;
                    }
                }
            }
        }

        let first = rows[0];
        let mut node = NetworkElement::new(name.to_string(), first.compound_id, first.mz, first.rt);

        let mut all_quants = Vec::with_capacity(self.experiments.len());
        let mut all_fc = Vec::with_capacity(self.experiments.len());
        for experiment in &self.experiments {
            let mut quants = Vec::with_capacity(self.conditions.len());
            let mut ses = Vec::with_capacity(self.conditions.len());
            let mut fcs = Vec::with_capacity(self.conditions.len());
            let mut fc_pool = Vec::with_capacity(self.conditions.len());
            let mut best: Option<(f64, &str)> = None;

            for condition in &self.conditions {
                let group: &[&MidTableRow] = groups
                    .get(&(experiment.as_str(), condition.as_str()))
                    .map(|g| g.as_slice())
                    .unwrap_or(&[]);

                let quant: f64 = group.iter().map(|r| finite_or_zero(r.intensity_mean)).sum();
                let se: f64 = group.iter().map(|r| finite_or_zero(r.intensity_se)).sum();
                if quant > best.map(|(q, _)| q).unwrap_or(0.0) {
                    best = Some((quant, condition.as_str()));
                }

                let values = group.iter().map(|r| value_or_nan(r.mids)).collect();
                let err = group.iter().map(|r| value_or_nan(r.cis)).collect();
                let fc = node.add_mids(experiment, condition, values, err);

                quants.push(quant);
                ses.push(se);
                fcs.push(fc);
                fc_pool.push(fc * quant);
            }

            node.quantification.push(Quantification {
                experiment: experiment.clone(),
                value: quants.clone(),
                err: ses,
                representative_condition: best.map(|(_, c)| c.to_string()),
            });
            node.fc.push(ExperimentSeries {
                experiment: experiment.clone(),
                value: fcs.clone(),
            });
            node.fc_pool.push(ExperimentSeries {
                experiment: experiment.clone(),
                value: fc_pool,
            });
            all_quants.push(quants);
            all_fc.push(fcs);
        }

        if !all_quants
            .iter()
            .any(|q| stats::mean(q) > self.config.min_quant)
        {
            debug!("Skipping {}: no experiment above min_quant {}", name, self.config.min_quant);
            return None;
        }

        node.pool_variability = stats::one_way_anova_pvalue(&all_quants);
        node.fc_variability = stats::one_way_anova_pvalue(&all_fc);
        Some(node)
    }

    /// Places measured nodes onto a pathway layout.
    ///
    /// Pathway nodes whose `compound_id` matches a measured node get a copy
    /// of it with the pathway id, label and position. Matched originals are
    /// removed. Unmatched pathway nodes become placeholders and every
    /// pathway edge becomes a zero-distance `pathway` connection.
    pub fn read_pathway(&mut self, pathway: &PathwayGraph) -> Result<()> {
        let measured = self.nodes.len();
        let mut replaced = vec![false; measured];
        let mut mapped = 0;

        for pnode in &pathway.nodes {
            let graph_id = pnode.data.id.to_string();
            let label = pnode.label();
            let compound_id = pnode
                .data
                .compound_id
                .as_ref()
                .and_then(IdValue::as_compound_id);

            let matched = compound_id.and_then(|cid| {
                self.nodes[..measured]
                    .iter()
                    .position(|n| n.compound_id == Some(cid))
            });
            let new_node = match matched {
                Some(idx) => {
                    replaced[idx] = true;
                    mapped += 1;
                    self.nodes[idx].mapped_copy(label, graph_id, pnode.position)
                }
                None => NetworkElement::pathway_placeholder(label, graph_id, pnode.position),
            };
            self.nodes.push(new_node);
        }

        // Drop the originals and remap the indices of existing edges.
        let mut remap: Vec<Option<usize>> = Vec::with_capacity(self.nodes.len());
        let mut next = 0;
        for i in 0..self.nodes.len() {
            if i < measured && replaced[i] {
                remap.push(None);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }
        let old_ids: Vec<String> = self.nodes.iter().map(|n| n.graph_id().to_string()).collect();
        for edge in &mut self.edges {
            for endpoint in [&mut edge.source, &mut edge.target] {
                if let Endpoint::Node(i) = *endpoint {
                    *endpoint = match remap[i] {
                        Some(j) => Endpoint::Node(j),
                        None => Endpoint::Label(old_ids[i].clone()),
                    };
                }
            }
        }
        let mut keep = remap.iter().map(|r| r.is_some());
        self.nodes.retain(|_| keep.next().unwrap_or(true));

        let known: BTreeSet<&str> = self.nodes.iter().map(|n| n.graph_id()).collect();
        let mut new_edges = Vec::with_capacity(pathway.edges.len());
        for pedge in &pathway.edges {
            let source = pedge.data.source.to_string();
            let target = pedge.data.target.to_string();
            for id in [&source, &target] {
                if !known.contains(id.as_str()) {
                    warn!("Pathway edge references unknown node '{}'", id);
                }
            }
            let mut conn =
                NetworkConnection::new(Endpoint::Label(source), Endpoint::Label(target), "pathway");
            conn.add_connection("pathway_pathway".to_string(), 0.0);
            conn.finalize();
            new_edges.push(conn);
        }
        self.edges.extend(new_edges);

        info!(
            "Merged pathway: {} nodes mapped, {} placeholders, {} edges",
            mapped,
            pathway.nodes.len() - mapped,
            pathway.edges.len()
        );
        Ok(())
    }

    fn qualifies(&self, mids: &Mids) -> bool {
        if mids.values.iter().any(|v| !v.is_finite()) {
            return false;
        }
        let sum = mids.abs_sum();
        let t = self.config.sum_threshold;
        if sum < 1.0 - t || sum > 1.0 + t {
            return false;
        }
        match mids.m0() {
            Some(m0) if m0 <= 1.0 - self.config.min_labeling => {}
            _ => return false,
        }
        mids.fractional_contribution >= self.config.min_labeling
    }

    /// MID lengths that can reach the aligner.
    fn alignable_lengths(&self) -> BTreeSet<usize> {
        self.nodes
            .iter()
            .flat_map(|n| n.mids.iter())
            .filter(|m| self.qualifies(m))
            .map(|m| m.values.len())
            .collect()
    }

    fn connect_pair(
        &self,
        i: usize,
        j: usize,
        aligner: &MidAligner<'_>,
    ) -> std::result::Result<Vec<NetworkConnection>, InputValidationError> {
        let (el1, el2) = (&self.nodes[i], &self.nodes[j]);
        let mut out = Vec::new();
        for experiment in &self.experiments {
            let mut conn: Option<NetworkConnection> = None;
            for (cond1, cond2) in &self.condition_pairs {
                let (Some(mid1), Some(mid2)) = (
                    el1.get_mids(experiment, cond1),
                    el2.get_mids(experiment, cond2),
                ) else {
                    continue;
                };
                if !self.qualifies(mid1) || !self.qualifies(mid2) {
                    continue;
                }
                let alignment = aligner.align(&mid1.values, &mid2.values)?;
                if alignment.is_significant(self.config.significance_z) {
                    conn.get_or_insert_with(|| {
                        NetworkConnection::new(Endpoint::Node(i), Endpoint::Node(j), experiment)
                    })
                    .add_connection(format!("{}_{}", cond1, cond2), alignment.distance);
                }
            }
            if let Some(mut c) = conn {
                c.finalize();
                out.push(c);
            }
        }
        Ok(out)
    }

    /// Aligns every unordered node pair on a pool of `core_count` threads.
    ///
    /// Progress goes to `progress` when a `session_id` is given. Returns the
    /// number of edges added.
    pub fn setup_connections(
        &mut self,
        core_count: usize,
        cache: &NullModelCache,
        progress: &dyn ProgressSink,
        session_id: Option<&str>,
    ) -> Result<usize> {
        let pool = build_pool(core_count)?;
        let n = self.nodes.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        let gap_penalty = self.config.gap_penalty;
        let lengths: Vec<usize> = self.alignable_lengths().into_iter().collect();
        let length_pairs: Vec<(usize, usize)> = lengths
            .iter()
            .enumerate()
            .flat_map(|(k, a)| lengths[k..].iter().map(move |b| (*a, *b)))
            .collect();
        pool.install(|| cache.warm(length_pairs, gap_penalty))?;
        debug!(
            "Null model cache holds {} entries after warmup",
            cache.len()
        );

        info!("Aligning {} node pairs on {} threads", pairs.len(), core_count);
        let aligner = MidAligner::new(cache, gap_penalty);
        let mut reporter = PercentReporter::new(progress, session_id, pairs.len());
        let this = &*self;
        let results = map_with_progress(&pool, &pairs, &mut reporter, |(i, j)| {
            this.connect_pair(*i, *j, &aligner)
        });

        let mut new_edges = Vec::new();
        for r in results {
            new_edges.extend(r?);
        }
        let added = new_edges.len();
        self.edges.extend(new_edges);
        info!("Found {} connections", added);
        Ok(added)
    }

    pub fn to_graph(&self) -> NetworkGraph {
        let resolve = |e: &Endpoint| match e {
            Endpoint::Node(i) => self.nodes[*i].graph_id().to_string(),
            Endpoint::Label(s) => s.clone(),
        };
        NetworkGraph {
            nodes: self
                .nodes
                .iter()
                .map(|n| GraphNode {
                    data: NodeData::from(n),
                    position: n.position,
                })
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|e| !e.is_empty())
                .map(|e| GraphEdge {
                    data: EdgeData::new(e, resolve(&e.source), resolve(&e.target)),
                })
                .collect(),
            experiments: self.experiments.clone(),
            conditions: self.conditions.clone(),
        }
    }
}
