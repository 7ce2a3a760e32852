//! Corrected mass isotopomer distributions from raw isotopologue intensities.
//!
//! Rows are processed per (metabolite, experiment) unit:
//!
//! 1. duplicate channel entries of a sample are summed, isotopomers up to the
//!    heaviest one seen are zero filled and every sample is normalized to
//!    relative intensities,
//! 2. the mean relative intensities of the usable control samples build a
//!    [`CorrectionMatrix`],
//! 3. every usable non-control sample is corrected and the corrected vectors
//!    are reduced to mean and standard deviation per condition,
//! 4. trailing isotopomers below [`CorrectionConfig::trim_below`] are dropped
//!    and conditions failing the sum or labeling checks are left empty (`NaN`).
//!
//! A unit that fails numerically is reported and the rest of the batch
//! continues, unless [`CorrectionConfig::strict`] is set.

use crate::config::{
    CorrectionConfig,
    build_pool,
};
use crate::correction::CorrectionMatrix;
use crate::errors::{
    DataProcessingError,
    InputValidationError,
    IsonetError,
    NumericError,
    Result,
};
use crate::isotopologue::{
    IsotopologuePeak,
    assign_mass_isotopomers,
    isotopomer_label,
    parse_isotopomer_label,
};
use crate::network::MidTableRow;
use crate::progress::{
    PercentReporter,
    ProgressSink,
    map_with_progress,
};
use crate::stats;
use serde::{
    Deserialize,
    Serialize,
    Serializer,
};
use std::collections::{
    BTreeMap,
    HashMap,
};
use tracing::{
    debug,
    info,
    warn,
};

/// One raw intensity measurement of one isotopologue channel in one sample.
///
/// The channel is taken from `mass_isotopomer` (`M+i`). Rows without a
/// label are assigned from `isotopologue_mz` relative to the lightest peak
/// of the same metabolite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawIntensityRow {
    pub name: String,
    pub experiment: String,
    pub condition: String,
    pub sample: String,
    #[serde(default)]
    pub mass_isotopomer: Option<String>,
    #[serde(default)]
    pub isotopologue_mz: Option<f64>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub compound_id: Option<i64>,
    #[serde(default)]
    pub mz: Option<f64>,
    #[serde(default)]
    pub rt: Option<f64>,
    pub intensity: f64,
}

fn serialize_isotopomer<S: Serializer>(
    index: &usize,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&isotopomer_label(*index))
}

fn serialize_finite<S: Serializer>(x: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    if x.is_finite() {
        s.serialize_some(x)
    } else {
        s.serialize_none()
    }
}

/// Corrected MID entry for one channel of one condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedMid {
    pub name: String,
    pub experiment: String,
    pub condition: String,
    #[serde(serialize_with = "serialize_isotopomer")]
    pub mass_isotopomer: usize,
    #[serde(serialize_with = "serialize_finite")]
    pub mean: f64,
    #[serde(serialize_with = "serialize_finite")]
    pub std: f64,
    #[serde(serialize_with = "serialize_finite")]
    pub intensity_mean: f64,
    #[serde(serialize_with = "serialize_finite")]
    pub intensity_se: f64,
    pub compound_id: Option<i64>,
    pub mz: Option<f64>,
    pub rt: Option<f64>,
}

impl CorrectedMid {
    pub fn to_mid_table_row(&self) -> MidTableRow {
        let finite = |x: f64| x.is_finite().then_some(x);
        MidTableRow {
            name: self.name.clone(),
            compound_id: self.compound_id,
            mass_isotopomer: self.mass_isotopomer,
            mids: finite(self.mean),
            cis: finite(self.std),
            intensity_mean: finite(self.intensity_mean),
            intensity_se: finite(self.intensity_se),
            mz: self.mz,
            rt: self.rt,
            experiment: self.experiment.clone(),
            condition: self.condition.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    pub name: String,
    pub experiment: String,
    pub error: DataProcessingError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidCalculationReport {
    pub rows: Vec<CorrectedMid>,
    pub failures: Vec<UnitFailure>,
}

impl MidCalculationReport {
    pub fn mid_table(&self) -> Vec<MidTableRow> {
        self.rows.iter().map(CorrectedMid::to_mid_table_row).collect()
    }
}

struct Unit<'a> {
    name: &'a str,
    experiment: &'a str,
    /// (row, channel) pairs.
    entries: Vec<(&'a RawIntensityRow, usize)>,
}

/// Parses labels and assigns channels from m/z where a label is missing.
///
/// Rows dropped by the carbon limit come back as `None`.
fn resolve_channels(
    rows: &[RawIntensityRow],
    carbon_limit: bool,
) -> std::result::Result<Vec<Option<usize>>, InputValidationError> {
    let mut channels = vec![None; rows.len()];
    let mut unlabeled = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match (&row.mass_isotopomer, row.isotopologue_mz) {
            (Some(label), _) if !label.trim().is_empty() => {
                channels[i] = Some(parse_isotopomer_label(label)?);
            }
            (_, Some(mz)) => unlabeled.push((i, mz)),
            _ => {
                return Err(InputValidationError::MissingColumn {
                    column: "mass_isotopomer",
                    context: format!("row {} ({}, sample {})", i, row.name, row.sample),
                });
            }
        }
    }
    if !unlabeled.is_empty() {
        let peaks: Vec<IsotopologuePeak> = unlabeled
            .iter()
            .map(|(i, mz)| IsotopologuePeak {
                compound: rows[*i].name.as_str(),
                mz: *mz,
                formula: rows[*i].formula.as_deref(),
            })
            .collect();
        let assigned = assign_mass_isotopomers(&peaks, carbon_limit);
        for ((i, _), channel) in unlabeled.iter().zip(assigned) {
            channels[*i] = channel;
        }
    }
    Ok(channels)
}

fn group_units<'a>(rows: &'a [RawIntensityRow], channels: &[Option<usize>]) -> Vec<Unit<'a>> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut units: Vec<Unit<'a>> = Vec::new();
    for (row, channel) in rows.iter().zip(channels) {
        let Some(channel) = channel else {
            continue;
        };
        let key = (row.name.as_str(), row.experiment.as_str());
        let slot = *index.entry(key).or_insert_with(|| {
            units.push(Unit {
                name: row.name.as_str(),
                experiment: row.experiment.as_str(),
                entries: Vec::new(),
            });
            units.len() - 1
        });
        units[slot].entries.push((row, *channel));
    }
    units
}

struct SampleIntensities<'a> {
    condition: &'a str,
    channels: BTreeMap<usize, f64>,
    total: f64,
}

impl SampleIntensities<'_> {
    fn relative(&self, structure: &[usize]) -> Vec<f64> {
        structure
            .iter()
            .map(|ch| self.channels.get(ch).copied().unwrap_or(0.0) / self.total)
            .collect()
    }

    fn raw(&self, structure: &[usize]) -> Vec<f64> {
        structure
            .iter()
            .map(|ch| self.channels.get(ch).copied().unwrap_or(0.0))
            .collect()
    }
}

fn collect_samples<'a>(unit: &Unit<'a>) -> Vec<SampleIntensities<'a>> {
    let mut order: HashMap<&str, usize> = HashMap::new();
    let mut samples: Vec<SampleIntensities<'a>> = Vec::new();
    for &(row, channel) in &unit.entries {
        let slot = *order.entry(row.sample.as_str()).or_insert_with(|| {
            samples.push(SampleIntensities {
                condition: row.condition.as_str(),
                channels: BTreeMap::new(),
                total: 0.0,
            });
            samples.len() - 1
        });
        let sample = &mut samples[slot];
        *sample.channels.entry(channel).or_insert(0.0) += row.intensity;
        sample.total += row.intensity;
    }
    samples
}

/// Mean and spread of one condition of a unit.
struct ConditionSummary<'a> {
    condition: &'a str,
    mean: Vec<f64>,
    std: Vec<f64>,
    intensity_mean: Vec<f64>,
    intensity_se: Vec<f64>,
}

impl<'a> ConditionSummary<'a> {
    /// Starts masked, with only the raw intensity statistics filled in.
    fn new(condition: &'a str, samples: &[&SampleIntensities<'_>], structure: &[usize]) -> Self {
        let raw: Vec<Vec<f64>> = samples.iter().map(|s| s.raw(structure)).collect();
        let column = |k: usize| raw.iter().map(|r| r[k]).collect::<Vec<f64>>();
        Self {
            condition,
            mean: vec![f64::NAN; structure.len()],
            std: vec![f64::NAN; structure.len()],
            intensity_mean: (0..structure.len()).map(|k| stats::mean(&column(k))).collect(),
            intensity_se: (0..structure.len())
                .map(|k| stats::standard_error(&column(k)))
                .collect(),
        }
    }

    fn set_corrected(&mut self, corrected: &[Vec<f64>]) {
        for k in 0..self.mean.len() {
            let values: Vec<f64> = corrected.iter().map(|mid| mid[k]).collect();
            self.mean[k] = stats::mean(&values);
            self.std[k] = stats::std_dev(&values, 1);
        }
    }

    fn mask(&mut self) {
        self.mean.fill(f64::NAN);
        self.std.fill(f64::NAN);
    }

    /// Length up to the last isotopomer at or above `cutoff`.
    fn significant_len(&self, cutoff: f64) -> usize {
        self.mean
            .iter()
            .rposition(|m| *m >= cutoff)
            .map_or(0, |i| i + 1)
    }

    fn truncate(&mut self, len: usize) {
        self.mean.truncate(len);
        self.std.truncate(len);
        self.intensity_mean.truncate(len);
        self.intensity_se.truncate(len);
    }

    fn abs_sum(&self) -> f64 {
        self.mean.iter().map(|v| v.abs()).sum()
    }
}

fn is_usable(sample: &SampleIntensities<'_>) -> bool {
    sample.total.is_finite() && sample.total > 0.0
}

fn correct_unit(
    unit: &Unit<'_>,
    config: &CorrectionConfig,
) -> std::result::Result<Vec<CorrectedMid>, DataProcessingError> {
    let samples = collect_samples(unit);
    let is_control = |s: &SampleIntensities| s.condition.contains(config.control_label.as_str());

    // Isotopomers missing from every sample are zero, never skipped.
    let max_channel = unit.entries.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let mut structure: Vec<usize> = (0..=max_channel).collect();

    let mut groups: Vec<(&str, Vec<&SampleIntensities>)> = Vec::new();
    for sample in samples.iter().filter(|s| !is_control(s)) {
        match groups.iter_mut().find(|(c, _)| *c == sample.condition) {
            Some((_, group)) => group.push(sample),
            None => groups.push((sample.condition, vec![sample])),
        }
    }
    let mut summaries: Vec<ConditionSummary> = groups
        .iter()
        .map(|(condition, group)| ConditionSummary::new(*condition, group, &structure))
        .collect();

    let controls: Vec<&SampleIntensities> = samples.iter().filter(|s| is_control(s)).collect();
    let min_m0 = 1.0 - config.max_label;
    let valid_controls: Vec<&SampleIntensities> = controls
        .iter()
        .copied()
        .filter(|s| is_usable(s) && s.relative(&structure)[0] >= min_m0)
        .collect();
    let control_fraction = valid_controls.len() as f64 / controls.len().max(1) as f64;
    if control_fraction < config.min_fraction {
        debug!(
            "{} / {}: only {} of {} controls are usable, MIDs left empty",
            unit.name,
            unit.experiment,
            valid_controls.len(),
            controls.len()
        );
        return Ok(emit_rows(unit, &structure, &summaries));
    }

    if valid_controls.len() < config.min_control_replicates {
        return Err(NumericError::InsufficientControlReplicates {
            replicates: valid_controls.len(),
            required: config.min_control_replicates,
        }
        .into());
    }
    for channel in &structure {
        let seen = valid_controls
            .iter()
            .filter(|s| s.channels.contains_key(channel))
            .count();
        if seen > 0 && seen < config.min_control_replicates {
            return Err(NumericError::InsufficientControlReplicates {
                replicates: seen,
                required: config.min_control_replicates,
            }
            .into());
        }
    }

    let control_rel: Vec<Vec<f64>> = valid_controls
        .iter()
        .map(|s| s.relative(&structure))
        .collect();
    let unlabeled: Vec<f64> = (0..structure.len())
        .map(|k| stats::mean(&control_rel.iter().map(|r| r[k]).collect::<Vec<_>>()))
        .collect();
    let matrix = CorrectionMatrix::from_unlabeled(&unlabeled)?;

    for ((condition, group), summary) in groups.iter().zip(summaries.iter_mut()) {
        let valid: Vec<&SampleIntensities> =
            group.iter().copied().filter(|s| is_usable(s)).collect();
        if valid.is_empty() || (valid.len() as f64) < group.len() as f64 * config.min_fraction {
            debug!(
                "{} / {} / {}: only {} of {} samples are usable",
                unit.name,
                unit.experiment,
                condition,
                valid.len(),
                group.len()
            );
            continue;
        }
        let context = format!(" ({} / {})", unit.name, unit.experiment);
        let corrected = valid
            .iter()
            .map(|s| matrix.correct(&s.relative(&structure)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.append_to_context(&context))?;
        summary.set_corrected(&corrected);
    }

    if let Some(cutoff) = config.trim_below {
        let common = summaries
            .iter()
            .map(|s| s.significant_len(cutoff))
            .max()
            .unwrap_or(0);
        if common > 0 && common < structure.len() {
            structure.truncate(common);
            summaries.iter_mut().for_each(|s| s.truncate(common));
        }
    }

    let (low, high) = (1.0 - config.sum_threshold, 1.0 + config.sum_threshold);
    for summary in summaries.iter_mut() {
        let sum = summary.abs_sum();
        if sum < low || sum > high {
            debug!(
                "{} / {} / {}: corrected MID sums to {:.3}",
                unit.name, unit.experiment, summary.condition, sum
            );
            summary.mask();
        }
    }

    if config.min_label > 0.0 {
        let labeled: Vec<usize> = summaries
            .iter()
            .enumerate()
            .filter(|(_, s)| !config.unlabeled_conditions.iter().any(|u| u == s.condition))
            .map(|(i, _)| i)
            .collect();
        let max_m0 = 1.0 - config.min_label;
        let never_labeled = !labeled.is_empty()
            && labeled
                .iter()
                .all(|&i| summaries[i].mean.first().is_some_and(|m0| *m0 > max_m0));
        if never_labeled {
            debug!(
                "{} / {}: no condition reaches the minimum labeling",
                unit.name, unit.experiment
            );
            for i in labeled {
                summaries[i].mask();
            }
        }
    }

    Ok(emit_rows(unit, &structure, &summaries))
}

fn emit_rows(
    unit: &Unit<'_>,
    structure: &[usize],
    summaries: &[ConditionSummary<'_>],
) -> Vec<CorrectedMid> {
    let compound_id = unit.entries.iter().find_map(|(r, _)| r.compound_id);
    let mz = unit.entries.iter().find_map(|(r, _)| r.mz);
    let rt = unit.entries.iter().find_map(|(r, _)| r.rt);

    let mut out = Vec::with_capacity(summaries.len() * structure.len());
    for summary in summaries {
        for (k, channel) in structure.iter().enumerate() {
            out.push(CorrectedMid {
                name: unit.name.to_string(),
                experiment: unit.experiment.to_string(),
                condition: summary.condition.to_string(),
                mass_isotopomer: *channel,
                mean: summary.mean[k],
                std: summary.std[k],
                intensity_mean: summary.intensity_mean[k],
                intensity_se: summary.intensity_se[k],
                compound_id,
                mz,
                rt,
            });
        }
    }
    out
}

/// Corrects every (metabolite, experiment) unit on a pool of `core_count` threads.
///
/// Malformed labels and units without any control sample abort the batch.
/// Numeric failures are collected in the report.
pub fn calculate_mids(
    rows: &[RawIntensityRow],
    config: &CorrectionConfig,
    core_count: usize,
    progress: &dyn ProgressSink,
    session_id: Option<&str>,
) -> Result<MidCalculationReport> {
    if rows.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("raw intensity table".to_string()),
        }
        .into());
    }
    let channels = resolve_channels(rows, config.use_formula_carbon_limit)?;
    let units = group_units(rows, &channels);

    for unit in &units {
        let has_control = unit
            .entries
            .iter()
            .any(|(r, _)| r.condition.contains(config.control_label.as_str()));
        if !has_control {
            return Err(InputValidationError::EmptyControlGroup {
                control_label: config.control_label.clone(),
                context: format!("{} / {}", unit.name, unit.experiment),
            }
            .into());
        }
    }

    let pool = build_pool(core_count)?;
    info!("Correcting {} metabolite/experiment units", units.len());
    let mut reporter = PercentReporter::new(progress, session_id, units.len());
    let results = map_with_progress(&pool, &units, &mut reporter, |unit| {
        correct_unit(unit, config)
    });

    let mut report = MidCalculationReport::default();
    for (unit, result) in units.iter().zip(results) {
        match result {
            Ok(rows) => report.rows.extend(rows),
            Err(error) => {
                warn!("Correction failed for {} / {}: {}", unit.name, unit.experiment, error);
                if config.strict {
                    return Err(IsonetError::DataProcessing(error));
                }
                report.failures.push(UnitFailure {
                    name: unit.name.to_string(),
                    experiment: unit.experiment.to_string(),
                    error,
                });
            }
        }
    }
    info!(
        "Corrected {} units, {} failed",
        units.len() - report.failures.len(),
        report.failures.len()
    );
    Ok(report)
}
