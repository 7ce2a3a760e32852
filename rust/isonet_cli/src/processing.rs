use crate::error::CliError;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use isonet::{
    CorrectedMid,
    IsonetError,
    MidTableRow,
    NetworkGraph,
    PathwayGraph,
    ProgressSink,
    RawIntensityRow,
};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::Path;
use tracing::{
    debug,
    info,
};

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CliError> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .trim(csv::Trim::All)
        .from_reader(file);
    let rows = rdr.deserialize().collect::<Result<Vec<T>, csv::Error>>()?;
    info!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn read_raw_intensities(path: &Path) -> Result<Vec<RawIntensityRow>, CliError> {
    read_table(path)
}

pub fn read_mid_table(path: &Path) -> Result<Vec<MidTableRow>, CliError> {
    read_table(path)
}

pub fn read_pathway(path: &Path) -> Result<PathwayGraph, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let pathway = PathwayGraph::from_json(&contents).map_err(IsonetError::from)?;
    debug!(
        "Pathway {} has {} nodes and {} edges",
        path.display(),
        pathway.nodes.len(),
        pathway.edges.len()
    );
    Ok(pathway)
}

fn ensure_parent(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn write_corrected_mids(path: &Path, rows: &[CorrectedMid]) -> Result<(), CliError> {
    ensure_parent(path)?;
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    info!("Wrote {} corrected MID rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn write_graph(path: &Path, graph: &NetworkGraph) -> Result<(), CliError> {
    ensure_parent(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, graph)?;
    writer.flush()?;
    info!(
        "Wrote graph with {} nodes and {} edges to {}",
        graph.nodes.len(),
        graph.edges.len(),
        path.display()
    );
    Ok(())
}

/// Pulls the percent out of a `Progress: 42% [...]` line.
fn parse_percent(message: &str) -> Option<u64> {
    message
        .strip_prefix("Progress: ")?
        .split('%')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Progress sink drawing a terminal bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(prefix: &str) -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::with_template(
            "{prefix} {spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}% ({eta})",
        ) {
            bar.set_style(style);
        }
        bar.set_prefix(prefix.to_string());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

impl ProgressSink for BarProgress {
    fn notify(&self, _session_id: &str, message: &str) {
        match parse_percent(message) {
            Some(percent) => self.bar.set_position(percent),
            None => self.bar.set_message(message.to_string()),
        }
    }
}
