use crate::cli::{
    ContextualizeArgs,
    CorrectArgs,
    WriteTemplateArgs,
};
use crate::config::Config;
use crate::error::CliError;
use crate::processing::{
    BarProgress,
    read_mid_table,
    read_pathway,
    read_raw_intensities,
    write_corrected_mids,
    write_graph,
};
use isonet::{
    Network,
    calculate_mids,
};
use std::time::Instant;
use tracing::{
    info,
    instrument,
    warn,
};

#[instrument]
pub fn main_correct(args: CorrectArgs) -> Result<(), CliError> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(label) = args.control_label {
        config.correction.control_label = label;
    }
    if args.strict {
        config.correction.strict = true;
    }
    if args.core_count.is_some() {
        config.core_count = args.core_count;
    }
    let core_count = config.resolved_core_count()?;

    let start = Instant::now();
    let rows = read_raw_intensities(&args.input)?;
    let progress = BarProgress::new("correct");
    let report = calculate_mids(
        &rows,
        &config.correction,
        core_count,
        &progress,
        Some(&args.session_id),
    )?;
    progress.finish();

    for failure in &report.failures {
        warn!(
            "Skipped {} / {}: {}",
            failure.name, failure.experiment, failure.error
        );
    }
    write_corrected_mids(&args.output, &report.rows)?;
    println!(
        "Wrote {} corrected MID rows ({} metabolites failed) in {:?}",
        report.rows.len(),
        report.failures.len(),
        start.elapsed()
    );
    Ok(())
}

#[instrument]
pub fn main_contextualize(args: ContextualizeArgs) -> Result<(), CliError> {
    let mut config = Config::load(args.config.as_deref())?;
    if args.seed.is_some() {
        config.network.seed = args.seed;
    }
    if args.core_count.is_some() {
        config.core_count = args.core_count;
    }
    let core_count = config.resolved_core_count()?;

    let start = Instant::now();
    let rows = read_mid_table(&args.input)?;
    let mut network = Network::new(config.network.clone());
    let added = network.read_mid_table(&rows)?;
    info!("{} metabolites passed the node filters", added);

    if let Some(path) = &args.pathway {
        let pathway = read_pathway(path)?;
        network.read_pathway(&pathway)?;
    }

    let cache = config.network.null_model_cache();
    let progress = BarProgress::new("align");
    network.setup_connections(core_count, &cache, &progress, Some(&args.session_id))?;
    progress.finish();
    info!(
        "Ran {} null model simulations for {} length pairs",
        cache.simulation_count(),
        cache.len()
    );

    let graph = network.to_graph();
    write_graph(&args.output, &graph)?;
    println!(
        "Wrote network with {} nodes and {} edges in {:?}",
        graph.nodes.len(),
        graph.edges.len(),
        start.elapsed()
    );
    Ok(())
}

pub fn main_write_template(args: WriteTemplateArgs) -> Result<(), CliError> {
    let target_dir = args.output_path;
    std::fs::create_dir_all(&target_dir)?;

    let config_path = target_dir.join("isonet_config_template.json");
    std::fs::write(&config_path, Config::template()?)?;
    println!("Wrote config template to: {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::path::Path;

    const CONTROL: [f64; 3] = [970.0, 25.0, 5.0];

    fn push_sample(out: &mut String, name: &str, condition: &str, sample: &str, values: &[f64]) {
        for (i, v) in values.iter().enumerate() {
            writeln!(
                out,
                "{},exp1,{},{}_{},M+{},{},{},2.5",
                name,
                condition,
                name,
                sample,
                i,
                v,
                100.0 + i as f64
            )
            .unwrap();
        }
    }

    fn write_raw_table(path: &Path) {
        let mut out =
            String::from("name,experiment,condition,sample,mass_isotopomer,intensity,mz,rt\n");
        let labeled = [
            ("citrate", [250.0, 300.0, 450.0]),
            ("malate", [250.0, 300.0, 450.0]),
            ("alanine", [850.0, 100.0, 50.0]),
        ];
        for (name, values) in labeled {
            push_sample(&mut out, name, "Ctrl", "c1", &CONTROL);
            push_sample(&mut out, name, "Ctrl", "c2", &CONTROL);
            for cond in ["T1", "T2"] {
                for rep in ["r1", "r2"] {
                    push_sample(&mut out, name, cond, &format!("{}_{}", cond, rep), &values);
                }
            }
        }
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_correct_then_contextualize() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        let mids = dir.path().join("out").join("mids.csv");
        let graph = dir.path().join("out").join("graph.json");
        write_raw_table(&raw);

        main_correct(CorrectArgs {
            input: raw,
            output: mids.clone(),
            config: None,
            control_label: None,
            strict: true,
            core_count: Some(1),
            session_id: "test".to_string(),
        })
        .unwrap();

        let written = std::fs::read_to_string(&mids).unwrap();
        let mut lines = written.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("name,experiment,condition,mass_isotopomer,mean,std"));
        assert_eq!(lines.count(), 18);
        assert!(!written.contains(",Ctrl,"));

        main_contextualize(ContextualizeArgs {
            input: mids,
            pathway: None,
            output: graph.clone(),
            config: None,
            seed: Some(11),
            core_count: Some(1),
            session_id: "test".to_string(),
        })
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&graph).unwrap()).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(json["conditions"], serde_json::json!(["T1", "T2"]));
        let edges = json["edges"].as_array().unwrap();
        assert!(edges.iter().any(|e| {
            let d = &e["data"];
            d["source"] == "citrate" && d["target"] == "malate"
        }));
    }

    #[test]
    fn test_missing_control_fails_correct() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.csv");
        write_raw_table(&raw);
        let result = main_correct(CorrectArgs {
            input: raw,
            output: dir.path().join("mids.csv"),
            config: None,
            control_label: Some("Unlabeled".to_string()),
            strict: false,
            core_count: Some(1),
            session_id: "test".to_string(),
        });
        assert!(matches!(result, Err(CliError::Isonet(_))));
    }

    #[test]
    fn test_write_template() {
        let dir = tempfile::tempdir().unwrap();
        main_write_template(WriteTemplateArgs {
            output_path: dir.path().join("templates"),
        })
        .unwrap();
        let path = dir.path().join("templates").join("isonet_config_template.json");
        let config: Config = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(config, Config::default());
    }
}
