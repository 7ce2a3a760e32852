use isonet::network::NodeType;
use isonet::{
    CorrectionConfig,
    CorrectionMatrix,
    Network,
    NetworkConfig,
    NoProgress,
    NullModelCache,
    PathwayGraph,
    RawIntensityRow,
    calculate_mids,
};

const CONTROL: [f64; 3] = [0.97, 0.025, 0.005];

fn raw_rows(name: &str, condition: &str, sample: &str, relative: &[f64]) -> Vec<RawIntensityRow> {
    relative
        .iter()
        .enumerate()
        .map(|(i, v)| RawIntensityRow {
            name: name.to_string(),
            experiment: "exp1".to_string(),
            condition: condition.to_string(),
            sample: format!("{}_{}", name, sample),
            mass_isotopomer: Some(format!("M+{}", i)),
            isotopologue_mz: None,
            formula: None,
            compound_id: None,
            mz: Some(100.0 + i as f64),
            rt: Some(1.0),
            intensity: v * 1000.0,
        })
        .collect()
}

/// Raw rows of a metabolite whose labeled conditions carry `mid` before
/// natural abundance is added back.
fn metabolite(name: &str, mid: &[f64]) -> Vec<RawIntensityRow> {
    let cm = CorrectionMatrix::from_unlabeled(&CONTROL).unwrap();
    let observed = cm.apply(mid).unwrap();
    let mut rows = raw_rows(name, "Ctrl", "c1", &CONTROL);
    rows.extend(raw_rows(name, "Ctrl", "c2", &CONTROL));
    for cond in ["T1", "T2"] {
        for rep in ["r1", "r2"] {
            rows.extend(raw_rows(name, cond, &format!("{}_{}", cond, rep), &observed));
        }
    }
    rows
}

#[test]
fn test_raw_intensities_to_graph() {
    let mut raw = metabolite("citrate", &[0.2, 0.3, 0.5]);
    raw.extend(metabolite("malate", &[0.2, 0.3, 0.5]));
    raw.extend(metabolite("alanine", &[0.85, 0.1, 0.05]));

    let report = calculate_mids(&raw, &CorrectionConfig::default(), 1, &NoProgress, None).unwrap();
    assert!(report.failures.is_empty());
    // 3 metabolites, 2 labeled conditions, 3 channels.
    assert_eq!(report.rows.len(), 18);
    assert!(report.rows.iter().all(|r| r.condition != "Ctrl"));

    let mut net = Network::new(NetworkConfig {
        seed: Some(3),
        ..NetworkConfig::default()
    });
    let added = net.read_mid_table(&report.mid_table()).unwrap();
    assert_eq!(added, 3);

    let cache = NullModelCache::with_seed(500, 3);
    net.setup_connections(1, &cache, &NoProgress, Some("session")).unwrap();
    // Every qualifying MID has three channels.
    assert_eq!(cache.simulation_count(), 1);

    let graph = net.to_graph();
    assert_eq!(graph.experiments, vec!["exp1"]);
    assert_eq!(graph.conditions, vec!["T1", "T2"]);
    assert_eq!(graph.edges.len(), 1);
    let edge = &graph.edges[0].data;
    assert_eq!((edge.source.as_str(), edge.target.as_str()), ("citrate", "malate"));
    assert_eq!(edge.connections.len(), 4);
    assert!(edge.connections.contains_key("T1_T2"));
    assert!(edge.max_distance.unwrap() < 1e-9);

    let json: serde_json::Value = serde_json::from_str(&graph.to_json_string().unwrap()).unwrap();
    let node = &json["nodes"][0];
    assert_eq!(node["data"]["id"], "citrate");
    assert_eq!(node["data"]["type"], "unknown");
    // A single experiment leaves the ANOVA undefined.
    assert!(node["data"]["pool_variability"].is_null());
    assert!(node["position"]["x"].is_null());
    assert_eq!(node["data"]["mids"][0]["values"].as_array().unwrap().len(), 3);
    assert_eq!(json["edges"][0]["data"]["experiment"], "exp1");
}

#[test]
fn test_pathway_placeholders_survive_serialization() {
    let mut net = Network::default();
    let pathway = PathwayGraph::from_json(
        r#"{"nodes": [
                {"data": {"id": 1, "Label": "Glycolysis"}, "position": {"x": 0.0, "y": 0.0}},
                {"data": {"id": 2, "Label": "TCA", "compound_id": ""}}
            ],
            "edges": [{"data": {"source": 1, "target": 2}}]}"#,
    )
    .unwrap();
    net.read_pathway(&pathway).unwrap();

    let graph = net.to_graph();
    assert_eq!(graph.nodes.len(), 2);
    assert!(graph.nodes.iter().all(|n| n.data.node_type == NodeType::Pathway));
    assert_eq!(graph.nodes[0].data.id, "1");
    assert_eq!(graph.edges[0].data.source, "1");
    assert_eq!(graph.edges[0].data.target, "2");
    assert_eq!(graph.edges[0].data.connections["pathway_pathway"], 0.0);
}
