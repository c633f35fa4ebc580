//! End-to-end graph tests: build from spec JSON, process, encode.

use echoform_graph::{AssetMap, GraphContext, GraphError, RuntimeGraph, render_offline};
use echoform_io::{AudioBuffer, EncodeOptions, decode_wav, encode_wav};
use echoform_spec::{GraphSpec, ParamValue};
use std::sync::Arc;

const CHAIN: &str = r#"{
  "version": 1,
  "schemaId": "echoform.graph",
  "seed": 7,
  "assets": [{ "id": "hit", "kind": "sample", "src": "hit.wav" }],
  "nodes": [
    { "id": "p", "type": "player", "assetId": "hit" },
    { "id": "lp", "type": "filter", "params": { "type": "lowpass", "frequency": 2000 } },
    { "id": "d", "type": "delay", "params": { "time": 0.01, "feedback": 0.2 } },
    { "id": "pan", "type": "panner", "params": { "pan": -1 } }
  ],
  "connections": [
    { "from": "p", "to": "lp" },
    { "from": "lp", "to": "d" },
    { "from": "d", "to": "pan" }
  ]
}"#;

fn ctx() -> GraphContext {
    GraphContext {
        sample_rate: 8000,
        block_size: 64,
    }
}

fn hit() -> AssetMap {
    let mut samples = vec![0.0f32; 800];
    for (i, s) in samples.iter_mut().take(80).enumerate() {
        *s = (i as f32 * 0.3).sin() * 0.5;
    }
    let mut map = AssetMap::new();
    map.insert("hit".into(), Arc::new(AudioBuffer::new(vec![samples], 8000)));
    map
}

#[test]
fn chain_processes_in_order() {
    let spec: GraphSpec = serde_json::from_str(CHAIN).unwrap();
    let mut graph = RuntimeGraph::build(&spec, ctx(), &hit()).unwrap();
    assert_eq!(graph.order(), vec!["p", "lp", "d", "pan"]);
    let sinks: Vec<_> = graph
        .nodes()
        .iter()
        .filter(|n| n.export_bus.connected)
        .map(|n| n.def.id.as_str())
        .collect();
    assert_eq!(sinks, vec!["pan"]);

    let out = graph.render(800);
    assert!(out.channel(0).iter().any(|s| s.abs() > 0.01));
    // Hard left pan silences the right channel.
    assert!(out.channel(1).iter().all(|s| s.abs() < 1e-6));
}

#[test]
fn live_param_write_changes_output() {
    let spec: GraphSpec = serde_json::from_str(CHAIN).unwrap();
    let mut graph = RuntimeGraph::build(&spec, ctx(), &hit()).unwrap();
    let node = graph.node_mut("pan").unwrap();
    let coerced = node
        .handle
        .set_param("pan", &ParamValue::Number(3.0))
        .unwrap();
    assert!(coerced.clamped);
    let out = graph.render(800);
    assert!(out.channel(0).iter().all(|s| s.abs() < 1e-6));
    assert!(out.channel(1).iter().any(|s| s.abs() > 0.01));
}

#[test]
fn unknown_type_fails_validation() {
    let json = CHAIN.replace("\"panner\"", "\"reverb\"");
    let spec: GraphSpec = serde_json::from_str(&json).unwrap();
    let err = RuntimeGraph::build(&spec, ctx(), &hit()).unwrap_err();
    assert!(matches!(err, GraphError::Spec(_)), "{err}");
}

#[test]
fn player_to_gain_renders_and_encodes() {
    let spec = GraphSpec::default()
        .with_asset(echoform_spec::Asset::sample("a", "a.wav"))
        .with_node(echoform_spec::NodeDef::new("p", "player").with_asset("a"))
        .with_node(echoform_spec::NodeDef::new("g", "gain").with_param("gain", 0.5))
        .with_connection("p", "g");
    let mut assets = AssetMap::new();
    assets.insert(
        "a".into(),
        Arc::new(AudioBuffer::new(vec![vec![0.8; 4000]], 8000)),
    );
    let (buffer, report) = render_offline(&spec, ctx(), &assets, 4000).unwrap();
    assert!(report.silent_players.is_empty());
    assert!((buffer.peak() - 0.4).abs() < 1e-6);

    let encoded = encode_wav(&buffer, &EncodeOptions::default()).unwrap();
    let decoded = decode_wav(&encoded.bytes).unwrap();
    assert_eq!(decoded.frames(), 4000);
    assert_eq!(decoded.channel_count(), 2);
    assert_eq!(decoded.sample_rate(), 8000);
}
