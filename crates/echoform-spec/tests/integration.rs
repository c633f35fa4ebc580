//! Integration tests for echoform-spec.
//!
//! These tests exercise the JSON surface end to end: parse, validate,
//! canonicalize, hash and restrict.

use echoform_spec::{GraphSpec, SpecErrorKind, canonicalize, hash, validate};

const SCENE: &str = r#"{
    "version": 1,
    "schemaId": "echoform.graph",
    "tempo": 96,
    "seed": 42,
    "sampleRate": 44100,
    "assets": [
        {"id": "rain", "kind": "sample", "src": "amb/rain.wav", "loop": true},
        {"id": "bell", "kind": "sample", "src": "fx/bell.wav", "trim": {"start": 0.1, "end": 1.5}}
    ],
    "nodes": [
        {"id": "rainPlayer", "type": "player", "assetId": "rain"},
        {"id": "rainFilter", "type": "filter", "params": {"type": "lowpass", "frequency": 800}},
        {"id": "bellPlayer", "type": "player", "assetId": "bell"},
        {"id": "bellDelay", "type": "delay", "params": {"time": 0.3, "feedback": 0.4}},
        {"id": "drone", "type": "oscillator", "params": {"waveform": "triangle", "frequency": 55}}
    ],
    "connections": [
        {"from": "rainPlayer", "to": "rainFilter"},
        {"from": "bellPlayer", "to": "bellDelay"}
    ],
    "automations": [
        {"id": "sweep", "nodeId": "rainFilter", "param": "frequency",
         "curve": {"mode": "linearRamp", "points": [{"t": 0, "value": 200}, {"t": 4, "value": 4000}]},
         "startTime": 0, "endTime": 4}
    ],
    "buses": [{"id": "space", "gain": 0.5}],
    "sends": [{"from": "bellDelay", "bus": "space", "amount": 0.7}],
    "mix": {"masterGain": 0.9},
    "meta": {"title": "Harbor at night"}
}"#;

/// A realistic multi-branch scene parses and validates.
#[test]
fn test_scene_validates() {
    let spec = GraphSpec::from_json(SCENE).expect("scene parses");
    validate(&spec).expect("scene is valid");
    assert_eq!(spec.sinks(), vec!["rainFilter", "bellDelay", "drone"]);
}

/// Restricting to one branch keeps exactly its nodes, asset and automation.
#[test]
fn test_branch_restriction() {
    let spec = GraphSpec::from_json(SCENE).unwrap();
    let rain = spec.restrict_to("rainFilter").unwrap();
    validate(&rain).expect("restricted spec stays valid");

    let ids: Vec<_> = rain.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["rainPlayer", "rainFilter"]);
    assert_eq!(rain.assets.len(), 1);
    assert_eq!(rain.automations.len(), 1);
    assert!(rain.sends.is_empty());
    assert!(rain.buses.is_empty());

    // The bell's send and the master gain are not part of its export tap.
    let bell = spec.restrict_to("bellDelay").unwrap();
    assert!(bell.buses.is_empty());
    assert!(bell.sends.is_empty());
    assert_eq!(bell.mix.master_gain, 1.0);
    assert!(bell.automations.is_empty());
    assert_ne!(hash(&rain), hash(&bell));
}

/// Serializing the canonical form and parsing it back is a fixed point.
#[test]
fn test_pretty_json_is_canonical() {
    let spec = GraphSpec::from_json(SCENE).unwrap();
    let text = spec.to_json_pretty().unwrap();
    let reparsed = GraphSpec::from_json(&text).unwrap();
    assert_eq!(reparsed, canonicalize(&spec));
    assert_eq!(hash(&reparsed), hash(&spec));
}

/// Reserved curve modes never pass validation.
#[test]
fn test_reserved_mode_rejected() {
    let json = SCENE.replace("linearRamp", "lfoRef");
    let spec = GraphSpec::from_json(&json).unwrap();
    let err = validate(&spec).unwrap_err();
    assert_eq!(err.kind(), SpecErrorKind::ReservedCurveMode);
}
