//! Property-based tests for parameter scheduling and block processing.

use echoform_graph::{AssetMap, AudioParam, GraphContext, RuntimeGraph};
use echoform_io::AudioBuffer;
use echoform_spec::{Asset, AutomationDef, GraphSpec, NodeDef};
use proptest::prelude::*;
use std::sync::Arc;

fn player_gain(points: &[(f64, f64)]) -> (GraphSpec, AssetMap) {
    let spec = GraphSpec::default()
        .with_asset(Asset::sample("a", "a.wav"))
        .with_node(NodeDef::new("p", "player").with_asset("a"))
        .with_node(NodeDef::new("g", "gain"))
        .with_connection("p", "g")
        .with_automation(AutomationDef::linear("fade", "g", "gain", 0.0, 1.0, points));
    let mut assets = AssetMap::new();
    let ramp: Vec<f32> = (0..2000).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
    assets.insert("a".into(), Arc::new(AudioBuffer::new(vec![ramp], 1000)));
    (spec, assets)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Sampled parameter values never leave the parameter's range.
    #[test]
    fn param_values_stay_in_range(
        base in -10.0f32..10.0,
        events in prop::collection::vec((0.0f64..5.0, -10.0f32..10.0, any::<bool>()), 0..8),
        at in 0.0f64..6.0,
    ) {
        let mut p = AudioParam::new(base, -1.0, 1.0);
        for (t, v, ramp) in events {
            if ramp { p.linear_ramp_to(v, t) } else { p.set_value_at(v, t) }
        }
        let v = p.value_at(at);
        prop_assert!((-1.0..=1.0).contains(&v), "value {} out of range", v);
    }

    /// Output does not depend on how the timeline is split into blocks.
    #[test]
    fn block_size_invariance(
        block in 1usize..200,
        mid in 0.0f64..2.0,
    ) {
        let (spec, assets) = player_gain(&[(0.0, 0.0), (0.5, mid), (1.0, 1.0)]);
        let reference = {
            let ctx = GraphContext { sample_rate: 1000, block_size: 128 };
            RuntimeGraph::build(&spec, ctx, &assets).unwrap().render(1500)
        };
        let ctx = GraphContext { sample_rate: 1000, block_size: block };
        let split = RuntimeGraph::build(&spec, ctx, &assets).unwrap().render(1500);
        prop_assert_eq!(split.frames(), reference.frames());
        for (a, b) in split.channel(0).iter().zip(reference.channel(0)) {
            prop_assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }
}
