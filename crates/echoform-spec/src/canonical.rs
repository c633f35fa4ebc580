//! Deterministic ordering of a [`GraphSpec`].
//!
//! Two specs that describe the same graph canonicalize to equal values, and
//! therefore serialize to identical bytes. Collections are sorted by their ids
//! (connections and sends by their endpoints), automation points by time, and
//! negative zero is folded to zero. Parameter and metadata maps are `BTreeMap`s
//! and already serialize in key order.

use crate::model::{GraphSpec, ParamValue};
use std::cmp::Ordering;

/// Returns the canonical form of `spec`. Idempotent.
pub fn canonicalize(spec: &GraphSpec) -> GraphSpec {
    let mut out = spec.clone();
    canonicalize_in_place(&mut out);
    out
}

/// In-place variant of [`canonicalize`].
pub fn canonicalize_in_place(spec: &mut GraphSpec) {
    spec.tempo = fold_zero(spec.tempo);
    spec.mix.master_gain = fold_zero(spec.mix.master_gain);

    spec.assets.sort_by(|a, b| a.id.cmp(&b.id));
    for asset in &mut spec.assets {
        if let Some(trim) = &mut asset.trim {
            trim.start = fold_zero(trim.start);
            trim.end = trim.end.map(fold_zero);
        }
    }

    spec.nodes.sort_by(|a, b| a.id.cmp(&b.id));
    for node in &mut spec.nodes {
        for value in node.params.values_mut() {
            if let ParamValue::Number(v) = value {
                *v = fold_zero(*v);
            }
        }
    }

    spec.connections.sort();

    spec.automations
        .sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.node_id.cmp(&b.node_id)));
    for auto in &mut spec.automations {
        auto.start_time = fold_zero(auto.start_time);
        auto.end_time = fold_zero(auto.end_time);
        for point in &mut auto.curve.points {
            point.t = fold_zero(point.t);
            point.value = fold_zero(point.value);
        }
        auto.curve
            .points
            .sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap_or(Ordering::Equal));
    }

    spec.buses.sort_by(|a, b| a.id.cmp(&b.id));
    for bus in &mut spec.buses {
        bus.gain = fold_zero(bus.gain);
    }

    for send in &mut spec.sends {
        send.amount = fold_zero(send.amount);
    }
    spec.sends.sort_by(|a, b| {
        a.from
            .cmp(&b.from)
            .then_with(|| a.bus.cmp(&b.bus))
            .then_with(|| a.amount.partial_cmp(&b.amount).unwrap_or(Ordering::Equal))
    });
}

/// Compact canonical JSON bytes, the input to content hashing.
pub fn canonical_bytes(spec: &GraphSpec) -> Vec<u8> {
    // GraphSpec contains only strings, finite-or-null numbers and maps with
    // string keys, which serde_json always serializes.
    serde_json::to_vec(&canonicalize(spec)).unwrap_or_default()
}

fn fold_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AutomationDef, NodeDef};

    fn shuffled() -> (GraphSpec, GraphSpec) {
        let a = GraphSpec::default()
            .with_node(NodeDef::new("b", "gain"))
            .with_node(NodeDef::new("a", "oscillator").with_param("frequency", 220.0))
            .with_connection("a", "b");
        let b = GraphSpec::default()
            .with_node(NodeDef::new("a", "oscillator").with_param("frequency", 220.0))
            .with_node(NodeDef::new("b", "gain"))
            .with_connection("a", "b");
        (a, b)
    }

    #[test]
    fn order_independent() {
        let (a, b) = shuffled();
        assert_ne!(a, b);
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }

    #[test]
    fn idempotent() {
        let (a, _) = shuffled();
        let once = canonicalize(&a);
        assert_eq!(canonicalize(&once), once);
    }

    #[test]
    fn folds_negative_zero_and_sorts_points() {
        let spec = GraphSpec::default()
            .with_node(NodeDef::new("g", "gain").with_param("gain", -0.0))
            .with_automation(AutomationDef::linear(
                "a",
                "g",
                "gain",
                0.0,
                2.0,
                &[(2.0, 0.0), (0.0, 1.0)],
            ));
        let canon = canonicalize(&spec);
        let gain = canon.nodes[0].params["gain"].as_f64().unwrap();
        assert!(gain.is_sign_positive());
        assert_eq!(canon.automations[0].curve.points[0].t, 0.0);
    }
}
