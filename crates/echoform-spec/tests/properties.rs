//! Property-based tests for canonicalization, hashing and parameter coercion.

use echoform_spec::{
    Connection, GraphSpec, NodeDef, NodeType, ParamKind, ParamValue, RollingHasher, SpecHasher,
    canonicalize, hash,
};
use proptest::prelude::*;

/// Random graphs of 1-8 nodes with random types, gains and edges.
fn arb_spec() -> impl Strategy<Value = GraphSpec> {
    (1usize..8)
        .prop_flat_map(|n| {
            (
                prop::collection::vec((0usize..NodeType::ALL.len(), -2.0f64..6.0), n),
                prop::collection::vec((0..n, 0..n), 0..n * 2),
                any::<u64>(),
            )
        })
        .prop_map(|(nodes, edges, seed)| {
            let mut spec = GraphSpec {
                seed,
                ..GraphSpec::default()
            };
            for (i, (ty, gain)) in nodes.into_iter().enumerate() {
                spec.nodes.push(
                    NodeDef::new(format!("n{i}"), NodeType::ALL[ty].as_str())
                        .with_param("gain", gain),
                );
            }
            for (from, to) in edges {
                spec.connections
                    .push(Connection::new(format!("n{from}"), format!("n{to}")));
            }
            spec
        })
}

/// A spec together with a reordering of its nodes and connections.
fn arb_permuted() -> impl Strategy<Value = (GraphSpec, GraphSpec)> {
    arb_spec().prop_flat_map(|spec| {
        let nodes = Just(spec.nodes.clone()).prop_shuffle();
        let conns = Just(spec.connections.clone()).prop_shuffle();
        (Just(spec), nodes, conns).prop_map(|(spec, nodes, connections)| {
            let permuted = GraphSpec {
                nodes,
                connections,
                ..spec.clone()
            };
            (spec, permuted)
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// canonicalize(canonicalize(s)) == canonicalize(s).
    #[test]
    fn canonicalize_is_idempotent(spec in arb_spec()) {
        let once = canonicalize(&spec);
        prop_assert_eq!(canonicalize(&once), once);
    }

    /// Reordering nodes and connections never changes the hash.
    #[test]
    fn hash_ignores_construction_order((spec, permuted) in arb_permuted()) {
        prop_assert_eq!(canonicalize(&spec), canonicalize(&permuted));
        prop_assert_eq!(hash(&spec), hash(&permuted));
        prop_assert_eq!(RollingHasher.hash_spec(&spec), RollingHasher.hash_spec(&permuted));
    }

    /// Coerced numeric values always land inside the declared range, and
    /// values outside it land exactly on the nearest bound.
    #[test]
    fn numeric_coercion_clamps(ty in 0usize..NodeType::ALL.len(), raw in -1e6f64..1e6) {
        for param in NodeType::ALL[ty].params() {
            if let ParamKind::Number { min, max, .. } = param.kind {
                let coerced = param.coerce(&ParamValue::Number(raw)).unwrap();
                let v = coerced.value.as_f64().unwrap();
                prop_assert!(v >= min && v <= max);
                if raw < min {
                    prop_assert_eq!(v, min);
                } else if raw > max {
                    prop_assert_eq!(v, max);
                } else {
                    prop_assert_eq!(v, raw);
                }
                prop_assert_eq!(coerced.clamped, raw < min || raw > max);
            }
        }
    }
}
