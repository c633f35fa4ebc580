//! Property tests for session editing.

use echoform_cache::{BufferCache, CacheConfig, MemoryLoader};
use echoform_session::{Session, UpdateOptions};
use echoform_spec::{NodeDef, ParamValue};
use proptest::prelude::*;
use std::sync::Arc;

fn session() -> Session {
    let cache = Arc::new(BufferCache::new(
        CacheConfig::default(),
        Arc::new(MemoryLoader::new()),
    ));
    let mut session = Session::builder(cache).build().unwrap();
    session
        .add_node(NodeDef::new("osc", "oscillator"))
        .unwrap();
    session.add_node(NodeDef::new("vca", "gain")).unwrap();
    session.add_node(NodeDef::new("pan", "panner")).unwrap();
    session.connect("osc", "vca").unwrap();
    session.connect("vca", "pan").unwrap();
    session
}

#[derive(Debug, Clone)]
enum Edit {
    Gain(f64),
    Frequency(f64),
    Pan(f64),
    Waveform(&'static str),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (-2.0..6.0f64).prop_map(Edit::Gain),
        (0.0..30000.0f64).prop_map(Edit::Frequency),
        (-3.0..3.0f64).prop_map(Edit::Pan),
        prop::sample::select(vec!["sine", "square", "sawtooth", "triangle"])
            .prop_map(Edit::Waveform),
    ]
}

fn apply(session: &mut Session, edit: &Edit) -> ParamValue {
    let opts = UpdateOptions::default();
    match edit {
        Edit::Gain(v) => session.update_param("vca", "gain", *v, opts),
        Edit::Frequency(v) => session.update_param("osc", "frequency", *v, opts),
        Edit::Pan(v) => session.update_param("pan", "pan", *v, opts),
        Edit::Waveform(w) => session.update_param("osc", "waveform", *w, opts),
    }
    .unwrap()
}

proptest! {
    #[test]
    fn undo_all_restores_then_redo_all_replays(edits in prop::collection::vec(edit(), 1..24)) {
        let mut session = session();
        let base_depth = session.undo_depth();
        let original = session.serialize();

        for e in &edits {
            apply(&mut session, e);
        }
        let edited = session.serialize();
        let edited_hash = session.hash();

        for _ in 0..edits.len() {
            session.undo().unwrap();
        }
        prop_assert_eq!(session.serialize(), original);
        prop_assert_eq!(session.undo_depth(), base_depth);

        for _ in 0..edits.len() {
            session.redo().unwrap();
        }
        prop_assert_eq!(session.serialize(), edited);
        prop_assert_eq!(session.hash(), edited_hash);
    }

    #[test]
    fn applied_values_are_in_range(edits in prop::collection::vec(edit(), 1..24)) {
        let mut session = session();
        for e in &edits {
            let applied = apply(&mut session, e);
            if let Some(v) = applied.as_f64() {
                let (lo, hi) = match e {
                    Edit::Gain(_) => (0.0, 4.0),
                    Edit::Frequency(_) => (20.0, 20000.0),
                    Edit::Pan(_) => (-1.0, 1.0),
                    Edit::Waveform(_) => unreachable!(),
                };
                prop_assert!((lo..=hi).contains(&v));
            }
        }
        for node in session.list_nodes() {
            for (name, value) in &node.params {
                let spec = node.node_type.param(name).unwrap();
                if let (Some((lo, hi)), Some(v)) = (spec.range(), value.as_f64()) {
                    prop_assert!((lo..=hi).contains(&v), "{}.{} = {}", node.id, name, v);
                }
            }
        }
    }
}
