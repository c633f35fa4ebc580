//! Pure graph queries over a [`GraphSpec`]: sinks, upstream closures and
//! sub-graph restriction.

use crate::error::SpecError;
use crate::model::{GraphSpec, MixSettings};
use std::collections::{BTreeSet, HashSet};

impl GraphSpec {
    /// Whether `node` has no outgoing connection.
    pub fn is_sink(&self, node: &str) -> bool {
        !self.connections.iter().any(|c| c.from == node)
    }

    /// Ids of every node with no outgoing connection, in spec order.
    pub fn sinks(&self) -> Vec<&str> {
        let sources: HashSet<&str> = self.connections.iter().map(|c| c.from.as_str()).collect();
        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !sources.contains(id))
            .collect()
    }

    /// Ids of nodes feeding `node` directly.
    pub fn inputs_of(&self, node: &str) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|c| c.to == node)
            .map(|c| c.from.as_str())
            .collect()
    }

    /// `node` plus every node that reaches it by following connections
    /// backward. `None` when `node` does not exist.
    pub fn upstream_closure(&self, node: &str) -> Option<BTreeSet<String>> {
        self.node(node)?;
        let mut seen = BTreeSet::new();
        let mut stack = vec![node.to_string()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            for from in self.inputs_of(&id) {
                if !seen.contains(from) {
                    stack.push(from.to_string());
                }
            }
        }
        Some(seen)
    }

    /// The sub-graph rendering `node` in isolation.
    ///
    /// Keeps the upstream closure of `node`, connections inside it, the assets
    /// its players reference and automations targeting it. The result's only
    /// sink is `node`, so its master mix is exactly the node's export tap:
    /// sends and buses are dropped and the master gain is unity. Seed, tempo
    /// and metadata are preserved.
    pub fn restrict_to(&self, node: &str) -> Result<GraphSpec, SpecError> {
        let keep = self
            .upstream_closure(node)
            .ok_or_else(|| SpecError::UnknownNode {
                context: "render target".to_string(),
                node: node.to_string(),
            })?;
        let kept = |id: &String| keep.contains(id);

        let nodes: Vec<_> = self.nodes.iter().filter(|n| kept(&n.id)).cloned().collect();
        let asset_ids: BTreeSet<&str> = nodes
            .iter()
            .filter_map(|n| n.asset_id.as_deref())
            .collect();

        Ok(GraphSpec {
            version: self.version,
            schema_id: self.schema_id.clone(),
            tempo: self.tempo,
            seed: self.seed,
            sample_rate: self.sample_rate,
            assets: self
                .assets
                .iter()
                .filter(|a| asset_ids.contains(a.id.as_str()))
                .cloned()
                .collect(),
            connections: self
                .connections
                .iter()
                .filter(|c| kept(&c.from) && kept(&c.to))
                .cloned()
                .collect(),
            automations: self
                .automations
                .iter()
                .filter(|a| kept(&a.node_id))
                .cloned()
                .collect(),
            buses: Vec::new(),
            sends: Vec::new(),
            nodes,
            mix: MixSettings::default(),
            meta: self.meta.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Asset, BusDef, GraphSpec, NodeDef, SendDef};

    /// a -> b -> d, c -> d, e -> f (sibling branch)
    fn forked() -> GraphSpec {
        GraphSpec::default()
            .with_asset(Asset::sample("s1", "one.wav"))
            .with_asset(Asset::sample("s2", "two.wav"))
            .with_node(NodeDef::new("a", "player").with_asset("s1"))
            .with_node(NodeDef::new("b", "filter"))
            .with_node(NodeDef::new("c", "oscillator"))
            .with_node(NodeDef::new("d", "gain"))
            .with_node(NodeDef::new("e", "player").with_asset("s2"))
            .with_node(NodeDef::new("f", "gain"))
            .with_connection("a", "b")
            .with_connection("b", "d")
            .with_connection("c", "d")
            .with_connection("e", "f")
    }

    #[test]
    fn sinks_have_no_outgoing_edges() {
        assert_eq!(forked().sinks(), vec!["d", "f"]);
        assert!(forked().is_sink("d"));
        assert!(!forked().is_sink("a"));
    }

    #[test]
    fn closure_follows_edges_backward() {
        let closure = forked().upstream_closure("d").unwrap();
        let ids: Vec<_> = closure.iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(forked().upstream_closure("zzz").is_none());
    }

    #[test]
    fn restriction_excludes_sibling_branch() {
        let sub = forked().restrict_to("b").unwrap();
        let nodes: Vec<_> = sub.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(nodes, vec!["a", "b"]);
        assert_eq!(sub.assets.len(), 1);
        assert_eq!(sub.assets[0].id, "s1");
        assert_eq!(sub.connections.len(), 1);
        assert_eq!(sub.sinks(), vec!["b"]);
    }

    #[test]
    fn restriction_is_the_bare_export_tap() {
        let mut spec = forked();
        spec.buses.push(BusDef {
            id: "verb".into(),
            gain: 0.8,
        });
        spec.sends.push(SendDef {
            from: "a".into(),
            bus: "verb".into(),
            amount: 0.5,
        });
        spec.mix.master_gain = 0.25;

        let sub = spec.restrict_to("d").unwrap();
        assert!(sub.sends.is_empty());
        assert!(sub.buses.is_empty());
        assert_eq!(sub.mix.master_gain, 1.0);
        assert_eq!(sub.seed, spec.seed);
    }
}
