//! Runtime graph: live node instances built from a [`GraphSpec`].
//!
//! Building resolves every spec node to a [`NodeHandle`], applies its
//! parameters (clamping out-of-range numbers with a warning), wires
//! connections, schedules automations, and attaches an export tap to every
//! sink. Processing walks nodes in topological order; each node reads the
//! sum of its upstream outputs.
//!
//! A player whose asset is missing from the supplied map degrades to a silent
//! instance instead of failing the build.

use crate::automation;
use crate::buffer::StereoBuffer;
use crate::error::GraphError;
use crate::node::{BlockContext, NodeHandle};
use crate::nodes::{self, NodeInit};
use echoform_io::AudioBuffer;
use echoform_spec::{GraphSpec, NodeDef, NodeType, validate};
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded assets by asset id.
pub type AssetMap = HashMap<String, Arc<AudioBuffer>>;

/// Host context the graph runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphContext {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Maximum frames per processing call.
    pub block_size: usize,
}

impl Default for GraphContext {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 128,
        }
    }
}

/// Unit-gain tap routing a sink node to the master mix.
#[derive(Debug, Clone)]
pub struct ExportBus {
    /// Whether the tap feeds the master mix (the node is a sink).
    pub connected: bool,
    /// Tap gain.
    pub gain: f32,
}

/// One live node.
#[derive(Debug)]
pub struct RuntimeNode {
    /// Declaration the node was built from.
    pub def: NodeDef,
    /// Control handle.
    pub handle: NodeHandle,
    /// Export tap.
    pub export_bus: ExportBus,
    /// False for players whose asset failed to load.
    pub asset_loaded: bool,
}

/// What the builder had to adjust or skip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// `(node, param)` pairs clamped into range.
    pub clamped: Vec<(String, String)>,
    /// Players built silent because their asset was unavailable.
    pub silent_players: Vec<String>,
    /// Automation events scheduled.
    pub scheduled_events: usize,
}

struct Bus {
    gain: f32,
    sends: Vec<(usize, f32)>,
    buffer: StereoBuffer,
}

/// A built, processable audio graph.
pub struct RuntimeGraph {
    context: GraphContext,
    nodes: Vec<RuntimeNode>,
    index: HashMap<String, usize>,
    inputs: Vec<Vec<usize>>,
    order: Vec<usize>,
    outputs: Vec<StereoBuffer>,
    buses: Vec<Bus>,
    master_gain: f32,
    master: StereoBuffer,
    scratch: StereoBuffer,
    frame: u64,
    solo: Option<usize>,
    report: BuildReport,
}

impl std::fmt::Debug for RuntimeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeGraph")
            .field("context", &self.context)
            .field("nodes", &self.nodes.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl RuntimeGraph {
    /// Builds a runtime graph from `spec`.
    ///
    /// `assets` supplies decoded buffers by asset id; trims are applied here,
    /// once per asset. Fails on an invalid spec or a cycle.
    pub fn build(
        spec: &GraphSpec,
        context: GraphContext,
        assets: &AssetMap,
    ) -> Result<Self, GraphError> {
        validate(spec)?;
        let mut report = BuildReport::default();

        let mut prepared: HashMap<&str, Arc<AudioBuffer>> = HashMap::new();
        for asset in &spec.assets {
            if let Some(buffer) = assets.get(&asset.id) {
                let buffer = match &asset.trim {
                    Some(trim) => Arc::new(buffer.trimmed(trim)),
                    None => Arc::clone(buffer),
                };
                prepared.insert(asset.id.as_str(), buffer);
            }
        }

        let mut nodes = Vec::with_capacity(spec.nodes.len());
        let mut index = HashMap::with_capacity(spec.nodes.len());
        for def in &spec.nodes {
            let node_type: NodeType = def
                .node_type
                .parse()
                .map_err(|_| GraphError::NodeNotFound(def.id.clone()))?;

            let asset = def
                .asset_id
                .as_deref()
                .and_then(|id| prepared.get(id).cloned());
            let asset_loaded = node_type != NodeType::Player || asset.is_some();
            if !asset_loaded {
                tracing::warn!(
                    node = %def.id,
                    asset = ?def.asset_id,
                    "asset unavailable, player will be silent"
                );
                report.silent_players.push(def.id.clone());
            }
            let asset_loops = def
                .asset_id
                .as_deref()
                .and_then(|id| spec.asset(id))
                .is_some_and(|a| a.looping);

            let init = NodeInit {
                sample_rate: context.sample_rate as f32,
                seed: node_seed(spec.seed, &def.id),
                asset,
                asset_loops,
            };
            let mut handle = NodeHandle::new(def.id.clone(), nodes::create(node_type, init));
            let clamped = handle.set(&def.params).map_err(|source| GraphError::Param {
                node: def.id.clone(),
                source,
            })?;
            for param in clamped {
                tracing::warn!(node = %def.id, param = %param, "parameter clamped into range");
                report.clamped.push((def.id.clone(), param));
            }

            index.insert(def.id.clone(), nodes.len());
            nodes.push(RuntimeNode {
                def: def.clone(),
                handle,
                export_bus: ExportBus {
                    connected: spec.is_sink(&def.id),
                    gain: 1.0,
                },
                asset_loaded,
            });
        }

        let mut inputs = vec![Vec::new(); nodes.len()];
        let mut outgoing = vec![Vec::new(); nodes.len()];
        for conn in &spec.connections {
            let from = *index
                .get(&conn.from)
                .ok_or_else(|| GraphError::NodeNotFound(conn.from.clone()))?;
            let to = *index
                .get(&conn.to)
                .ok_or_else(|| GraphError::NodeNotFound(conn.to.clone()))?;
            inputs[to].push(from);
            outgoing[from].push(to);
        }
        let order = kahn_sort(&inputs, &outgoing).map_err(|stuck| GraphError::Cycle {
            nodes: stuck.iter().map(|&i| nodes[i].def.id.clone()).collect(),
        })?;

        for auto in &spec.automations {
            let idx = *index
                .get(&auto.node_id)
                .ok_or_else(|| GraphError::NodeNotFound(auto.node_id.clone()))?;
            let node = &mut nodes[idx];
            let node_type = node.handle.node_type();
            let param = node.handle.raw_control(&auto.param).ok_or_else(|| GraphError::Param {
                node: auto.node_id.clone(),
                source: echoform_spec::ParamError::NotAutomatable {
                    node_type: node_type.as_str().to_string(),
                    param: auto.param.clone(),
                },
            })?;
            report.scheduled_events += automation::schedule(auto, param)?;
        }

        let buses = spec
            .buses
            .iter()
            .map(|bus| Bus {
                gain: bus.gain as f32,
                sends: spec
                    .sends
                    .iter()
                    .filter(|s| s.bus == bus.id)
                    .filter_map(|s| index.get(&s.from).map(|&i| (i, s.amount as f32)))
                    .collect(),
                buffer: StereoBuffer::new(context.block_size),
            })
            .collect();

        tracing::debug!(
            nodes = nodes.len(),
            connections = spec.connections.len(),
            events = report.scheduled_events,
            silent = report.silent_players.len(),
            "built runtime graph"
        );

        let outputs = (0..nodes.len())
            .map(|_| StereoBuffer::new(context.block_size))
            .collect();
        Ok(Self {
            context,
            nodes,
            index,
            inputs,
            order,
            outputs,
            buses,
            master_gain: spec.mix.master_gain as f32,
            master: StereoBuffer::new(context.block_size),
            scratch: StereoBuffer::new(context.block_size),
            frame: 0,
            solo: None,
            report,
        })
    }

    /// Host context.
    pub fn context(&self) -> GraphContext {
        self.context
    }

    /// Adjustments made while building.
    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Live nodes in spec order.
    pub fn nodes(&self) -> &[RuntimeNode] {
        &self.nodes
    }

    /// Looks up a live node.
    pub fn node(&self, id: &str) -> Option<&RuntimeNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Mutable lookup of a live node.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut RuntimeNode> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    /// Processing order as node ids.
    pub fn order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.nodes[i].def.id.as_str())
            .collect()
    }

    /// Frames processed so far.
    pub fn position_frames(&self) -> u64 {
        self.frame
    }

    /// Moves the timeline to `frame` without touching node state; scheduled
    /// automation is evaluated against the new position.
    pub fn set_position_frames(&mut self, frame: u64) {
        self.frame = frame;
    }

    /// Graph time of the next block, seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / f64::from(self.context.sample_rate)
    }

    /// Routes only `node`'s output to the master mix, or restores the normal
    /// mix with `None`.
    pub fn set_solo(&mut self, node: Option<&str>) -> Result<(), GraphError> {
        self.solo = match node {
            Some(id) => Some(
                *self
                    .index
                    .get(id)
                    .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?,
            ),
            None => None,
        };
        Ok(())
    }

    /// Master mix of the most recent block.
    pub fn master(&self) -> &StereoBuffer {
        &self.master
    }

    /// Output of `node` from the most recent block.
    pub fn output(&self, node: &str) -> Option<&StereoBuffer> {
        self.index.get(node).map(|&i| &self.outputs[i])
    }

    /// Processes `frames` frames and returns the master mix.
    pub fn process_block(&mut self, frames: usize) -> &StereoBuffer {
        if self.master.len() != frames {
            self.master.resize(frames);
            self.scratch.resize(frames);
            for out in &mut self.outputs {
                out.resize(frames);
            }
            for bus in &mut self.buses {
                bus.buffer.resize(frames);
            }
        }

        let ctx = BlockContext {
            sample_rate: self.context.sample_rate as f32,
            start_frame: self.frame,
            frames,
        };

        for &idx in &self.order {
            self.scratch.clear();
            for &up in &self.inputs[idx] {
                self.scratch.add_scaled(&self.outputs[up], 1.0);
            }
            self.nodes[idx]
                .handle
                .process(&ctx, &self.scratch, &mut self.outputs[idx]);
        }

        self.master.clear();
        if let Some(idx) = self.solo {
            self.master.add_scaled(&self.outputs[idx], 1.0);
        } else {
            for (node, out) in self.nodes.iter().zip(&self.outputs) {
                if node.export_bus.connected {
                    self.master.add_scaled(out, node.export_bus.gain);
                }
            }
            for bus in &mut self.buses {
                bus.buffer.clear();
                for &(src, amount) in &bus.sends {
                    bus.buffer.add_scaled(&self.outputs[src], amount);
                }
                self.master.add_scaled(&bus.buffer, bus.gain);
            }
        }
        self.master.scale(self.master_gain);

        self.frame += frames as u64;
        &self.master
    }

    /// Renders `frames` frames of the master mix from the current position.
    pub fn render(&mut self, frames: usize) -> AudioBuffer {
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        let block = self.context.block_size.max(1);
        let mut done = 0;
        while done < frames {
            let n = block.min(frames - done);
            let out = self.process_block(n);
            left.extend_from_slice(&out.left);
            right.extend_from_slice(&out.right);
            done += n;
        }
        AudioBuffer::new(vec![left, right], self.context.sample_rate)
    }
}

/// Kahn's algorithm. On a cycle, returns the indices that never reached
/// in-degree zero.
fn kahn_sort(inputs: &[Vec<usize>], outgoing: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = inputs.len();
    let mut in_degree: Vec<usize> = inputs.iter().map(Vec::len).collect();
    let mut queue: Vec<usize> = (0..n).rev().filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(n);

    while let Some(idx) = queue.pop() {
        sorted.push(idx);
        for &to in &outgoing[idx] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                queue.push(to);
            }
        }
    }

    if sorted.len() == n {
        Ok(sorted)
    } else {
        Err((0..n).filter(|&i| in_degree[i] > 0).collect())
    }
}

/// Stable per-node seed: the spec seed mixed with an FNV-1a hash of the id.
fn node_seed(seed: u64, id: &str) -> u64 {
    id.bytes()
        .fold(0xcbf29ce484222325u64 ^ seed, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x100000001b3)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use echoform_spec::{Asset, AutomationDef, BusDef, NodeDef, SendDef, Trim};

    fn ctx() -> GraphContext {
        GraphContext {
            sample_rate: 1000,
            block_size: 16,
        }
    }

    fn dc_asset(frames: usize, value: f32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(vec![vec![value; frames]], 1000))
    }

    fn player_gain() -> GraphSpec {
        GraphSpec::default()
            .with_asset(Asset::sample("a", "a.wav"))
            .with_node(NodeDef::new("p", "player").with_asset("a"))
            .with_node(NodeDef::new("g", "gain").with_param("gain", 0.5))
            .with_connection("p", "g")
    }

    #[test]
    fn sinks_feed_master() {
        let mut assets = AssetMap::new();
        assets.insert("a".into(), dc_asset(100, 1.0));
        let mut graph = RuntimeGraph::build(&player_gain(), ctx(), &assets).unwrap();
        assert!(graph.node("g").unwrap().export_bus.connected);
        assert!(!graph.node("p").unwrap().export_bus.connected);
        assert_eq!(graph.order(), vec!["p", "g"]);

        let out = graph.process_block(8);
        assert_eq!(out.left, vec![0.5; 8]);
        assert_eq!(graph.output("p").unwrap().left, vec![1.0; 8]);
    }

    #[test]
    fn missing_asset_builds_silent_player() {
        let mut graph = RuntimeGraph::build(&player_gain(), ctx(), &AssetMap::new()).unwrap();
        assert!(!graph.node("p").unwrap().asset_loaded);
        assert_eq!(graph.report().silent_players, vec!["p".to_string()]);
        assert_eq!(graph.process_block(4).peak(), 0.0);
    }

    #[test]
    fn out_of_range_params_clamped() {
        let spec = player_gain().with_node(NodeDef::new("h", "gain").with_param("gain", 40.0));
        let graph = RuntimeGraph::build(&spec, ctx(), &AssetMap::new()).unwrap();
        assert_eq!(graph.report().clamped, vec![("h".to_string(), "gain".to_string())]);
        assert_eq!(
            graph.node("h").unwrap().handle.value("gain"),
            Some(echoform_spec::ParamValue::Number(4.0))
        );
    }

    #[test]
    fn cycles_rejected() {
        let spec = GraphSpec::default()
            .with_node(NodeDef::new("a", "gain"))
            .with_node(NodeDef::new("b", "gain"))
            .with_node(NodeDef::new("c", "gain"))
            .with_connection("a", "b")
            .with_connection("b", "c")
            .with_connection("c", "b");
        let err = RuntimeGraph::build(&spec, ctx(), &AssetMap::new()).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                nodes: vec!["b".into(), "c".into()]
            }
        );
    }

    #[test]
    fn automation_drives_gain_over_time() {
        let spec = player_gain().with_automation(AutomationDef::linear(
            "fade",
            "g",
            "gain",
            0.0,
            0.016,
            &[(0.0, 0.0), (0.016, 1.0)],
        ));
        let mut assets = AssetMap::new();
        assets.insert("a".into(), dc_asset(100, 1.0));
        let mut graph = RuntimeGraph::build(&spec, ctx(), &assets).unwrap();
        assert_eq!(graph.report().scheduled_events, 2);
        let out = graph.process_block(16);
        assert_eq!(out.left[0], 0.0);
        assert!((out.left[8] - 0.5).abs() < 1e-4);
        let out = graph.process_block(4);
        assert_eq!(out.left[0], 1.0);
    }

    #[test]
    fn live_write_leaves_automation_running() {
        let spec = player_gain().with_automation(AutomationDef::linear(
            "fade",
            "g",
            "gain",
            0.0,
            0.016,
            &[(0.0, 0.0), (0.016, 1.0)],
        ));
        let mut assets = AssetMap::new();
        assets.insert("a".into(), dc_asset(100, 1.0));
        let mut graph = RuntimeGraph::build(&spec, ctx(), &assets).unwrap();
        graph
            .node_mut("g")
            .unwrap()
            .handle
            .set_param("gain", &echoform_spec::ParamValue::Number(3.0))
            .unwrap();
        let out = graph.process_block(16);
        assert_eq!(out.left[0], 0.0);
        assert!((out.left[8] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn sends_and_buses_mix_in() {
        let mut spec = GraphSpec::default()
            .with_asset(Asset::sample("a", "a.wav"))
            .with_node(NodeDef::new("p", "player").with_asset("a"))
            .with_node(NodeDef::new("g", "gain"))
            .with_connection("p", "g");
        spec.buses.push(BusDef {
            id: "fx".into(),
            gain: 0.5,
        });
        spec.sends.push(SendDef {
            from: "p".into(),
            bus: "fx".into(),
            amount: 0.5,
        });
        spec.mix.master_gain = 2.0;
        let mut assets = AssetMap::new();
        assets.insert("a".into(), dc_asset(100, 1.0));
        let mut graph = RuntimeGraph::build(&spec, ctx(), &assets).unwrap();
        // (1.0 + 0.5 * 0.5) * 2.0
        assert_eq!(graph.process_block(2).left, vec![2.5, 2.5]);

        graph.set_solo(Some("p")).unwrap();
        assert_eq!(graph.process_block(2).left, vec![2.0, 2.0]);
        assert!(graph.set_solo(Some("zz")).is_err());
    }

    #[test]
    fn trim_applies_before_playback() {
        let mut spec = player_gain();
        spec.assets[0].trim = Some(Trim {
            start: 0.0,
            end: Some(0.004),
        });
        let mut assets = AssetMap::new();
        assets.insert("a".into(), dc_asset(100, 1.0));
        let mut graph = RuntimeGraph::build(&spec, ctx(), &assets).unwrap();
        let out = graph.render(8);
        assert_eq!(out.channel(0), &[0.5, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn render_spans_blocks() {
        let mut assets = AssetMap::new();
        assets.insert("a".into(), dc_asset(100, 1.0));
        let mut graph = RuntimeGraph::build(&player_gain(), ctx(), &assets).unwrap();
        let out = graph.render(50);
        assert_eq!(out.frames(), 50);
        assert_eq!(out.channel_count(), 2);
        assert_eq!(graph.position_frames(), 50);
    }
}
