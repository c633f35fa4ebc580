//! GraphSpec data model.
//!
//! A [`GraphSpec`] is the declarative, serializable source of truth for an audio
//! graph. Runtime graphs, renders and undo history are all derived from it.
//! Field names serialize in camelCase so specs interchange with JSON tooling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version understood by this crate.
pub const SPEC_VERSION: u32 = 1;

/// Schema identifier every spec must carry.
pub const SCHEMA_ID: &str = "echoform.graph";

/// Declarative description of an audio graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSpec {
    /// Schema version; must equal [`SPEC_VERSION`].
    pub version: u32,
    /// Schema identifier; must equal [`SCHEMA_ID`].
    pub schema_id: String,
    /// Tempo in BPM. Informational for the engine.
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    /// Seed for every stochastic process (noise nodes, dither).
    #[serde(default)]
    pub seed: u64,
    /// Preferred render sample rate. The engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Audio assets referenced by player nodes.
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Graph nodes.
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    /// Directed edges between nodes.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Timed parameter curves.
    #[serde(default)]
    pub automations: Vec<AutomationDef>,
    /// Auxiliary mix buses.
    #[serde(default)]
    pub buses: Vec<BusDef>,
    /// Node-to-bus sends.
    #[serde(default)]
    pub sends: Vec<SendDef>,
    /// Master mix settings.
    #[serde(default)]
    pub mix: MixSettings,
    /// Free-form metadata carried through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, serde_json::Value>,
}

fn default_tempo() -> f64 {
    120.0
}

fn unity() -> f64 {
    1.0
}

impl Default for GraphSpec {
    fn default() -> Self {
        Self {
            version: SPEC_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            tempo: default_tempo(),
            seed: 0,
            sample_rate: None,
            assets: Vec::new(),
            nodes: Vec::new(),
            connections: Vec::new(),
            automations: Vec::new(),
            buses: Vec::new(),
            sends: Vec::new(),
            mix: MixSettings::default(),
            meta: BTreeMap::new(),
        }
    }
}

impl GraphSpec {
    /// Looks up a node by id.
    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Mutable lookup of a node by id.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeDef> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Looks up an asset by id.
    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Looks up an automation by id.
    pub fn automation(&self, id: &str) -> Option<&AutomationDef> {
        self.automations.iter().find(|a| a.id == id)
    }

    /// Adds a node, builder style.
    pub fn with_node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds an asset, builder style.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    /// Adds a connection, builder style.
    pub fn with_connection(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connections.push(Connection::new(from, to));
        self
    }

    /// Adds an automation, builder style.
    pub fn with_automation(mut self, automation: AutomationDef) -> Self {
        self.automations.push(automation);
        self
    }
}

/// An audio asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset id, unique within the spec.
    pub id: String,
    /// Asset kind. Only samples exist today.
    #[serde(default)]
    pub kind: AssetKind,
    /// Location the loader resolves (path or URL). Also the decoded-buffer cache key.
    pub src: String,
    /// Optional trim window in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<Trim>,
    /// Whether players loop this asset.
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

impl Asset {
    /// Creates a non-looping sample asset.
    pub fn sample(id: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: AssetKind::Sample,
            src: src.into(),
            trim: None,
            looping: false,
        }
    }
}

/// Asset kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    /// A decoded PCM sample.
    #[default]
    Sample,
}

/// Trim window applied to an asset, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Trim {
    /// Start offset.
    #[serde(default)]
    pub start: f64,
    /// End offset. `None` keeps the rest of the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
}

impl Trim {
    /// Length of the trimmed region for an asset of `total` seconds.
    pub fn length(&self, total: f64) -> f64 {
        let start = self.start.clamp(0.0, total);
        let end = self.end.unwrap_or(total).clamp(start, total);
        end - start
    }
}

/// A parameter value as it appears in a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean switch.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Enumerated or free-form text.
    Text(String),
}

impl ParamValue {
    /// Numeric view, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Text view, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// A graph node declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
    /// Node id, unique within the spec.
    pub id: String,
    /// Registered node type name (see [`NodeType`](crate::NodeType)).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Asset played by this node, for player nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    /// Parameter values. Missing parameters take their schema default.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl NodeDef {
    /// Creates a node with no parameters.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            asset_id: None,
            params: BTreeMap::new(),
        }
    }

    /// Sets a parameter, builder style.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the asset reference, builder style.
    pub fn with_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }
}

/// Directed edge `from -> to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source node id.
    pub from: String,
    /// Destination node id.
    pub to: String,
}

impl Connection {
    /// Creates an edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Interpolation mode of an automation curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveMode {
    /// Set the first point, then ramp linearly through the rest.
    LinearRamp,
    /// Reserved. Rejected by validation.
    ExpRamp,
    /// Step to each point's value at its time, no interpolation.
    Points,
    /// Reserved. Rejected by validation.
    LfoRef,
}

impl CurveMode {
    /// Whether the scheduler implements this mode.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::LinearRamp | Self::Points)
    }
}

/// One breakpoint of a curve. `t` is relative to the automation's start time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Offset from `startTime`, seconds.
    pub t: f64,
    /// Target value.
    pub value: f64,
}

/// Curve description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// Interpolation mode.
    pub mode: CurveMode,
    /// Breakpoints.
    #[serde(default)]
    pub points: Vec<CurvePoint>,
}

/// A timed curve driving one node parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationDef {
    /// Automation id. Assigned by the session when empty.
    #[serde(default)]
    pub id: String,
    /// Target node.
    pub node_id: String,
    /// Target parameter.
    pub param: String,
    /// Curve to follow.
    pub curve: Curve,
    /// Absolute start time, seconds.
    #[serde(default)]
    pub start_time: f64,
    /// Absolute end time, seconds. Points past it are ignored.
    pub end_time: f64,
}

impl AutomationDef {
    /// Creates a linear ramp automation from `(t, value)` pairs.
    pub fn linear(
        id: impl Into<String>,
        node_id: impl Into<String>,
        param: impl Into<String>,
        start_time: f64,
        end_time: f64,
        points: &[(f64, f64)],
    ) -> Self {
        Self::with_mode(id, node_id, param, CurveMode::LinearRamp, start_time, end_time, points)
    }

    /// Creates an automation with the given mode from `(t, value)` pairs.
    pub fn with_mode(
        id: impl Into<String>,
        node_id: impl Into<String>,
        param: impl Into<String>,
        mode: CurveMode,
        start_time: f64,
        end_time: f64,
        points: &[(f64, f64)],
    ) -> Self {
        Self {
            id: id.into(),
            node_id: node_id.into(),
            param: param.into(),
            curve: Curve {
                mode,
                points: points
                    .iter()
                    .map(|&(t, value)| CurvePoint { t, value })
                    .collect(),
            },
            start_time,
            end_time,
        }
    }
}

/// Auxiliary mix bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusDef {
    /// Bus id.
    pub id: String,
    /// Linear bus gain.
    #[serde(default = "unity")]
    pub gain: f64,
}

/// A send from a node's output to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendDef {
    /// Sending node.
    pub from: String,
    /// Receiving bus.
    pub bus: String,
    /// Linear send amount.
    #[serde(default = "unity")]
    pub amount: f64,
}

/// Master mix settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixSettings {
    /// Linear master gain.
    #[serde(default = "unity")]
    pub master_gain: f64,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self { master_gain: 1.0 }
    }
}
