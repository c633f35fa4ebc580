//! Runtime audio graph for echoform.
//!
//! Turns a validated [`GraphSpec`](echoform_spec::GraphSpec) into live node
//! instances and drives them block by block.
//!
//! # Architecture
//!
//! - [`AudioParam`]: a schedulable parameter (base value plus timed set and
//!   linear-ramp events), sampled per frame
//! - [`AudioNode`]: one node type's signal processing; built-ins live in
//!   [`nodes`]
//! - [`NodeHandle`]: per-node control surface with schema-checked writes and
//!   raw parameter access
//! - [`RuntimeGraph`]: topologically ordered nodes, export taps on sinks,
//!   buses, sends and the master mix
//! - [`render_offline`]: build once and render a fixed number of frames
//!
//! # Example
//!
//! ```rust
//! use echoform_graph::{AssetMap, GraphContext, RuntimeGraph};
//! use echoform_spec::{GraphSpec, NodeDef};
//!
//! let spec = GraphSpec::default()
//!     .with_node(NodeDef::new("osc", "oscillator").with_param("frequency", 220.0))
//!     .with_node(NodeDef::new("out", "gain").with_param("gain", 0.5))
//!     .with_connection("osc", "out");
//!
//! let mut graph = RuntimeGraph::build(&spec, GraphContext::default(), &AssetMap::new()).unwrap();
//! let block = graph.process_block(128);
//! assert_eq!(block.len(), 128);
//! ```

mod automation;
mod buffer;
mod error;
mod graph;
mod node;
pub mod nodes;
mod param;
mod render;

pub use automation::schedule;
pub use buffer::StereoBuffer;
pub use error::GraphError;
pub use graph::{AssetMap, BuildReport, ExportBus, GraphContext, RuntimeGraph, RuntimeNode};
pub use node::{AudioNode, BlockContext, NodeHandle};
pub use param::{AudioParam, EventKind, ParamEvent};
pub use render::{estimate_duration, frames_for, render_offline};
