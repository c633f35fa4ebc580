//! Built-in node implementations and the type-to-instance factory.
//!
//! Signal processing here is deliberately plain: sample playback, a naive
//! oscillator, seeded noise, gain, [`biquad`] filtering, a feedback delay and
//! an equal-power panner. The graph machinery around them is what matters.

mod delay;
mod filter;
mod gain;
mod noise;
mod oscillator;
mod panner;
mod player;

pub use delay::Delay;
pub use filter::Filter;
pub use gain::Gain;
pub use noise::Noise;
pub use oscillator::Oscillator;
pub use panner::Panner;
pub use player::Player;

use crate::node::AudioNode;
use echoform_io::AudioBuffer;
use echoform_spec::NodeType;
use std::sync::Arc;

/// Everything a node needs at construction.
#[derive(Debug, Clone)]
pub struct NodeInit {
    /// Context sample rate.
    pub sample_rate: f32,
    /// Per-node seed for stochastic nodes.
    pub seed: u64,
    /// Decoded asset for players. `None` builds a silent player.
    pub asset: Option<Arc<AudioBuffer>>,
    /// Whether the asset is declared looping.
    pub asset_loops: bool,
}

/// Instantiates a node of `node_type` with schema defaults.
pub fn create(node_type: NodeType, init: NodeInit) -> Box<dyn AudioNode> {
    match node_type {
        NodeType::Player => Box::new(Player::new(init.asset, init.asset_loops)),
        NodeType::Oscillator => Box::new(Oscillator::new()),
        NodeType::Noise => Box::new(Noise::new(init.seed)),
        NodeType::Gain => Box::new(Gain::new()),
        NodeType::Filter => Box::new(Filter::new(init.sample_rate)),
        NodeType::Delay => Box::new(Delay::new(init.sample_rate)),
        NodeType::Panner => Box::new(Panner::new()),
    }
}

/// Schema-default parameter for `node_type`.
fn default_param(node_type: NodeType, name: &str) -> crate::AudioParam {
    node_type
        .param(name)
        .map(crate::AudioParam::from_spec)
        .unwrap_or_else(|_| crate::AudioParam::new(0.0, 0.0, 0.0))
}
