//! Session error taxonomy.

use echoform_cache::AssetLoadError;
use echoform_graph::GraphError;
use echoform_spec::{ParamError, SpecError};
use thiserror::Error;

/// Failure of one `commit`. The session stays usable and earlier cached
/// renders are untouched.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The render would exceed the sample ceiling.
    #[error(
        "render of {duration_secs:.2}s needs {estimated_samples} samples, over the ceiling of {max_samples}"
    )]
    BudgetExceeded {
        /// Estimated duration, seconds.
        duration_secs: f64,
        /// `frames * channels`.
        estimated_samples: u64,
        /// Configured ceiling.
        max_samples: u64,
    },

    /// Requested PCM depth is not supported.
    #[error("unsupported bit depth {0}, expected 16 or 24")]
    UnsupportedBitDepth(u16),

    /// An asset could not be loaded.
    #[error(transparent)]
    Asset(#[from] AssetLoadError),

    /// The restricted graph failed to build.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Encoding the rendered audio failed.
    #[error("encode failed: {0}")]
    Encode(#[from] echoform_io::Error),

    /// The background render task did not complete.
    #[error("render task failed: {0}")]
    Task(String),
}

/// Failure of one spatial call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpatialBindError {
    /// No graph node with this id.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The listener cannot be used.
    #[error("invalid listener: {0}")]
    InvalidListener(String),

    /// The node already has a binding.
    #[error("node '{0}' is already spatially bound")]
    AlreadyBound(String),

    /// The node has no binding.
    #[error("node '{0}' is not spatially bound")]
    NotBound(String),

    /// The transition does not apply in the current mode.
    #[error("binding '{node}' is {mode}, cannot {action}")]
    InvalidTransition {
        /// Node id.
        node: String,
        /// Current mode.
        mode: crate::spatial::SpatialMode,
        /// Attempted operation.
        action: &'static str,
    },

    /// Culling distances leave no hysteresis band.
    #[error("resume distance {resume} must be below cull distance {cull}")]
    NoHysteresis {
        /// Cull distance.
        cull: f64,
        /// Resume distance.
        resume: f64,
    },
}

/// Any failure surfaced by a [`Session`](crate::Session).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The spec, or the spec a mutation would produce, is invalid.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A single parameter write was refused.
    #[error("node '{node}': {source}")]
    Param {
        /// Node id.
        node: String,
        /// Underlying error.
        #[source]
        source: ParamError,
    },

    /// No node with this id.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A node with this id already exists.
    #[error("node already exists: {0}")]
    DuplicateNode(String),

    /// No automation with this id.
    #[error("automation not found: {0}")]
    AutomationNotFound(String),

    /// The connection is already present.
    #[error("already connected: {from} -> {to}")]
    AlreadyConnected {
        /// Source node.
        from: String,
        /// Destination node.
        to: String,
    },

    /// The connection is not present.
    #[error("not connected: {from} -> {to}")]
    NotConnected {
        /// Source node.
        from: String,
        /// Destination node.
        to: String,
    },

    /// Building the runtime graph failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// An asset failed to load.
    #[error(transparent)]
    Asset(#[from] AssetLoadError),

    /// A commit failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// A spatial call failed.
    #[error(transparent)]
    Spatial(#[from] SpatialBindError),

    /// The engine config is invalid.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Nothing left to undo or redo.
    #[error("nothing to {0}")]
    HistoryEmpty(&'static str),

    /// The session was disposed.
    #[error("session disposed")]
    Disposed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_message_mentions_ceiling() {
        let err = RenderError::BudgetExceeded {
            duration_secs: 3600.0,
            estimated_samples: 345_600_000,
            max_samples: 100_000_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("3600.00s"), "got: {msg}");
        assert!(msg.contains("100000000"), "got: {msg}");
    }

    #[test]
    fn render_errors_lift_into_session_errors() {
        let err: SessionError = RenderError::UnsupportedBitDepth(8).into();
        assert!(matches!(err, SessionError::Render(RenderError::UnsupportedBitDepth(8))));
    }
}
