//! Runtime graph errors.

use echoform_spec::{CurveMode, ParamError, SpecError};
use thiserror::Error;

/// Failure building or driving a runtime graph.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    /// The spec did not validate.
    #[error("invalid spec: {0}")]
    Spec(#[from] SpecError),

    /// Connections form a cycle.
    #[error("connections form a cycle through: {}", nodes.join(", "))]
    Cycle {
        /// Nodes on or downstream of the cycle.
        nodes: Vec<String>,
    },

    /// No node with this id.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Automation curve mode is reserved.
    #[error("automation '{automation}' uses unsupported curve mode {mode:?}")]
    UnsupportedCurve {
        /// Automation id.
        automation: String,
        /// Offending mode.
        mode: CurveMode,
    },

    /// A parameter write was refused.
    #[error("node '{node}': {source}")]
    Param {
        /// Node id.
        node: String,
        /// Underlying error.
        #[source]
        source: ParamError,
    },
}
