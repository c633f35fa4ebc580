//! Error types for spec validation and spec file IO.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`SpecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecErrorKind {
    /// Version or schema id mismatch.
    Schema,
    /// Two entities share an id.
    DuplicateId,
    /// Node type not in the registry.
    UnknownType,
    /// A reference names something that does not exist.
    DanglingReference,
    /// Malformed automation.
    Automation,
    /// Automation uses a reserved curve mode.
    ReservedCurveMode,
    /// Invalid edge shape.
    Topology,
    /// Invalid parameter value.
    Param,
}

/// Spec validation failure.
///
/// Validation fails fast: the first problem found is reported.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpecError {
    /// Spec version not understood.
    #[error("unsupported spec version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the spec.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// Schema id mismatch.
    #[error("schema id '{found}' does not match '{expected}'")]
    SchemaMismatch {
        /// Schema id found in the spec.
        found: String,
        /// Required schema id.
        expected: &'static str,
    },

    /// Duplicate id within one collection.
    #[error("duplicate {collection} id '{id}'")]
    DuplicateId {
        /// Collection name (`node`, `asset`, `automation`, `bus`).
        collection: &'static str,
        /// The repeated id.
        id: String,
    },

    /// Node type not registered.
    #[error("node '{node}' has unknown type '{node_type}'")]
    UnknownNodeType {
        /// Node id.
        node: String,
        /// Unregistered type name.
        node_type: String,
    },

    /// Reference to a node that does not exist.
    #[error("{context} references unknown node '{node}'")]
    UnknownNode {
        /// Where the reference appears.
        context: String,
        /// Missing node id.
        node: String,
    },

    /// Reference to an asset that does not exist.
    #[error("node '{node}' references unknown asset '{asset}'")]
    UnknownAsset {
        /// Referencing node.
        node: String,
        /// Missing asset id.
        asset: String,
    },

    /// Send to a bus that does not exist.
    #[error("send from '{node}' targets unknown bus '{bus}'")]
    UnknownBus {
        /// Sending node.
        node: String,
        /// Missing bus id.
        bus: String,
    },

    /// Node connected to itself.
    #[error("node '{0}' is connected to itself")]
    SelfConnection(String),

    /// Structurally invalid automation.
    #[error("automation '{id}' is invalid: {reason}")]
    InvalidAutomation {
        /// Automation id.
        id: String,
        /// What is wrong.
        reason: String,
    },

    /// Automation uses `expRamp` or `lfoRef`.
    #[error("automation '{id}' uses reserved curve mode '{mode}'")]
    ReservedCurveMode {
        /// Automation id.
        id: String,
        /// Mode name.
        mode: String,
    },

    /// Invalid parameter on a node or automation target.
    #[error("node '{node}': {source}")]
    Param {
        /// Node id.
        node: String,
        /// Underlying parameter error.
        #[source]
        source: crate::registry::ParamError,
    },
}

impl SpecError {
    /// Classification of this error.
    pub fn kind(&self) -> SpecErrorKind {
        match self {
            Self::UnsupportedVersion { .. } | Self::SchemaMismatch { .. } => SpecErrorKind::Schema,
            Self::DuplicateId { .. } => SpecErrorKind::DuplicateId,
            Self::UnknownNodeType { .. } => SpecErrorKind::UnknownType,
            Self::UnknownNode { .. } | Self::UnknownAsset { .. } | Self::UnknownBus { .. } => {
                SpecErrorKind::DanglingReference
            }
            Self::SelfConnection(_) => SpecErrorKind::Topology,
            Self::InvalidAutomation { .. } => SpecErrorKind::Automation,
            Self::ReservedCurveMode { .. } => SpecErrorKind::ReservedCurveMode,
            Self::Param { .. } => SpecErrorKind::Param,
        }
    }
}

/// Failure loading or saving a spec file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read the file.
    #[error("failed to read spec '{path}': {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the file.
    #[error("failed to write spec '{path}': {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// JSON syntax or shape error.
    #[error("failed to parse spec JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParamError;
    use std::error::Error as _;

    #[test]
    fn kinds_classify() {
        let dup = SpecError::DuplicateId {
            collection: "node",
            id: "a".into(),
        };
        assert_eq!(dup.kind(), SpecErrorKind::DuplicateId);
        assert_eq!(dup.to_string(), "duplicate node id 'a'");

        let dangling = SpecError::UnknownNode {
            context: "connection a -> b".into(),
            node: "b".into(),
        };
        assert_eq!(dangling.kind(), SpecErrorKind::DanglingReference);
    }

    #[test]
    fn param_error_is_source() {
        let err = SpecError::Param {
            node: "g".into(),
            source: ParamError::UnknownParameter {
                node_type: "gain".into(),
                param: "drive".into(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("node 'g': unknown parameter"));
    }

    #[test]
    fn load_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LoadError = json_err.into();
        assert!(err.to_string().starts_with("failed to parse spec JSON"));
    }
}
