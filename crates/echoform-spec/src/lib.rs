//! Declarative audio graph model for echoform.
//!
//! A [`GraphSpec`] describes a sound design as data: sample assets, typed nodes
//! with parameters, directed connections, timed automation curves, auxiliary
//! buses with sends, and a master mix. Everything else in the engine (live
//! runtime graphs, offline renders, undo history) is derived from it.
//!
//! # Operations
//!
//! - [`canonicalize`]: deterministic ordering so semantically identical specs
//!   compare and serialize identically
//! - [`validate`]: fail-fast structural check returning a typed [`SpecError`]
//! - [`hash`] / [`SpecHasher`]: content hash of the canonical JSON
//! - [`GraphSpec::upstream_closure`] / [`GraphSpec::restrict_to`]: isolate the
//!   chain feeding one node
//!
//! # Example
//!
//! ```rust
//! use echoform_spec::{Asset, GraphSpec, NodeDef, canonicalize, hash, validate};
//!
//! let spec = GraphSpec::default()
//!     .with_asset(Asset::sample("loop", "loops/drums.wav"))
//!     .with_node(NodeDef::new("player", "player").with_asset("loop"))
//!     .with_node(NodeDef::new("out", "gain").with_param("gain", 0.8))
//!     .with_connection("player", "out");
//!
//! validate(&spec).unwrap();
//! assert_eq!(canonicalize(&canonicalize(&spec)), canonicalize(&spec));
//! assert_eq!(spec.sinks(), vec!["out"]);
//! println!("{}", hash(&spec));
//! ```

mod canonical;
mod error;
mod hash;
mod model;
mod persist;
pub mod registry;
mod topology;
mod validate;

pub use canonical::{canonical_bytes, canonicalize, canonicalize_in_place};
pub use error::{LoadError, SpecError, SpecErrorKind};
#[cfg(feature = "sha256")]
pub use hash::Sha256Hasher;
pub use hash::{ContentHash, RollingHasher, SpecHasher, default_hasher, hash};
pub use model::{
    Asset, AssetKind, AutomationDef, BusDef, Connection, Curve, CurveMode, CurvePoint, GraphSpec,
    MixSettings, NodeDef, ParamValue, SCHEMA_ID, SPEC_VERSION, SendDef, Trim,
};
pub use registry::{Coerced, NodeType, ParamError, ParamKind, ParamSpec};
pub use validate::validate;
