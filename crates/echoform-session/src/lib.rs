//! Audio graph sessions for echoform.
//!
//! A [`Session`] owns one editable [`GraphSpec`](echoform_spec::GraphSpec)
//! and its live [`RuntimeGraph`](echoform_graph::RuntimeGraph). Edits are
//! validated, applied to the live graph and recorded for undo. Commits render
//! the spec offline, encode it to WAV and memoize the result by content hash.
//! Spatial bindings attach nodes to emitters in a 3D scene, culling them with
//! hysteresis when they move out of range and resuming them without losing
//! their place.
//!
//! # Example
//!
//! ```rust,no_run
//! use echoform_cache::{BufferCache, CacheConfig, FileLoader};
//! use echoform_session::{CommitOptions, Session, UpdateOptions};
//! use echoform_spec::{Asset, GraphSpec, NodeDef};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(BufferCache::new(
//!     CacheConfig::default(),
//!     Arc::new(FileLoader::new("assets")),
//! ));
//! let spec = GraphSpec::default()
//!     .with_asset(Asset::sample("loop", "drums.wav"))
//!     .with_node(NodeDef::new("player", "player").with_asset("loop"))
//!     .with_node(NodeDef::new("out", "gain"))
//!     .with_connection("player", "out");
//!
//! let mut session = Session::builder(cache).open(spec).await?;
//! session.update_param("out", "gain", 0.5, UpdateOptions::default())?;
//! let render = session.commit(CommitOptions::default()).await?;
//! println!("{} ({:.2}s)", render.url, render.duration);
//! # Ok(())
//! # }
//! ```

mod clock;
mod commit;
mod config;
mod error;
mod events;
mod history;
mod session;
pub mod spatial;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commit::{CommitOptions, RENDER_CHANNELS, RenderCache, RenderResult};
pub use config::{
    AudioConfig, ConfigError, EngineConfig, HistoryConfig, RenderConfig, SpatialConfig,
};
pub use error::{RenderError, SessionError, SpatialBindError};
pub use events::{ErrorSource, EventBus, EventKind, SessionEvent, SubscriptionId};
pub use history::{ChangeKind, ChangeRecord, History, Mutation};
pub use session::{BlockOutput, NodeInfo, Session, SessionBuilder, UpdateOptions};
