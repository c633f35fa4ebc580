//! Decoded-buffer cache for echoform.
//!
//! [`BufferCache`] is the only mutable resource shared between sessions. It
//! holds decoded audio keyed by asset location, reference counted per user,
//! bounded by a byte budget:
//!
//! - concurrent acquires of one location coalesce onto a single load
//! - at most `max_concurrent_loads` loads run at once
//! - under pressure, unreferenced entries are evicted least recently used
//!   first until usage falls to `target_ratio` of the budget
//! - a buffer that still does not fit is rejected with
//!   [`AssetLoadError::OverBudget`]
//!
//! Loading is delegated to an [`AssetLoader`]; [`FileLoader`] reads WAV files
//! from disk and [`MemoryLoader`] serves pre-built buffers.

mod cache;
mod error;
mod loader;

pub use cache::{BufferCache, CacheConfig, CacheStats};
pub use error::AssetLoadError;
pub use loader::{AssetLoader, FileLoader, MemoryLoader};
