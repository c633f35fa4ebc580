//! The decoded-buffer cache.
//!
//! Entries are keyed by asset location and carry a reference count. A session
//! [`acquire`](BufferCache::acquire)s each asset it plays and
//! [`release`](BufferCache::release)s it on disposal. Releasing never evicts;
//! eviction happens lazily when an insert would exceed the byte budget, and
//! only entries nobody references are candidates, least recently used first.

use crate::{AssetLoadError, AssetLoader};
use echoform_io::AudioBuffer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;

/// Cache limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum decoded bytes held.
    pub budget_bytes: usize,
    /// Fraction of the budget eviction drives usage down to.
    pub target_ratio: f64,
    /// Simultaneous loads allowed.
    pub max_concurrent_loads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
            target_ratio: 0.7,
            max_concurrent_loads: 4,
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Resident entries.
    pub entries: usize,
    /// Entries with a non-zero reference count.
    pub referenced: usize,
    /// Bytes held by resident entries.
    pub used_bytes: usize,
    /// Configured budget.
    pub budget_bytes: usize,
    /// Loads currently in flight.
    pub in_flight: usize,
    /// Acquires served from a resident entry.
    pub hits: u64,
    /// Acquires that had to wait on a load.
    pub misses: u64,
    /// Entries evicted under pressure.
    pub evictions: u64,
}

#[derive(Debug)]
struct CachedBuffer {
    buffer: Arc<AudioBuffer>,
    size_bytes: usize,
    ref_count: usize,
    last_used: Instant,
    last_tick: u64,
}

type LoadCell = Arc<OnceCell<Result<Arc<AudioBuffer>, AssetLoadError>>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedBuffer>,
    in_flight: HashMap<String, LoadCell>,
    used_bytes: usize,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Ref-counted decoded-buffer cache shared across sessions.
///
/// Construct one per process (or per test) and hand it to sessions as an
/// `Arc<BufferCache>`.
pub struct BufferCache {
    config: CacheConfig,
    loader: Arc<dyn AssetLoader>,
    state: Mutex<CacheState>,
    permits: Semaphore,
}

impl std::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BufferCache {
    /// Creates a cache drawing from `loader`.
    pub fn new(config: CacheConfig, loader: Arc<dyn AssetLoader>) -> Self {
        let permits = Semaphore::new(config.max_concurrent_loads.max(1));
        Self {
            config,
            loader,
            state: Mutex::new(CacheState::default()),
            permits,
        }
    }

    /// Limits in effect.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the decoded buffer for `url`, loading it if needed, and takes a
    /// reference on the entry.
    ///
    /// Concurrent acquires of the same location share one load. Every
    /// successful call must be balanced by one [`release`](Self::release).
    pub async fn acquire(&self, url: &str) -> Result<Arc<AudioBuffer>, AssetLoadError> {
        let cell = {
            let mut state = self.state.lock();
            let tick = state.next_tick();
            if let Some(entry) = state.entries.get_mut(url) {
                entry.ref_count += 1;
                entry.last_used = Instant::now();
                entry.last_tick = tick;
                let buffer = Arc::clone(&entry.buffer);
                state.hits += 1;
                tracing::trace!(url, "buffer cache hit");
                return Ok(buffer);
            }
            state.misses += 1;
            Arc::clone(state.in_flight.entry(url.to_string()).or_default())
        };

        let result = cell
            .get_or_init(|| async {
                let _permit = self.permits.acquire().await.map_err(|_| {
                    AssetLoadError::Cancelled {
                        url: url.to_string(),
                    }
                })?;
                let started = Instant::now();
                let buffer = self.loader.load(url).await?;
                tracing::debug!(
                    url,
                    bytes = buffer.size_bytes(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "decoded asset"
                );
                Ok(Arc::new(buffer))
            })
            .await
            .clone();

        let mut state = self.state.lock();
        if state
            .in_flight
            .get(url)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            state.in_flight.remove(url);
        }
        let buffer = result?;
        self.attach(&mut state, url, buffer)
    }

    /// Acquires several locations concurrently. Results keep input order.
    pub async fn acquire_many(
        self: &Arc<Self>,
        urls: &[String],
    ) -> Vec<(String, Result<Arc<AudioBuffer>, AssetLoadError>)> {
        let mut set = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let cache = Arc::clone(self);
            let url = url.clone();
            set.spawn(async move {
                let result = cache.acquire(&url).await;
                (index, url, result)
            });
        }

        let mut out: Vec<Option<(String, Result<_, _>)>> = vec![None; urls.len()];
        while let Some(joined) = set.join_next().await {
            if let Ok((index, url, result)) = joined {
                out[index] = Some((url, result));
            }
        }
        out.into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| {
                    (
                        url.clone(),
                        Err(AssetLoadError::Cancelled { url: url.clone() }),
                    )
                })
            })
            .collect()
    }

    /// Drops one reference. Never evicts; returns the remaining count, or
    /// `None` when `url` is not resident.
    pub fn release(&self, url: &str) -> Option<usize> {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(url) else {
            tracing::trace!(url, "release of non-resident buffer");
            return None;
        };
        entry.ref_count = entry.ref_count.saturating_sub(1);
        Some(entry.ref_count)
    }

    /// Removes every resident entry. Buffers still held by callers stay alive
    /// through their `Arc`s. Returns the number of entries removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.used_bytes = 0;
        tracing::debug!(removed, "buffer cache cleared");
        removed
    }

    /// Removes unreferenced entries idle for at least `max_age`. Returns the
    /// number of entries removed.
    pub fn dispose_unused(&self, max_age: Duration) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.ref_count == 0 && now.duration_since(e.last_used) >= max_age)
            .map(|(url, _)| url.clone())
            .collect();
        for url in &stale {
            if let Some(entry) = state.entries.remove(url) {
                state.used_bytes -= entry.size_bytes;
            }
        }
        if !stale.is_empty() {
            tracing::debug!(removed = stale.len(), "disposed unused buffers");
        }
        stale.len()
    }

    /// Current reference count of `url`, if resident.
    pub fn ref_count(&self, url: &str) -> Option<usize> {
        self.state.lock().entries.get(url).map(|e| e.ref_count)
    }

    /// Whether `url` is resident.
    pub fn contains(&self, url: &str) -> bool {
        self.state.lock().entries.contains_key(url)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            referenced: state.entries.values().filter(|e| e.ref_count > 0).count(),
            used_bytes: state.used_bytes,
            budget_bytes: self.config.budget_bytes,
            in_flight: state.in_flight.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    /// Takes a reference on `url`, inserting `buffer` when not resident.
    fn attach(
        &self,
        state: &mut CacheState,
        url: &str,
        buffer: Arc<AudioBuffer>,
    ) -> Result<Arc<AudioBuffer>, AssetLoadError> {
        let tick = state.next_tick();
        if let Some(entry) = state.entries.get_mut(url) {
            entry.ref_count += 1;
            entry.last_used = Instant::now();
            entry.last_tick = tick;
            return Ok(Arc::clone(&entry.buffer));
        }

        let size_bytes = buffer.size_bytes();
        self.make_room(state, size_bytes);
        if state.used_bytes + size_bytes > self.config.budget_bytes {
            tracing::warn!(
                url,
                size_bytes,
                used_bytes = state.used_bytes,
                budget_bytes = self.config.budget_bytes,
                "asset rejected: over cache budget"
            );
            return Err(AssetLoadError::OverBudget {
                url: url.to_string(),
                size_bytes,
                used_bytes: state.used_bytes,
                budget_bytes: self.config.budget_bytes,
            });
        }

        state.used_bytes += size_bytes;
        state.entries.insert(
            url.to_string(),
            CachedBuffer {
                buffer: Arc::clone(&buffer),
                size_bytes,
                ref_count: 1,
                last_used: Instant::now(),
                last_tick: tick,
            },
        );
        Ok(buffer)
    }

    /// Evicts unreferenced entries, oldest first, until inserting `incoming`
    /// bytes lands at or below the target ratio. No-op when the insert fits
    /// the budget outright.
    fn make_room(&self, state: &mut CacheState, incoming: usize) {
        let budget = self.config.budget_bytes;
        if state.used_bytes + incoming <= budget {
            return;
        }
        let target = (budget as f64 * self.config.target_ratio) as usize;

        let mut victims: Vec<(u64, String)> = state
            .entries
            .iter()
            .filter(|(_, e)| e.ref_count == 0)
            .map(|(url, e)| (e.last_tick, url.clone()))
            .collect();
        victims.sort_unstable();

        for (_, url) in victims {
            if state.used_bytes + incoming <= target {
                break;
            }
            if let Some(entry) = state.entries.remove(&url) {
                state.used_bytes -= entry.size_bytes;
                state.evictions += 1;
                tracing::debug!(url = %url, bytes = entry.size_bytes, "evicted buffer");
            }
        }
    }
}
