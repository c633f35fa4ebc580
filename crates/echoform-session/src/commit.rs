//! Commit pipeline: deterministic offline render, encode, memoize.
//!
//! A commit renders the spec (or the upstream closure of one node), encodes
//! it to PCM WAV and caches the result under the spec's content hash plus the
//! render options. Identical concurrent commits share one in-flight render.
//! Failures leave the cache untouched.

use crate::config::RenderConfig;
use crate::error::RenderError;
use echoform_cache::BufferCache;
use echoform_graph::{AssetMap, GraphContext, estimate_duration, frames_for, render_offline};
use echoform_io::{AudioBuffer, EncodeOptions, encode_wav};
use echoform_spec::{ContentHash, GraphSpec, SpecHasher};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Output channels of every render.
pub const RENDER_CHANNELS: usize = 2;

/// Options for one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitOptions {
    /// Render only the upstream closure of this node.
    pub node_id: Option<String>,
    /// Minimum render length, seconds. Assets and automation can extend it.
    pub duration_override: Option<f64>,
    /// Normalize quiet renders. Defaults to the engine config.
    pub normalize: Option<bool>,
    /// PCM depth. Defaults to the engine config.
    pub bit_depth: Option<u16>,
}

impl CommitOptions {
    /// Commit restricted to `node`.
    pub fn node(node: impl Into<String>) -> Self {
        Self {
            node_id: Some(node.into()),
            ..Self::default()
        }
    }
}

/// A finished render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    /// Conditioned stereo audio that was encoded.
    pub buffer: Arc<AudioBuffer>,
    /// Encoded WAV file.
    pub blob: Arc<Vec<u8>>,
    /// Stable location of the encoded file.
    pub url: String,
    /// Hash of the rendered (possibly restricted) spec.
    pub spec_hash: ContentHash,
    /// Hash of `blob`.
    pub audio_hash: ContentHash,
    /// Length, seconds.
    pub duration: f64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Peak before clamping or normalization.
    pub peak: f32,
    /// Normalization gain applied.
    pub gain: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RenderKey {
    spec_hash: ContentHash,
    duration_bits: Option<u64>,
    bit_depth: u16,
    normalize: bool,
}

type Slot = Arc<OnceCell<Arc<RenderResult>>>;

/// Memoized render results, shared by every commit of a session.
pub struct RenderCache {
    done: Mutex<LruCache<RenderKey, Arc<RenderResult>>>,
    in_flight: Mutex<HashMap<RenderKey, Slot>>,
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("entries", &self.done.lock().len())
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl RenderCache {
    /// Keeps at most `capacity` results.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            done: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Cached results.
    pub fn len(&self) -> usize {
        self.done.lock().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached result.
    pub fn clear(&self) {
        self.done.lock().clear();
    }

    fn get(&self, key: &RenderKey) -> Option<Arc<RenderResult>> {
        self.done.lock().get(key).cloned()
    }

    fn slot(&self, key: &RenderKey) -> Slot {
        Arc::clone(self.in_flight.lock().entry(key.clone()).or_default())
    }

    fn finish(&self, key: &RenderKey, slot: &Slot, result: Option<&Arc<RenderResult>>) {
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(key).is_some_and(|s| Arc::ptr_eq(s, slot)) {
                in_flight.remove(key);
            }
        }
        if let Some(result) = result {
            self.done.lock().put(key.clone(), Arc::clone(result));
        }
    }
}

/// Inputs for one commit, snapshotted from the session.
pub(crate) struct CommitJob<'a> {
    pub spec: GraphSpec,
    pub options: &'a CommitOptions,
    pub render: &'a RenderConfig,
    pub context: GraphContext,
    pub cache: &'a Arc<BufferCache>,
    pub hasher: &'a Arc<dyn SpecHasher>,
    pub renders: &'a RenderCache,
}

/// How a commit was served.
pub(crate) enum Served {
    Cached(Arc<RenderResult>),
    Rendered(Arc<RenderResult>),
}

impl CommitJob<'_> {
    /// Hash of the job's spec.
    pub fn spec_hash(&self) -> ContentHash {
        self.hasher.hash_spec(&self.spec)
    }

    /// Runs the commit. `on_start` is called only when a fresh render begins.
    pub async fn run(
        self,
        spec_hash: ContentHash,
        on_start: impl FnOnce(),
    ) -> Result<Served, RenderError> {
        let bit_depth = self.options.bit_depth.unwrap_or(self.render.bit_depth);
        if !matches!(bit_depth, 16 | 24) {
            return Err(RenderError::UnsupportedBitDepth(bit_depth));
        }
        let key = RenderKey {
            spec_hash: spec_hash.clone(),
            duration_bits: self.options.duration_override.map(f64::to_bits),
            bit_depth,
            normalize: self.options.normalize.unwrap_or(self.render.normalize),
        };

        if let Some(hit) = self.renders.get(&key) {
            tracing::debug!(spec_hash = %spec_hash.short(), "render cache hit");
            return Ok(Served::Cached(hit));
        }

        let slot = self.renders.slot(&key);
        let mut fresh = false;
        let outcome = slot
            .get_or_try_init(|| {
                fresh = true;
                on_start();
                self.render_fresh(&key)
            })
            .await
            .cloned();
        self.renders.finish(&key, &slot, outcome.as_ref().ok());
        let result = outcome?;
        Ok(if fresh {
            Served::Rendered(result)
        } else {
            Served::Cached(result)
        })
    }

    async fn render_fresh(&self, key: &RenderKey) -> Result<Arc<RenderResult>, RenderError> {
        let started = Instant::now();
        let leases = Leases::acquire(self.cache, &self.spec).await?;

        let duration = estimate_duration(
            &self.spec,
            &leases.assets,
            self.options.duration_override,
            self.render.default_duration_secs,
        );
        let frames = frames_for(duration, self.context.sample_rate);
        let estimated_samples = (frames as u64).saturating_mul(RENDER_CHANNELS as u64);
        if estimated_samples > self.render.max_samples {
            return Err(RenderError::BudgetExceeded {
                duration_secs: duration,
                estimated_samples,
                max_samples: self.render.max_samples,
            });
        }

        let spec = self.spec.clone();
        let context = self.context;
        let assets = leases.assets.clone();
        let encode = EncodeOptions {
            bit_depth: key.bit_depth,
            normalize: key.normalize,
            normalize_target: self.render.normalize_target,
            dither_seed: spec.seed,
        };
        let (encoded, report) = tokio::task::spawn_blocking(move || {
            let (buffer, report) = render_offline(&spec, context, &assets, frames)?;
            let encoded = encode_wav(&buffer, &encode)?;
            Ok::<_, RenderError>((encoded, report))
        })
        .await
        .map_err(|e| RenderError::Task(e.to_string()))??;
        drop(leases);

        let audio_hash = self.hasher.digest(&encoded.bytes);
        tracing::info!(
            spec_hash = %key.spec_hash.short(),
            audio_hash = %audio_hash.short(),
            duration,
            frames,
            clamped = report.clamped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "render committed"
        );
        Ok(Arc::new(RenderResult {
            url: format!("echoform://render/{}.wav", key.spec_hash),
            buffer: Arc::new(encoded.conditioned),
            blob: Arc::new(encoded.bytes),
            spec_hash: key.spec_hash.clone(),
            audio_hash,
            duration,
            sample_rate: context.sample_rate,
            peak: encoded.peak,
            gain: encoded.gain,
        }))
    }
}

/// Cache references held for the length of one render.
struct Leases<'a> {
    cache: &'a BufferCache,
    urls: Vec<String>,
    assets: AssetMap,
}

impl<'a> Leases<'a> {
    async fn acquire(cache: &'a Arc<BufferCache>, spec: &GraphSpec) -> Result<Self, RenderError> {
        let urls: Vec<String> = spec.assets.iter().map(|a| a.src.clone()).collect();
        let results = cache.acquire_many(&urls).await;
        let mut leases = Self {
            cache: cache.as_ref(),
            urls: Vec::with_capacity(urls.len()),
            assets: AssetMap::new(),
        };
        let mut failure = None;
        for (asset, (url, result)) in spec.assets.iter().zip(results) {
            match result {
                Ok(buffer) => {
                    leases.urls.push(url);
                    leases.assets.insert(asset.id.clone(), buffer);
                }
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(leases),
        }
    }
}

impl Drop for Leases<'_> {
    fn drop(&mut self) {
        for url in &self.urls {
            self.cache.release(url);
        }
    }
}
