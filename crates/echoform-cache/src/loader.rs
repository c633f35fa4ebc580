//! Asset loaders: where decoded buffers come from.

use crate::AssetLoadError;
use async_trait::async_trait;
use echoform_io::AudioBuffer;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Fetches and decodes the asset at a location.
///
/// Implementations should push CPU-bound decoding off the async executor.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Loads and decodes `url`.
    async fn load(&self, url: &str) -> Result<AudioBuffer, AssetLoadError>;
}

/// Loads WAV files relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    /// Resolves relative locations against `root`. Absolute paths pass through.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let trimmed = url.strip_prefix("file://").unwrap_or(url);
        self.root.join(trimmed)
    }
}

#[async_trait]
impl AssetLoader for FileLoader {
    async fn load(&self, url: &str) -> Result<AudioBuffer, AssetLoadError> {
        let path = self.resolve(url);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssetLoadError::NotFound {
                    url: url.to_string(),
                }
            } else {
                AssetLoadError::Io {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let owned_url = url.to_string();
        tokio::task::spawn_blocking(move || {
            echoform_io::decode_wav(&bytes).map_err(|e| AssetLoadError::Decode {
                url: owned_url,
                message: e.to_string(),
            })
        })
        .await
        .map_err(|_| AssetLoadError::Cancelled {
            url: url.to_string(),
        })?
    }
}

/// In-memory loader, for tests and procedurally generated assets.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    buffers: Arc<Mutex<HashMap<String, AudioBuffer>>>,
}

impl MemoryLoader {
    /// Empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a buffer under `url`.
    pub fn insert(&self, url: impl Into<String>, buffer: AudioBuffer) {
        self.buffers.lock().insert(url.into(), buffer);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(self, url: impl Into<String>, buffer: AudioBuffer) -> Self {
        self.insert(url, buffer);
        self
    }
}

#[async_trait]
impl AssetLoader for MemoryLoader {
    async fn load(&self, url: &str) -> Result<AudioBuffer, AssetLoadError> {
        self.buffers
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| AssetLoadError::NotFound {
                url: url.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_loader_decodes_relative_paths() {
        let dir = TempDir::new().unwrap();
        let buf = AudioBuffer::new(vec![vec![0.5; 64]], 22050);
        echoform_io::write_wav_f32(dir.path().join("tone.wav"), &buf).unwrap();

        let loader = FileLoader::new(dir.path());
        assert_eq!(loader.load("tone.wav").await.unwrap(), buf);
        assert_eq!(loader.load("file://tone.wav").await.unwrap(), buf);
        assert!(matches!(
            loader.load("missing.wav").await,
            Err(AssetLoadError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn file_loader_reports_decode_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("junk.wav"), b"definitely not riff").unwrap();
        let loader = FileLoader::new(dir.path());
        assert!(matches!(
            loader.load("junk.wav").await,
            Err(AssetLoadError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn memory_loader_serves_clones() {
        let loader = MemoryLoader::new().with("a", AudioBuffer::silent(1, 4, 8000));
        assert_eq!(loader.load("a").await.unwrap().frames(), 4);
        assert!(loader.load("b").await.is_err());
    }
}
