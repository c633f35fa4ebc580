//! Engine configuration.
//!
//! Stored as TOML. Every section is optional; missing sections and fields
//! take their defaults.
//!
//! ```toml
//! [audio]
//! sample_rate = 48000
//! block_size = 128
//!
//! [render]
//! max_samples = 100000000
//! bit_depth = 16
//!
//! [cache]
//! budget_bytes = 268435456
//!
//! [spatial]
//! cull_distance = 100.0
//! resume_distance = 60.0
//! distance_model = "inverse"
//! ```

use crate::spatial::DistanceModel;
use echoform_cache::CacheConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading, saving or checking an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// A value is out of its allowed range
    #[error("invalid config value '{field}': {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// Why it was refused.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Host audio context settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per live processing block.
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 128,
        }
    }
}

/// Commit pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Hard ceiling on `frames * channels` for one render.
    pub max_samples: u64,
    /// Duration used when nothing in the spec implies one, seconds.
    pub default_duration_secs: f64,
    /// PCM bit depth, 16 or 24.
    pub bit_depth: u16,
    /// Normalize quiet renders by default.
    pub normalize: bool,
    /// Peak that normalization scales to.
    pub normalize_target: f32,
    /// Render results kept for memoization.
    pub cache_entries: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_samples: 100_000_000,
            default_duration_secs: 5.0,
            bit_depth: 16,
            normalize: false,
            normalize_target: 0.89,
            cache_entries: 32,
        }
    }
}

/// Spatial binding defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Gain fade length for cull and resume, milliseconds.
    pub fade_ms: f64,
    /// Distance beyond which committed emitters are culled.
    pub cull_distance: f64,
    /// Distance within which culled emitters resume. Must be below
    /// `cull_distance`.
    pub resume_distance: f64,
    /// Distance at which attenuation starts.
    pub ref_distance: f64,
    /// Attenuation rate.
    pub rolloff: f64,
    /// Distance beyond which attenuation stops changing.
    pub max_distance: f64,
    /// Attenuation curve.
    pub distance_model: DistanceModel,
    /// Buffering of the cross-context stream bridge, milliseconds.
    pub bridge_latency_ms: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            fade_ms: 50.0,
            cull_distance: 100.0,
            resume_distance: 60.0,
            ref_distance: 1.0,
            rolloff: 1.0,
            max_distance: 10_000.0,
            distance_model: DistanceModel::Inverse,
            bridge_latency_ms: 100.0,
        }
    }
}

/// Undo history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Change records kept on the undo stack.
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 200 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host audio context.
    pub audio: AudioConfig,
    /// Commit pipeline.
    pub render: RenderConfig,
    /// Decoded-buffer cache.
    pub cache: CacheConfig,
    /// Spatial bindings.
    pub spatial: SpatialConfig,
    /// Undo history.
    pub history: HistoryConfig,
}

impl EngineConfig {
    /// Load and check a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and check a config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.block_size == 0 {
            return Err(ConfigError::invalid("audio.block_size", "must be positive"));
        }
        if !matches!(self.render.bit_depth, 16 | 24) {
            return Err(ConfigError::invalid(
                "render.bit_depth",
                format!("{} is not 16 or 24", self.render.bit_depth),
            ));
        }
        if self.render.default_duration_secs.is_nan() || self.render.default_duration_secs <= 0.0 {
            return Err(ConfigError::invalid(
                "render.default_duration_secs",
                "must be positive",
            ));
        }
        if self.render.cache_entries == 0 {
            return Err(ConfigError::invalid("render.cache_entries", "must be positive"));
        }
        if self.cache.target_ratio.is_nan()
            || self.cache.target_ratio <= 0.0
            || self.cache.target_ratio > 1.0
        {
            return Err(ConfigError::invalid("cache.target_ratio", "must be in (0, 1]"));
        }
        if self.cache.max_concurrent_loads == 0 {
            return Err(ConfigError::invalid(
                "cache.max_concurrent_loads",
                "must be positive",
            ));
        }
        let s = &self.spatial;
        if s.resume_distance >= s.cull_distance {
            return Err(ConfigError::invalid(
                "spatial.resume_distance",
                format!(
                    "{} must be below cull_distance {}",
                    s.resume_distance, s.cull_distance
                ),
            ));
        }
        if s.fade_ms < 0.0 || s.ref_distance <= 0.0 || s.max_distance < s.ref_distance {
            return Err(ConfigError::invalid(
                "spatial",
                "fade_ms >= 0 and 0 < ref_distance <= max_distance required",
            ));
        }
        if self.history.limit == 0 {
            return Err(ConfigError::invalid("history.limit", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [audio]
            sample_rate = 44100

            [spatial]
            distance_model = "linear"
            "#,
        )
        .unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.audio.block_size, 128);
        assert_eq!(config.spatial.distance_model, DistanceModel::Linear);
        assert_eq!(config.render, RenderConfig::default());
    }

    #[test]
    fn hysteresis_is_enforced() {
        let err = EngineConfig::from_toml(
            r#"
            [spatial]
            cull_distance = 50.0
            resume_distance = 60.0
            "#,
        )
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field: "spatial.resume_distance", .. }),
            "got: {err}"
        );
    }

    #[test]
    fn bad_bit_depth_rejected() {
        let err = EngineConfig::from_toml("[render]\nbit_depth = 8\n").unwrap_err();
        assert!(err.to_string().contains("render.bit_depth"));
    }

    #[test]
    fn parse_error_surfaces() {
        let err = EngineConfig::from_toml("[audio\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/engine.toml");
        let mut config = EngineConfig::default();
        config.render.normalize = true;
        config.history.limit = 12;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_has_source() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
        assert!(err.source().is_some());
    }
}
