//! Asset load errors.

use thiserror::Error;

/// Failure to produce a decoded buffer for an asset.
///
/// `Clone` so every caller coalesced onto one in-flight load observes the
/// same failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetLoadError {
    /// The loader has nothing at this location.
    #[error("asset not found: {url}")]
    NotFound {
        /// Asset location.
        url: String,
    },

    /// Reading the asset failed.
    #[error("failed to read asset '{url}': {message}")]
    Io {
        /// Asset location.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// The asset bytes did not decode.
    #[error("failed to decode asset '{url}': {message}")]
    Decode {
        /// Asset location.
        url: String,
        /// Underlying error text.
        message: String,
    },

    /// The decoded buffer does not fit the budget even after eviction.
    #[error("asset '{url}' needs {size_bytes} bytes, cache budget is {budget_bytes} with {used_bytes} pinned")]
    OverBudget {
        /// Asset location.
        url: String,
        /// Decoded size.
        size_bytes: usize,
        /// Bytes still held after eviction.
        used_bytes: usize,
        /// Configured budget.
        budget_bytes: usize,
    },

    /// The load was abandoned (cache shut down or decode task lost).
    #[error("load of '{url}' was cancelled")]
    Cancelled {
        /// Asset location.
        url: String,
    },
}

impl AssetLoadError {
    /// Location of the asset that failed.
    pub fn url(&self) -> &str {
        match self {
            Self::NotFound { url }
            | Self::Io { url, .. }
            | Self::Decode { url, .. }
            | Self::OverBudget { url, .. }
            | Self::Cancelled { url } => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_url() {
        let err = AssetLoadError::OverBudget {
            url: "big.wav".into(),
            size_bytes: 10,
            used_bytes: 4,
            budget_bytes: 8,
        };
        assert_eq!(err.url(), "big.wav");
        assert_eq!(
            err.to_string(),
            "asset 'big.wav' needs 10 bytes, cache budget is 8 with 4 pinned"
        );
    }
}
