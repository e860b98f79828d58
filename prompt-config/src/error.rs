//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors emitted while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A configuration document was not valid JSON for the expected schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Settings were well-formed but semantically invalid.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A required key was absent from the credential map.
    #[error("missing configuration key `{key}`")]
    MissingKey {
        /// Name of the absent key.
        key: String,
    },
}

impl ConfigError {
    /// Convenience constructor for validation failures.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
