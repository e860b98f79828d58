//! Errors raised while installing telemetry.

use thiserror::Error;

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter {
        /// Directive as supplied.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber was already set.
    #[error("tracing subscriber already installed: {reason}")]
    AlreadyInstalled {
        /// Underlying error message.
        reason: String,
    },
}
