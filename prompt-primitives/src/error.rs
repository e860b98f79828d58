//! Shared error definitions for prompt primitives.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// A fraction outside `0.0..=1.0` (or not finite) was supplied.
    #[error("invalid fraction {value}: must be a finite value between 0 and 1")]
    InvalidFraction {
        /// The offending value.
        value: f64,
    },

    /// A budget was asked to spend more tokens than remain.
    #[error("budget overdrawn: {requested} tokens requested, {remaining} remaining")]
    Overdrawn {
        /// Tokens the caller attempted to spend.
        requested: usize,
        /// Tokens that were still available.
        remaining: usize,
    },
}
