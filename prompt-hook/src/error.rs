//! Errors surfaced by the chat hook.

use prompt_adapters::traits::AdapterError;
use prompt_compose::ComposeError;
use prompt_config::ConfigError;
use thiserror::Error;

/// Result alias for hook invocations.
pub type HookResult<T> = Result<T, HookError>;

/// Failures surfaced by [`crate::ChatHook::respond`] before the first event.
#[derive(Debug, Error)]
pub enum HookError {
    /// Prompt composition failed; no model call was made.
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// The provider credential was absent from the hook configuration.
    #[error("missing provider credential `{key}`")]
    MissingCredential {
        /// Configuration key that was looked up.
        key: String,
    },

    /// Chat settings were rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The streamer could not start the completion.
    #[error(transparent)]
    Streamer(#[from] AdapterError),
}
