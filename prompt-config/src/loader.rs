//! JSON configuration loaders.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{ChatSettings, HookConfig, Thread};

/// Loads and validates chat settings from a JSON file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] when the file cannot be
/// read or decoded, and [`ConfigError::Invalid`] when validation fails.
pub fn load_chat(path: impl AsRef<Path>) -> ConfigResult<ChatSettings> {
    let chat: ChatSettings = load_json(path.as_ref())?;
    chat.validate()?;
    Ok(chat)
}

/// Loads a conversation thread from a JSON file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] when the file cannot be
/// read or decoded.
pub fn load_thread(path: impl AsRef<Path>) -> ConfigResult<Thread> {
    load_json(path.as_ref())
}

/// Loads a flat string map of credentials from a JSON file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] or [`ConfigError::Parse`] when the file cannot be
/// read or decoded.
pub fn load_hook_config(path: impl AsRef<Path>) -> ConfigResult<HookConfig> {
    load_json(path.as_ref())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = raw.len(), "loaded configuration file");
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
