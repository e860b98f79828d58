//! Configuration management for prompt composition.
//!
//! Chat settings and conversation threads are plain `serde` types so callers can
//! build them in code or load them from JSON documents.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_chat, load_hook_config, load_thread};
pub use schema::{ChatPrompts, ChatSettings, HookConfig, Thread};
