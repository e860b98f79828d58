//! Chat hook entry point.
//!
//! [`ChatHook::respond`] composes a budget-respecting prompt for the user's
//! input, resolves the provider credential, and relays the streamer's events.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod hook;

pub use error::{HookError, HookResult};
pub use hook::{ChatHook, DEFAULT_CREDENTIAL_KEY};
