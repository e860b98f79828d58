//! Token-budgeted prompt composition with streamed completions.
//!
//! Depend on this crate via `cargo add promptline`. It bundles the workspace
//! crates behind feature flags so callers can pull in only the compositor, or
//! the whole hook with its `OpenAI` streamer.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use prompt_primitives as primitives;

/// Budget allocation, trimming and templating (enabled by `compose` feature).
#[cfg(feature = "compose")]
pub use prompt_compose as compose;

/// Completion streamers (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use prompt_adapters as adapters;

/// Chat settings, threads and credentials (enabled by `config` feature).
#[cfg(feature = "config")]
pub use prompt_config as config;

/// Subscriber setup and spans (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use prompt_telemetry as telemetry;

/// The chat hook (enabled by `hook` feature).
#[cfg(feature = "hook")]
pub use prompt_hook as hook;
