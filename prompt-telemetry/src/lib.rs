//! Observability utilities for promptline.
//!
//! [`init`] installs a `tracing` fmt subscriber; [`invocation_span`] scopes the
//! events of one hook invocation.

#![warn(missing_docs, clippy::pedantic)]

mod error;
pub mod spans;
pub mod subscriber;

pub use error::{TelemetryError, TelemetryResult};
pub use spans::invocation_span;
pub use subscriber::{DEFAULT_FILTER, LogFormat, TelemetryConfig, init};
