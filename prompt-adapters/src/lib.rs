//! Completion streamers used by the prompt hook.
//!
//! Providers implement the [`traits::CompletionStreamer`] interface; the
//! compositor never sees transport details.

#![warn(missing_docs, clippy::pedantic)]

pub mod openai;
pub mod sse;
pub mod traits;

mod http_client;
