//! Shared streamer traits and data structures.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use prompt_primitives::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by streamers.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Ordered, lazily produced response events.
///
/// Dropping the stream cancels the underlying request.
pub type EventStream = Pin<Box<dyn Stream<Item = AdapterResult<ResponseEvent>> + Send>>;

/// Error type shared by streamer implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Streamer is misconfigured.
    #[error("adapter not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The supplied request was invalid for the target model.
    #[error("invalid completion request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be processed.
        reason: String,
    },

    /// The provider rejected the credential.
    #[error("provider rejected credentials: {reason}")]
    Authentication {
        /// Provider message.
        reason: String,
    },

    /// Transport-level failures (network, protocol, etc.).
    #[error("adapter transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The provider rejected the request due to rate limiting.
    #[error("adapter rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested delay before retrying.
        retry_after: Option<Duration>,
    },

    /// The provider returned a malformed or failed response.
    #[error("adapter response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },
}

impl AdapterError {
    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for response failures.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }
}

/// Minimal metadata describing a streamer instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterMetadata {
    provider: &'static str,
    endpoint: String,
}

impl AdapterMetadata {
    /// Creates metadata for the supplied provider and endpoint.
    #[must_use]
    pub fn new(provider: &'static str, endpoint: impl Into<String>) -> Self {
        Self {
            provider,
            endpoint: endpoint.into(),
        }
    }

    /// Returns the provider identifier (e.g., "openai").
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Sampling parameters sent alongside the prompt.
#[derive(Clone, PartialEq)]
pub struct StreamOptions {
    /// Model identifier.
    pub model: String,
    /// Provider credential.
    pub api_key: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Prompt-token ceiling the messages were composed against.
    pub max_prompt_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Stop sequences; empty for none.
    pub stop: Vec<String>,
}

impl StreamOptions {
    /// Creates options for `model` with provider defaults elsewhere.
    #[must_use]
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            max_tokens: 256,
            max_prompt_tokens: 4096,
            temperature: 1.0,
            stop: Vec::new(),
        }
    }

    /// Sets the generation limit.
    #[must_use]
    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Sets the prompt-token ceiling.
    #[must_use]
    pub fn with_max_prompt_tokens(mut self, tokens: usize) -> Self {
        self.max_prompt_tokens = tokens;
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the stop sequences.
    #[must_use]
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("max_tokens", &self.max_tokens)
            .field("max_prompt_tokens", &self.max_prompt_tokens)
            .field("temperature", &self.temperature)
            .field("stop", &self.stop)
            .finish()
    }
}

/// Request submitted to a streamer.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    messages: Vec<Message>,
    options: StreamOptions,
}

impl CompletionRequest {
    /// Creates a request with the supplied messages and options.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] if the message list is empty
    /// or the model is blank, and [`AdapterError::Configuration`] if the
    /// credential is blank.
    pub fn new(messages: Vec<Message>, options: StreamOptions) -> AdapterResult<Self> {
        if messages.is_empty() {
            return Err(AdapterError::invalid_request(
                "completion request requires at least one message",
            ));
        }
        if options.model.trim().is_empty() {
            return Err(AdapterError::invalid_request("model must not be empty"));
        }
        if options.api_key.trim().is_empty() {
            return Err(AdapterError::configuration("provider API key is empty"));
        }

        Ok(Self { messages, options })
    }

    /// Returns the prompt messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the sampling options.
    #[must_use]
    pub const fn options(&self) -> &StreamOptions {
        &self.options
    }
}

/// One event in a streamed response.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ResponseEvent {
    /// Partial content.
    Delta {
        /// Text appended to the response.
        content: String,
    },
    /// The model finished generating.
    Finished {
        /// Provider-reported reason, e.g. `stop` or `length`.
        finish_reason: Option<String>,
    },
}

impl ResponseEvent {
    /// Creates a content delta.
    #[must_use]
    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta {
            content: content.into(),
        }
    }

    /// Creates a completion marker.
    #[must_use]
    pub fn finished(reason: Option<String>) -> Self {
        Self::Finished {
            finish_reason: reason,
        }
    }

    /// Returns the delta text, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Delta { content } => Some(content),
            Self::Finished { .. } => None,
        }
    }

    /// Returns whether this is the completion marker.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Trait implemented by all completion streamers.
#[async_trait]
pub trait CompletionStreamer: Send + Sync {
    /// Returns basic metadata describing the streamer instance.
    fn metadata(&self) -> &AdapterMetadata;

    /// Starts a completion, returning its event stream.
    ///
    /// Failures before the first byte of the response are returned directly;
    /// later failures arrive as `Err` items in the stream.
    async fn stream(&self, request: CompletionRequest) -> AdapterResult<EventStream>;
}
