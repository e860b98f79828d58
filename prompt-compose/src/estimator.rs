//! Token estimation.
//!
//! Counting is a collaborator concern: anything implementing
//! [`TokenEstimator`] can back the compositor, from a character heuristic to a
//! real tokenizer.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{PoisonError, RwLock};

use prompt_primitives::Message;
use thiserror::Error;

/// Result alias for estimation.
pub type EstimateResult<T> = Result<T, EstimateError>;

/// Errors raised when a token count cannot be produced.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EstimateError {
    /// The input cannot be tokenized.
    #[error("malformed input for token estimation: {reason}")]
    Malformed {
        /// Why the input was rejected.
        reason: String,
    },

    /// The backing tokenizer failed.
    #[error("token estimator unavailable: {reason}")]
    Unavailable {
        /// Additional context.
        reason: String,
    },
}

impl EstimateError {
    /// Convenience constructor for malformed input.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Maps text to a token cost.
///
/// Implementations must be monotonic: longer text never costs less, and the
/// cost of a concatenation is at least the cost of either part.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the token cost of raw text.
    ///
    /// # Errors
    ///
    /// Returns [`EstimateError`] when the text cannot be counted.
    fn estimate_text(&self, text: &str) -> EstimateResult<usize>;

    /// Fixed framing cost added to every chat message.
    fn message_overhead(&self) -> usize {
        0
    }

    /// Estimates the cost of a chat message, framing included.
    ///
    /// # Errors
    ///
    /// Returns [`EstimateError`] when the content cannot be counted.
    fn estimate_message(&self, message: &Message) -> EstimateResult<usize> {
        Ok(self.estimate_text(message.content())? + self.message_overhead())
    }

    /// Sums the cost of a message sequence.
    ///
    /// # Errors
    ///
    /// Returns the first [`EstimateError`] encountered.
    fn estimate_all(&self, messages: &[Message]) -> EstimateResult<usize> {
        messages
            .iter()
            .try_fold(0, |total, message| Ok(total + self.estimate_message(message)?))
    }
}

/// Character-count heuristic: roughly four characters per token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeuristicEstimator {
    chars_per_token: NonZeroUsize,
    message_overhead: usize,
}

impl HeuristicEstimator {
    /// Characters per token used by [`Default`].
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;
    /// Per-message framing used by [`Default`].
    pub const DEFAULT_MESSAGE_OVERHEAD: usize = 4;

    /// Creates an estimator with explicit parameters.
    #[must_use]
    pub const fn new(chars_per_token: NonZeroUsize, message_overhead: usize) -> Self {
        Self {
            chars_per_token,
            message_overhead,
        }
    }
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: NonZeroUsize::new(Self::DEFAULT_CHARS_PER_TOKEN)
                .unwrap_or(NonZeroUsize::MIN),
            message_overhead: Self::DEFAULT_MESSAGE_OVERHEAD,
        }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate_text(&self, text: &str) -> EstimateResult<usize> {
        Ok(text.chars().count().div_ceil(self.chars_per_token.get()))
    }

    fn message_overhead(&self) -> usize {
        self.message_overhead
    }
}

/// Memoizes another estimator's text counts.
///
/// Entries are never changed once inserted, so concurrent compositions
/// always observe the same count for the same text. Once `capacity` entries
/// are stored, further texts are counted without being cached.
#[derive(Debug)]
pub struct CachedEstimator<E> {
    inner: E,
    capacity: usize,
    cache: RwLock<HashMap<String, usize>>,
}

impl<E: TokenEstimator> CachedEstimator<E> {
    /// Default number of cached texts.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Wraps `inner` with the default capacity.
    #[must_use]
    pub fn new(inner: E) -> Self {
        Self::with_capacity(inner, Self::DEFAULT_CAPACITY)
    }

    /// Wraps `inner`, caching at most `capacity` texts.
    #[must_use]
    pub fn with_capacity(inner: E, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the number of cached texts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether nothing is cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: TokenEstimator> TokenEstimator for CachedEstimator<E> {
    fn estimate_text(&self, text: &str) -> EstimateResult<usize> {
        if let Some(tokens) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
        {
            return Ok(*tokens);
        }

        let tokens = self.inner.estimate_text(text)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.len() < self.capacity {
            cache.entry(text.to_owned()).or_insert(tokens);
        }
        Ok(tokens)
    }

    fn message_overhead(&self) -> usize {
        self.inner.message_overhead()
    }
}
