//! Per-invocation correlation ids.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Tags the log events of one compose-and-stream call.
///
/// Rendered as 32 lowercase hex digits so it stays compact in log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Draws a fresh id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.simple(), f)
    }
}
