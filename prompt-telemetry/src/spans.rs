//! Span helpers.

use prompt_primitives::InvocationId;
use tracing::Span;

/// Span wrapping one hook invocation.
#[must_use]
pub fn invocation_span(id: InvocationId, model: &str) -> Span {
    tracing::info_span!("invocation", invocation_id = %id, model = %model)
}
