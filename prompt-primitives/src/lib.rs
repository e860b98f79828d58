//! Core shared types for token-budgeted prompt composition.

#![warn(missing_docs, clippy::pedantic)]

mod budget;
mod error;
mod ids;
mod message;
mod policy;
mod priority;

/// Remaining token allowance threaded through allocation.
pub use budget::Budget;
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Correlation id for one compose/stream invocation.
pub use ids::InvocationId;
/// Chat messages and their authoring roles.
pub use message::{Message, MessageRole};
/// Trimming policies applied to message groups.
pub use policy::{Fraction, LimitPolicy, TokenCap, TrimDirection};
/// Allocation priority tags.
pub use priority::Priority;
