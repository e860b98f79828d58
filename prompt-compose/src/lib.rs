//! Token-budgeted prompt composition.
//!
//! Message groups are offered the input-token budget in [`Priority`] order,
//! trimmed whole-message at the end their [`LimitPolicy`] names, and finally
//! laid out in a fixed presentation order that is independent of priority.
//!
//! [`Priority`]: prompt_primitives::Priority
//! [`LimitPolicy`]: prompt_primitives::LimitPolicy

#![warn(missing_docs, clippy::pedantic)]

pub mod allocator;
pub mod compositor;
pub mod estimator;
pub mod template;
pub mod trim;

pub use allocator::{Allocation, AllocationError, Allotment, BudgetEntry, EntryContent, allocate};
pub use compositor::{
    ComposeError, ComposeResult, ComposedPrompt, CompositionPolicy, DEFAULT_INSTRUCTION_TEMPLATE,
    PRESENTATION_ORDER, PromptCompositor, Slot,
};
pub use estimator::{
    CachedEstimator, EstimateError, EstimateResult, HeuristicEstimator, TokenEstimator,
};
pub use template::{PromptTemplate, TemplateBuilder, TemplateError, TemplateResult};
pub use trim::{Trimmed, trim};
