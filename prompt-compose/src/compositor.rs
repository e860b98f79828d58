//! Prompt compositor: fixed prompts, history, and context under one budget.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prompt_config::{ChatSettings, Thread};
use prompt_primitives::{
    Budget, Fraction, LimitPolicy, Message, Priority, TokenCap, TrimDirection,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::allocator::{AllocationError, BudgetEntry, allocate};
use crate::estimator::{EstimateError, HeuristicEstimator, TokenEstimator};
use crate::template::{PromptTemplate, TemplateError};

/// Instruction block wrapped around the user's input.
pub const DEFAULT_INSTRUCTION_TEMPLATE: &str = "\nRespond to the following message based on the information in [[CONTEXT]] above.
<human>
{{input}}
</human>

{{restriction}}";

/// Result alias for composition.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// Errors that abort composition before any model call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComposeError {
    /// The instruction block and base prompt alone exceed the input limit.
    #[error("prompt needs {required} tokens for fixed messages but the input limit is {limit}")]
    BudgetExceeded {
        /// Combined cost of the non-trimmable messages.
        required: usize,
        /// Tokens that were left when the overflow was detected.
        available: usize,
        /// Configured input-token limit.
        limit: usize,
    },

    /// A token count could not be produced.
    #[error("token estimation failed: {0}")]
    Estimator(#[from] EstimateError),

    /// The instruction template could not be rendered.
    #[error("instruction rendering failed: {0}")]
    Render(#[from] TemplateError),

    /// The allocator rejected the entry set.
    #[error("allocation failed: {0}")]
    Allocation(AllocationError),
}

impl From<AllocationError> for ComposeError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::BudgetExceeded {
                required,
                available,
                limit,
            } => Self::BudgetExceeded {
                required,
                available,
                limit,
            },
            AllocationError::Estimate(err) => Self::Estimator(err),
            other @ AllocationError::DuplicateKey { .. } => Self::Allocation(other),
        }
    }
}

/// The four message groups a prompt is assembled from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The chat's base system prompt.
    BasePrompt,
    /// Long-term memories, most relevant first.
    Context,
    /// Recent conversation turns, oldest first.
    History,
    /// Rendered instruction carrying the user's input.
    Instruction,
}

impl Slot {
    /// Allocation priority of the slot.
    #[must_use]
    pub const fn priority(self) -> Priority {
        match self {
            Self::Instruction => Priority::Highest,
            Self::BasePrompt => Priority::High,
            Self::History => Priority::Medium,
            Self::Context => Priority::Low,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BasePrompt => "base_prompt",
            Self::Context => "context",
            Self::History => "history",
            Self::Instruction => "instruction",
        })
    }
}

/// Left-to-right order of slots in the final prompt.
pub const PRESENTATION_ORDER: [Slot; 4] =
    [Slot::BasePrompt, Slot::Context, Slot::History, Slot::Instruction];

/// Tunables for composition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositionPolicy {
    /// Template for the instruction block; sees `input`, `restriction`, and
    /// the thread's values.
    pub instruction: PromptTemplate,
    /// Trimming of conversation history.
    pub history: LimitPolicy,
    /// Trimming of long-term context.
    pub context: LimitPolicy,
}

impl CompositionPolicy {
    /// History may take 40% of what remains after the fixed messages, never
    /// more than this many tokens.
    pub const HISTORY_MAX_TOKENS: usize = 1000;
    /// Share of the remaining budget available to history.
    pub const HISTORY_SHARE: Fraction = Fraction::percent(40);

    /// Default history policy: oldest turns go first.
    #[must_use]
    pub const fn default_history() -> LimitPolicy {
        LimitPolicy::new(
            TrimDirection::Start,
            TokenCap::FractionOfRemaining {
                fraction: Self::HISTORY_SHARE,
                max_tokens: Self::HISTORY_MAX_TOKENS,
            },
        )
    }

    /// Default context policy: least relevant memories go first.
    #[must_use]
    pub const fn default_context() -> LimitPolicy {
        LimitPolicy::unbounded(TrimDirection::End)
    }

    /// Replaces the instruction template.
    #[must_use]
    pub fn with_instruction(mut self, template: PromptTemplate) -> Self {
        self.instruction = template;
        self
    }

    /// Replaces the history policy.
    #[must_use]
    pub fn with_history(mut self, policy: LimitPolicy) -> Self {
        self.history = policy;
        self
    }

    /// Replaces the context policy.
    #[must_use]
    pub fn with_context(mut self, policy: LimitPolicy) -> Self {
        self.context = policy;
        self
    }
}

impl Default for CompositionPolicy {
    fn default() -> Self {
        Self {
            instruction: PromptTemplate::strict(DEFAULT_INSTRUCTION_TEMPLATE),
            history: Self::default_history(),
            context: Self::default_context(),
        }
    }
}

/// Final, budget-respecting message sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedPrompt {
    messages: Vec<Message>,
    budget: Budget,
    dropped_history: usize,
    dropped_context: usize,
}

impl ComposedPrompt {
    /// Messages in presentation order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consumes the prompt, returning its messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Estimated tokens of the whole prompt.
    #[must_use]
    pub const fn token_count(&self) -> usize {
        self.budget.spent()
    }

    /// Tokens of the input limit left unused.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.budget.remaining()
    }

    /// History messages trimmed away.
    #[must_use]
    pub const fn dropped_history(&self) -> usize {
        self.dropped_history
    }

    /// Context messages trimmed away.
    #[must_use]
    pub const fn dropped_context(&self) -> usize {
        self.dropped_context
    }
}

/// Builds prompts from chat settings, a thread, and the user's input.
#[derive(Clone)]
pub struct PromptCompositor {
    estimator: Arc<dyn TokenEstimator>,
    policy: CompositionPolicy,
}

impl fmt::Debug for PromptCompositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptCompositor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for PromptCompositor {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicEstimator::default()))
    }
}

impl PromptCompositor {
    /// Creates a compositor with the default policy.
    #[must_use]
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            estimator,
            policy: CompositionPolicy::default(),
        }
    }

    /// Replaces the composition policy.
    #[must_use]
    pub fn with_policy(mut self, policy: CompositionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &CompositionPolicy {
        &self.policy
    }

    /// Returns the estimator used for budgeting.
    #[must_use]
    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Renders the instruction block for `input`.
    ///
    /// Thread values are visible to the template, but `input` and
    /// `restriction` always take precedence over them.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::Render`] when a placeholder cannot be resolved.
    pub fn render_instruction(
        &self,
        input: &str,
        chat: &ChatSettings,
        thread: &Thread,
    ) -> ComposeResult<Message> {
        let mut vars: HashMap<String, String> = thread.values.clone();
        vars.insert("input".to_owned(), input.to_owned());
        vars.insert("restriction".to_owned(), chat.prompts.restriction.clone());
        let content = self.policy.instruction.render_with(&vars)?;
        Ok(Message::system(content))
    }

    /// Composes the prompt for one model call.
    ///
    /// Budget is offered in [`Slot::priority`] order: instruction, base
    /// prompt, history, then context. Survivors are laid out in
    /// [`PRESENTATION_ORDER`].
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::BudgetExceeded`] when the instruction block and
    /// base prompt alone exceed `chat.input_token_limit`, and propagates
    /// rendering and estimation failures.
    pub fn compose(
        &self,
        input: &str,
        chat: &ChatSettings,
        thread: &Thread,
    ) -> ComposeResult<ComposedPrompt> {
        let instruction = self.render_instruction(input, chat, thread)?;
        let base = Message::system(chat.prompts.base.clone());

        let entries = vec![
            BudgetEntry::fixed(Slot::BasePrompt, Slot::BasePrompt.priority(), &base),
            BudgetEntry::group(
                Slot::Context,
                Slot::Context.priority(),
                &thread.context,
                self.policy.context,
            ),
            BudgetEntry::group(
                Slot::History,
                Slot::History.priority(),
                &thread.history,
                self.policy.history,
            ),
            BudgetEntry::fixed(Slot::Instruction, Slot::Instruction.priority(), &instruction),
        ];

        let allocation = allocate(entries, chat.input_token_limit, self.estimator.as_ref())?;
        debug!(sequence = ?allocation.sequence(), "budget allocated");

        let messages: Vec<Message> = PRESENTATION_ORDER
            .iter()
            .flat_map(|slot| allocation.messages(slot).iter().cloned())
            .collect();

        let prompt = ComposedPrompt {
            messages,
            budget: allocation.budget(),
            dropped_history: allocation.dropped(&Slot::History),
            dropped_context: allocation.dropped(&Slot::Context),
        };

        info!(
            messages = prompt.messages.len(),
            tokens = prompt.token_count(),
            limit = chat.input_token_limit,
            dropped_history = prompt.dropped_history,
            dropped_context = prompt.dropped_context,
            "prompt composed"
        );
        Ok(prompt)
    }
}
