//! Priority-ordered budget allocation across message groups.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use prompt_primitives::{Budget, LimitPolicy, Message, Priority};
use thiserror::Error;
use tracing::{debug, warn};

use crate::estimator::{EstimateError, TokenEstimator};
use crate::trim::trim;

/// Errors raised while allocating the budget.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Non-trimmable entries alone exceed the budget.
    #[error(
        "budget exceeded: fixed messages need {required} tokens, {available} of {limit} available"
    )]
    BudgetExceeded {
        /// Combined cost of every fixed entry.
        required: usize,
        /// Tokens left when the offending entry was reached.
        available: usize,
        /// Configured total budget.
        limit: usize,
    },

    /// A token count could not be produced.
    #[error(transparent)]
    Estimate(#[from] EstimateError),

    /// Two entries share a key.
    #[error("duplicate allocation key {key}")]
    DuplicateKey {
        /// Debug rendering of the key.
        key: String,
    },
}

/// What an entry contributes to the prompt.
#[derive(Clone, Copy, Debug)]
pub enum EntryContent<'a> {
    /// A single message that is charged in full and never trimmed.
    Fixed(&'a Message),
    /// An ordered group trimmed according to its policy.
    Group {
        /// Messages in their original order.
        messages: &'a [Message],
        /// How the group may be trimmed.
        policy: LimitPolicy,
    },
}

/// A keyed, prioritized request for budget.
#[derive(Clone, Copy, Debug)]
pub struct BudgetEntry<'a, K> {
    key: K,
    priority: Priority,
    content: EntryContent<'a>,
}

impl<'a, K> BudgetEntry<'a, K> {
    /// Creates a fixed, non-trimmable entry.
    #[must_use]
    pub const fn fixed(key: K, priority: Priority, message: &'a Message) -> Self {
        Self {
            key,
            priority,
            content: EntryContent::Fixed(message),
        }
    }

    /// Creates a trimmable group entry.
    #[must_use]
    pub const fn group(
        key: K,
        priority: Priority,
        messages: &'a [Message],
        policy: LimitPolicy,
    ) -> Self {
        Self {
            key,
            priority,
            content: EntryContent::Group { messages, policy },
        }
    }

    /// Returns the entry key.
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// Returns the entry priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }
}

/// Survivors of one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allotment<'a> {
    /// Kept messages in original order.
    pub messages: &'a [Message],
    /// Exact cost of `messages`.
    pub tokens: usize,
    /// Messages discarded by trimming.
    pub dropped: usize,
}

/// Outcome of [`allocate`], indexed by entry key.
#[derive(Clone, Debug)]
pub struct Allocation<'a, K> {
    allotments: HashMap<K, Allotment<'a>>,
    sequence: Vec<K>,
    budget: Budget,
}

impl<'a, K: Eq + Hash> Allocation<'a, K> {
    /// Returns the allotment for `key`.
    pub fn get(&self, key: &K) -> Option<&Allotment<'a>> {
        self.allotments.get(key)
    }

    /// Returns the kept messages for `key`, or an empty slice.
    pub fn messages(&self, key: &K) -> &'a [Message] {
        self.allotments
            .get(key)
            .map_or(&[] as &[Message], |allotment| allotment.messages)
    }

    /// Returns the tokens consumed by `key`.
    pub fn tokens(&self, key: &K) -> usize {
        self.allotments.get(key).map_or(0, |allotment| allotment.tokens)
    }

    /// Returns the messages `key` lost to trimming.
    pub fn dropped(&self, key: &K) -> usize {
        self.allotments.get(key).map_or(0, |allotment| allotment.dropped)
    }

    /// Keys in the order they were served.
    pub fn sequence(&self) -> &[K] {
        &self.sequence
    }

    /// Budget left after every entry was served.
    pub const fn budget(&self) -> Budget {
        self.budget
    }

    /// Tokens consumed across all entries.
    pub const fn spent(&self) -> usize {
        self.budget.spent()
    }
}

/// Serves `entries` from a budget of `total` tokens in priority order.
///
/// Entries are stably sorted by descending [`Priority`], so entries with equal
/// priority keep their relative input order. Fixed entries are charged in
/// full; groups are trimmed against whatever remains when their turn comes.
///
/// # Errors
///
/// Returns [`AllocationError::BudgetExceeded`] when a fixed entry does not fit,
/// [`AllocationError::Estimate`] when a cost cannot be computed, and
/// [`AllocationError::DuplicateKey`] when two entries share a key.
pub fn allocate<'a, K>(
    mut entries: Vec<BudgetEntry<'a, K>>,
    total: usize,
    estimator: &dyn TokenEstimator,
) -> Result<Allocation<'a, K>, AllocationError>
where
    K: Copy + Eq + Hash + Debug,
{
    entries.sort_by(|a, b| b.priority.cmp(&a.priority));

    let costs = fixed_costs(&entries, estimator)?;
    let required: usize = costs.iter().sum();

    let mut budget = Budget::new(total);
    let mut allotments = HashMap::with_capacity(entries.len());
    let mut sequence = Vec::with_capacity(entries.len());

    for (entry, &cost) in entries.iter().zip(&costs) {
        if allotments.contains_key(&entry.key) {
            return Err(AllocationError::DuplicateKey {
                key: format!("{:?}", entry.key),
            });
        }

        let allotment = match entry.content {
            EntryContent::Fixed(message) => {
                budget = budget.spend(cost).map_err(|_| {
                    warn!(
                        key = ?entry.key,
                        required,
                        available = budget.remaining(),
                        limit = total,
                        "fixed messages exceed the token budget"
                    );
                    AllocationError::BudgetExceeded {
                        required,
                        available: budget.remaining(),
                        limit: total,
                    }
                })?;
                Allotment {
                    messages: std::slice::from_ref(message),
                    tokens: cost,
                    dropped: 0,
                }
            }
            EntryContent::Group { messages, policy } => {
                let trimmed = trim(messages, policy, budget, estimator)?;
                budget = budget
                    .spend(trimmed.tokens_used)
                    .map_err(|_| AllocationError::BudgetExceeded {
                        required: trimmed.tokens_used,
                        available: budget.remaining(),
                        limit: total,
                    })?;
                debug!(
                    key = ?entry.key,
                    priority = %entry.priority,
                    kept = trimmed.kept.len(),
                    dropped = trimmed.dropped,
                    tokens = trimmed.tokens_used,
                    remaining = budget.remaining(),
                    "group trimmed"
                );
                Allotment {
                    messages: trimmed.kept,
                    tokens: trimmed.tokens_used,
                    dropped: trimmed.dropped,
                }
            }
        };

        sequence.push(entry.key);
        allotments.insert(entry.key, allotment);
    }

    Ok(Allocation {
        allotments,
        sequence,
        budget,
    })
}

/// Cost of each entry's fixed message, zero for groups.
fn fixed_costs<K>(
    entries: &[BudgetEntry<'_, K>],
    estimator: &dyn TokenEstimator,
) -> Result<Vec<usize>, EstimateError> {
    entries
        .iter()
        .map(|entry| match entry.content {
            EntryContent::Fixed(message) => estimator.estimate_message(message),
            EntryContent::Group { .. } => Ok(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimateResult;
    use prompt_primitives::{Fraction, TokenCap, TrimDirection};

    struct ByteEstimator;

    impl TokenEstimator for ByteEstimator {
        fn estimate_text(&self, text: &str) -> EstimateResult<usize> {
            Ok(text.len())
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    enum Key {
        A,
        B,
        C,
        D,
    }

    fn msg(len: usize) -> Message {
        Message::user("x".repeat(len))
    }

    #[test]
    fn serves_entries_by_priority_regardless_of_input_order() {
        let low = vec![msg(10)];
        let fixed = msg(5);
        let medium = vec![msg(10)];
        let entries = vec![
            BudgetEntry::group(
                Key::A,
                Priority::Low,
                &low,
                LimitPolicy::unbounded(TrimDirection::End),
            ),
            BudgetEntry::fixed(Key::B, Priority::Highest, &fixed),
            BudgetEntry::group(
                Key::C,
                Priority::Medium,
                &medium,
                LimitPolicy::unbounded(TrimDirection::Start),
            ),
        ];

        let allocation = allocate(entries, 20, &ByteEstimator).unwrap();
        assert_eq!(allocation.sequence(), &[Key::B, Key::C, Key::A]);
        assert_eq!(allocation.tokens(&Key::C), 10);
        assert!(allocation.messages(&Key::A).is_empty());
        assert_eq!(allocation.dropped(&Key::A), 1);
        assert_eq!(allocation.budget().remaining(), 5);
    }

    #[test]
    fn equal_priorities_keep_input_order() {
        let first = msg(1);
        let second = msg(1);
        let third = msg(1);
        let entries = vec![
            BudgetEntry::fixed(Key::C, Priority::High, &first),
            BudgetEntry::fixed(Key::A, Priority::High, &second),
            BudgetEntry::fixed(Key::D, Priority::Highest, &third),
        ];

        let allocation = allocate(entries, 10, &ByteEstimator).unwrap();
        assert_eq!(allocation.sequence(), &[Key::D, Key::C, Key::A]);
    }

    #[test]
    fn fixed_overflow_reports_total_fixed_cost() {
        let instruction = msg(40);
        let base = msg(70);
        let entries = vec![
            BudgetEntry::fixed(Key::A, Priority::High, &base),
            BudgetEntry::fixed(Key::B, Priority::Highest, &instruction),
        ];

        let err = allocate(entries, 100, &ByteEstimator).expect_err("over budget");
        assert_eq!(
            err,
            AllocationError::BudgetExceeded {
                required: 110,
                available: 60,
                limit: 100,
            }
        );
    }

    /// Bytes as tokens, but any `?` makes the tokenizer unavailable.
    struct PickyEstimator;

    impl TokenEstimator for PickyEstimator {
        fn estimate_text(&self, text: &str) -> EstimateResult<usize> {
            if text.contains('?') {
                return Err(EstimateError::Unavailable {
                    reason: "tokenizer down".to_owned(),
                });
            }
            Ok(text.len())
        }
    }

    #[test]
    fn fixed_estimation_failures_are_not_masked_by_overflow() {
        let instruction = msg(80);
        let base = Message::system("what?");
        let entries = vec![
            BudgetEntry::fixed(Key::A, Priority::Highest, &instruction),
            BudgetEntry::fixed(Key::B, Priority::High, &base),
        ];

        let err = allocate(entries, 50, &PickyEstimator).expect_err("estimator down");
        assert!(matches!(
            err,
            AllocationError::Estimate(EstimateError::Unavailable { .. })
        ));
    }

    #[test]
    fn fractional_caps_see_the_shrunken_budget() {
        let fixed = msg(50);
        let history = vec![msg(20), msg(20), msg(20)];
        let entries = vec![
            BudgetEntry::fixed(Key::A, Priority::Highest, &fixed),
            BudgetEntry::group(
                Key::B,
                Priority::Medium,
                &history,
                LimitPolicy::new(
                    TrimDirection::Start,
                    TokenCap::FractionOfRemaining {
                        fraction: Fraction::percent(40),
                        max_tokens: 1000,
                    },
                ),
            ),
        ];

        let allocation = allocate(entries, 100, &ByteEstimator).unwrap();
        assert_eq!(allocation.tokens(&Key::B), 20);
        assert_eq!(allocation.messages(&Key::B), &history[2..]);
    }

    #[test]
    fn rejects_duplicate_keys() {
        let one = msg(1);
        let two = msg(1);
        let entries = vec![
            BudgetEntry::fixed(Key::A, Priority::High, &one),
            BudgetEntry::fixed(Key::A, Priority::Low, &two),
        ];

        let err = allocate(entries, 10, &ByteEstimator).expect_err("duplicate");
        assert!(matches!(err, AllocationError::DuplicateKey { .. }));
    }

    #[test]
    fn never_spends_more_than_total() {
        let fixed = msg(3);
        let groups: Vec<Vec<Message>> = (1..=4)
            .map(|n| (0..n).map(|i| msg(i + 2)).collect())
            .collect();
        let keys = [Key::A, Key::B, Key::C];
        let priorities = [Priority::Medium, Priority::Low, Priority::Lowest];

        for total in 3..40 {
            let mut entries = vec![BudgetEntry::fixed(Key::D, Priority::Highest, &fixed)];
            for ((key, priority), group) in keys.iter().zip(priorities).zip(&groups) {
                entries.push(BudgetEntry::group(
                    *key,
                    priority,
                    group,
                    LimitPolicy::unbounded(TrimDirection::End),
                ));
            }
            let allocation = allocate(entries, total, &ByteEstimator).unwrap();
            assert!(allocation.spent() <= total);
        }
    }
}
