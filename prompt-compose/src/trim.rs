//! Whole-message trimming of a single group.

use prompt_primitives::{Budget, LimitPolicy, Message, TrimDirection};

use crate::estimator::{EstimateResult, TokenEstimator};

/// Contiguous survivors of a trimmed group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trimmed<'a> {
    /// Kept messages, in their original order.
    pub kept: &'a [Message],
    /// Exact cost of `kept`.
    pub tokens_used: usize,
    /// Number of messages discarded.
    pub dropped: usize,
}

impl<'a> Trimmed<'a> {
    fn nothing(messages: &'a [Message]) -> Self {
        Self {
            kept: &messages[..0],
            tokens_used: 0,
            dropped: messages.len(),
        }
    }
}

/// Trims `messages` so their cost fits the policy's cap.
///
/// The cap is `min(available, policy.cap)` with fractional caps resolved
/// against `available`. [`TrimDirection::End`] keeps the longest prefix that
/// fits, [`TrimDirection::Start`] the longest suffix. Messages are never
/// split: the scan stops at the first message that would overflow the cap,
/// even when a later, smaller one would still fit, so survivors stay
/// contiguous.
///
/// # Errors
///
/// Propagates estimator failures for the messages that were examined.
pub fn trim<'a>(
    messages: &'a [Message],
    policy: LimitPolicy,
    available: Budget,
    estimator: &dyn TokenEstimator,
) -> EstimateResult<Trimmed<'a>> {
    let cap = policy.cap_for(available.remaining());
    if messages.is_empty() || cap == 0 {
        return Ok(Trimmed::nothing(messages));
    }

    let mut used = 0;
    let mut count = 0;
    let ordered: Box<dyn Iterator<Item = &Message> + '_> = match policy.direction {
        TrimDirection::End => Box::new(messages.iter()),
        TrimDirection::Start => Box::new(messages.iter().rev()),
    };
    for message in ordered {
        let cost = estimator.estimate_message(message)?;
        if used + cost > cap {
            break;
        }
        used += cost;
        count += 1;
    }

    let kept = match policy.direction {
        TrimDirection::End => &messages[..count],
        TrimDirection::Start => &messages[messages.len() - count..],
    };
    Ok(Trimmed {
        kept,
        tokens_used: used,
        dropped: messages.len() - count,
    })
}
