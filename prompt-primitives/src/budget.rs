//! Token budget threaded through allocation by value.

use std::fmt;

use crate::error::{Error, Result};

/// Tokens still available within one composition.
///
/// `Budget` is `Copy`; spending returns a new value instead of mutating shared
/// state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Budget {
    limit: usize,
    remaining: usize,
}

impl Budget {
    /// Creates a full budget of `limit` tokens.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    /// Returns the configured total.
    #[must_use]
    pub const fn limit(self) -> usize {
        self.limit
    }

    /// Returns the tokens still available.
    #[must_use]
    pub const fn remaining(self) -> usize {
        self.remaining
    }

    /// Returns the tokens spent so far.
    #[must_use]
    pub const fn spent(self) -> usize {
        self.limit - self.remaining
    }

    /// Spends `tokens`, returning the reduced budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overdrawn`] if `tokens` exceeds what remains.
    pub fn spend(self, tokens: usize) -> Result<Self> {
        if tokens > self.remaining {
            return Err(Error::Overdrawn {
                requested: tokens,
                remaining: self.remaining,
            });
        }
        Ok(Self {
            limit: self.limit,
            remaining: self.remaining - tokens,
        })
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} tokens remaining", self.remaining, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spending_reduces_remaining() {
        let budget = Budget::new(100).spend(30).unwrap().spend(20).unwrap();
        assert_eq!(budget.remaining(), 50);
        assert_eq!(budget.spent(), 50);
        assert_eq!(budget.limit(), 100);
    }

    #[test]
    fn overdraw_is_an_error() {
        let err = Budget::new(10).spend(11).expect_err("overdrawn");
        assert!(matches!(
            err,
            Error::Overdrawn {
                requested: 11,
                remaining: 10
            }
        ));
    }

    #[test]
    fn spending_everything_exhausts() {
        let budget = Budget::new(5).spend(5).unwrap();
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.spent(), 5);
    }
}
