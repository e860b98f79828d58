//! Limit policies describing how a message group may be trimmed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const BASIS_POINTS: u32 = 10_000;

/// End of a message group that is discarded first when trimming.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrimDirection {
    /// Drop from the front, keeping the longest suffix that fits.
    Start,
    /// Drop from the back, keeping the longest prefix that fits.
    End,
}

/// A ratio in `0..=1`, stored as integer basis points.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(try_from = "f64", into = "f64")]
pub struct Fraction(u32);

impl Fraction {
    /// Creates a fraction from a whole percentage, saturating at 100.
    #[must_use]
    pub const fn percent(percent: u32) -> Self {
        let percent = if percent > 100 { 100 } else { percent };
        Self(percent * 100)
    }

    /// Creates a fraction from a floating-point ratio.
    ///
    /// The value is rounded to the nearest basis point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFraction`] if the value is not finite or falls
    /// outside `0.0..=1.0`.
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(Error::InvalidFraction { value });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let points = (value * f64::from(BASIS_POINTS)).round() as u32;
        Ok(Self(points))
    }

    /// Returns the ratio as basis points (`10_000` is one).
    #[must_use]
    pub const fn basis_points(self) -> u32 {
        self.0
    }

    /// Applies the fraction to a token count, rounding down.
    #[must_use]
    pub fn of(self, tokens: usize) -> usize {
        let scaled = tokens as u128 * u128::from(self.0) / u128::from(BASIS_POINTS);
        usize::try_from(scaled).unwrap_or(usize::MAX)
    }
}

impl TryFrom<f64> for Fraction {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Fraction> for f64 {
    fn from(value: Fraction) -> Self {
        f64::from(value.0) / f64::from(BASIS_POINTS)
    }
}

/// Upper bound on the tokens a group may consume.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TokenCap {
    /// Only the remaining budget limits the group.
    Unbounded,
    /// A fixed number of tokens.
    Absolute {
        /// Maximum tokens.
        tokens: usize,
    },
    /// A share of the tokens remaining when the group is processed, never
    /// more than `max_tokens`.
    FractionOfRemaining {
        /// Share of the remaining budget.
        fraction: Fraction,
        /// Hard ceiling applied after the fraction.
        max_tokens: usize,
    },
}

impl TokenCap {
    /// Resolves the cap against the tokens currently available.
    ///
    /// The result never exceeds `available`.
    #[must_use]
    pub fn resolve(self, available: usize) -> usize {
        let cap = match self {
            Self::Unbounded => available,
            Self::Absolute { tokens } => tokens,
            Self::FractionOfRemaining {
                fraction,
                max_tokens,
            } => fraction.of(available).min(max_tokens),
        };
        cap.min(available)
    }
}

/// Trimming policy attached to a message group.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct LimitPolicy {
    /// Which end is discarded first.
    pub direction: TrimDirection,
    /// Upper bound on consumed tokens.
    pub cap: TokenCap,
}

impl LimitPolicy {
    /// Creates a policy from its parts.
    #[must_use]
    pub const fn new(direction: TrimDirection, cap: TokenCap) -> Self {
        Self { direction, cap }
    }

    /// A policy limited only by the remaining budget.
    #[must_use]
    pub const fn unbounded(direction: TrimDirection) -> Self {
        Self::new(direction, TokenCap::Unbounded)
    }

    /// Returns the token cap for the given availability.
    #[must_use]
    pub fn cap_for(&self, available: usize) -> usize {
        self.cap.resolve(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_of_remaining_takes_the_smaller_bound() {
        let cap = TokenCap::FractionOfRemaining {
            fraction: Fraction::percent(40),
            max_tokens: 1000,
        };
        assert_eq!(cap.resolve(50), 20);
        assert_eq!(cap.resolve(10_000), 1000);
    }

    #[test]
    fn cap_never_exceeds_available() {
        assert_eq!(TokenCap::Absolute { tokens: 500 }.resolve(120), 120);
        assert_eq!(TokenCap::Unbounded.resolve(7), 7);
        assert_eq!(TokenCap::Unbounded.resolve(0), 0);
    }

    #[test]
    fn fraction_rounds_to_basis_points() {
        let fraction = Fraction::new(0.4).unwrap();
        assert_eq!(fraction, Fraction::percent(40));
        assert_eq!(fraction.of(50), 20);
        assert_eq!(Fraction::new(0.29).unwrap().of(100), 29);
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        assert!(matches!(
            Fraction::new(1.5),
            Err(Error::InvalidFraction { .. })
        ));
        assert!(Fraction::new(f64::NAN).is_err());
    }

    #[test]
    fn policy_deserializes_from_json() {
        let json = r#"{
            "direction": "start",
            "cap": { "kind": "fraction_of_remaining", "fraction": 0.4, "max_tokens": 1000 }
        }"#;
        let policy: LimitPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.direction, TrimDirection::Start);
        assert_eq!(policy.cap_for(50), 20);
    }
}
