//! Allocation priority tags.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Order in which message groups are offered the token budget.
///
/// Priority only decides who is served first when space is scarce. It says
/// nothing about where a message appears in the final prompt.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Served first; used for the rendered instruction block.
    Highest,
    /// Used for the base system prompt.
    High,
    /// Used for conversation history.
    Medium,
    /// Used for long-term context.
    Low,
    /// Served last.
    Lowest,
}

impl Priority {
    /// All tags from most to least important.
    pub const ALL: [Self; 5] = [
        Self::Highest,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Lowest,
    ];

    /// Position in allocation sequence; smaller is served earlier.
    const fn rank(self) -> u8 {
        match self {
            Self::Highest => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Lowest => 4,
        }
    }
}

impl Ord for Priority {
    /// `Highest > High > Medium > Low > Lowest`.
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank().cmp(&self.rank())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Highest => "highest",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Lowest => "lowest",
        })
    }
}
