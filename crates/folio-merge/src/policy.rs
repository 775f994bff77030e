use std::fmt;

use serde::{Deserialize, Serialize};

/// How divergent heads of a page are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergePolicy {
    /// Leave the heads divergent.
    None,
    /// Conflicting keys take the value of the newer head.
    #[default]
    LastOneWins,
    /// Conflicts are handed to an external resolver.
    Custom,
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::LastOneWins => write!(f, "LAST_ONE_WINS"),
            Self::Custom => write!(f, "CUSTOM"),
        }
    }
}
