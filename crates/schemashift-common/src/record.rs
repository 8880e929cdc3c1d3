use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the tracking table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    pub batch: i64,
    pub executed_at: DateTime<Utc>,
}

/// Which way a run moves the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Selects the migration a `down` run reverts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevertTarget {
    /// The most recently applied migration (highest batch, then highest id).
    #[default]
    LastApplied,
    /// The lexicographically last migration in the source listing, reverted
    /// only when it has been applied.
    LastInDirectory,
}

impl FromStr for RevertTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-applied" => Ok(Self::LastApplied),
            "last-file" | "last-in-directory" => Ok(Self::LastInDirectory),
            other => Err(format!(
                "unknown revert target '{other}' (expected last-applied or last-file)"
            )),
        }
    }
}
