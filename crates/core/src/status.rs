//! Cache entry status lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a cached upstream response.
///
/// Only one `Default` entry may exist per `(upstream, relative_path)`.
/// `Processing` is reserved: no code path currently enters it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEntryStatus {
    /// Live entry served to clients.
    Default,
    /// Reserved for entries being written.
    Processing,
    /// Marked for removal by the reaper.
    PendingDestruction,
    /// Failed entry kept for inspection.
    Error,
}

impl CacheEntryStatus {
    /// Get the string representation stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Processing => "processing",
            Self::PendingDestruction => "pending_destruction",
            Self::Error => "error",
        }
    }

    /// Check if the status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PendingDestruction)
    }

    /// Check whether moving from `self` to `next` is allowed.
    ///
    /// `Default -> Default` is an in-place refresh.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use CacheEntryStatus::*;
        matches!(
            (self, next),
            (Default, Default)
                | (Default, PendingDestruction)
                | (Default, Error)
                | (Processing, Default)
                | (Processing, Error)
                | (Processing, PendingDestruction)
                | (Error, PendingDestruction)
        )
    }

    /// Validate a transition, returning the target status.
    pub fn transition(self, next: Self) -> crate::Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl FromStr for CacheEntryStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "processing" => Ok(Self::Processing),
            "pending_destruction" => Ok(Self::PendingDestruction),
            "error" => Ok(Self::Error),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CacheEntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
