//! User-visible failure kinds.
//!
//! Every store or network failure is converted into one [`SyncError`] at the
//! reducer boundary. None of them stops the application and none is retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure surfaced to the user
///
/// The `Display` output is the message shown in the interface, so a failed
/// save reads differently from a failed classification trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncError {
    /// The initial bulk read failed; the list is shown empty
    #[error("Could not load tickets: {0}")]
    LoadFailure(String),

    /// The create call failed; the optimistic entry has no backing row
    #[error("Could not save ticket: {0}")]
    PersistFailure(String),

    /// The classification trigger rejected the job or was unreachable; the
    /// ticket is stored but will not be classified
    #[error("Could not trigger processing: {0}")]
    TriggerFailure(String),

    /// The push-update channel disconnected
    #[error("Live updates stopped: {0}")]
    SubscriptionDrop(String),
}

impl SyncError {
    /// Wraps a bulk-read failure
    pub fn load(source: &impl std::fmt::Display) -> Self {
        Self::LoadFailure(source.to_string())
    }

    /// Wraps a create failure
    pub fn persist(source: &impl std::fmt::Display) -> Self {
        Self::PersistFailure(source.to_string())
    }

    /// Wraps a trigger failure
    pub fn trigger(source: &impl std::fmt::Display) -> Self {
        Self::TriggerFailure(source.to_string())
    }

    /// Wraps a subscription failure
    pub fn subscription(source: &impl std::fmt::Display) -> Self {
        Self::SubscriptionDrop(source.to_string())
    }

    /// Short machine-readable kind, used as a metrics label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LoadFailure(_) => "load",
            Self::PersistFailure(_) => "persist",
            Self::TriggerFailure(_) => "trigger",
            Self::SubscriptionDrop(_) => "subscription",
        }
    }
}
