//! Classification trigger.
//!
//! The trigger hands a ticket to the external classifier. A successful call
//! only means the job was accepted. Completion shows up later as a record
//! store update with `processed = true`.

use crate::ticket::TicketId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Job submitted to the classifier
///
/// Serializes as `{"ticket_id": "...", "description": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationJob {
    /// Ticket to classify
    pub ticket_id: TicketId,
    /// Text to classify
    pub description: String,
}

/// Errors from the classification trigger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The classifier answered with a non-success status
    #[error("classifier rejected the job ({status}): {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, as returned
        body: String,
    },

    /// The classifier could not be reached
    #[error("classifier unreachable: {0}")]
    Unreachable(String),
}

/// Submits classification jobs
///
/// Implementations must not retry. A failure is reported once and the user
/// decides whether to resubmit.
pub trait ClassificationTrigger: Send + Sync {
    /// Submits one job and waits for it to be accepted
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError`] if the job was rejected or the classifier was
    /// unreachable.
    fn trigger(
        &self,
        job: ClassificationJob,
    ) -> Pin<Box<dyn Future<Output = Result<(), TriggerError>> + Send + '_>>;
}
