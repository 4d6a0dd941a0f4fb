//! Submission orchestrator.
//!
//! Creating a ticket takes three steps:
//!
//! 1. generate an id and timestamp, then insert the ticket optimistically
//! 2. persist it through the [`RecordStore`](crate::records::RecordStore)
//! 3. once persisted, hand it to the [`ClassificationTrigger`](crate::trigger::ClassificationTrigger)
//!
//! The form stays busy from step 1 until step 3 is accepted or any step
//! fails. A failure is reported once and never retried; the optimistic entry
//! stays in the list and is flagged instead of rolled back. Resubmitting the
//! same text creates a brand-new ticket.

use crate::desk::{DeskEnvironment, DeskState};
use crate::effect::Effect;
use crate::error::SyncError;
use crate::gateway_call;
use crate::reducer::Reducer;
use crate::ticket::{Ticket, TicketId};
use crate::tickets::{TicketsAction, TicketsReducer};
use crate::trigger::ClassificationJob;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// State of the ticket form
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionState {
    /// Current text of the description field
    pub draft: String,
    /// True while a submission is in flight
    pub busy: bool,
    /// Ticket currently being submitted
    pub in_flight: Option<TicketId>,
    /// Failure of the last submission, shown until the next one starts
    pub error: Option<SyncError>,
}

impl SubmissionState {
    /// Whether the submit action is enabled
    #[must_use]
    pub fn can_submit(&self) -> bool {
        !self.busy && !self.draft.trim().is_empty()
    }
}

/// Inputs to the submission flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionAction {
    /// The description field changed
    DraftChanged {
        /// New field contents
        text: String,
    },
    /// The user asked to submit a ticket
    Submit {
        /// Ticket text, must contain non-whitespace characters
        description: String,
    },
    /// The record store persisted the ticket
    Saved {
        /// Persisted ticket
        id: TicketId,
        /// Trimmed description, forwarded to the trigger
        description: String,
    },
    /// The classifier accepted the job
    Completed {
        /// Submitted ticket
        id: TicketId,
    },
    /// Persisting or triggering failed
    Failed {
        /// Affected ticket
        id: TicketId,
        /// Which step failed and why
        error: SyncError,
    },
}

impl SubmissionAction {
    /// Whether this action ends a submission
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Ticket this action is about, if any
    #[must_use]
    pub const fn ticket_id(&self) -> Option<&TicketId> {
        match self {
            Self::Saved { id, .. } | Self::Completed { id } | Self::Failed { id, .. } => Some(id),
            Self::DraftChanged { .. } | Self::Submit { .. } => None,
        }
    }
}

/// Checks whether a submission may start, returning the trimmed description
///
/// # Errors
///
/// Returns the reason the submission is refused.
pub fn validate_submission(
    state: &SubmissionState,
    description: &str,
) -> Result<String, &'static str> {
    if state.busy {
        return Err("a submission is already in progress");
    }

    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err("description is empty");
    }

    Ok(trimmed.to_string())
}

/// Reducer driving the three submission steps
///
/// Operates on the whole [`DeskState`] because step 1 writes to the ticket
/// list as well as to the form.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubmissionReducer;

impl SubmissionReducer {
    /// Creates a new `SubmissionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply_to_tickets(state: &mut DeskState, action: TicketsAction) {
        // The ticket reducer is effect-free.
        let _ = TicketsReducer::new().reduce(&mut state.tickets, action, &());
    }
}

impl Reducer for SubmissionReducer {
    type State = DeskState;
    type Action = SubmissionAction;
    type Environment = DeskEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // The field is read-only while a submission runs
            SubmissionAction::DraftChanged { .. } if state.submission.busy => {
                tracing::debug!("Draft edit ignored while submitting");
                SmallVec::new()
            },
            SubmissionAction::DraftChanged { text } => {
                state.submission.draft = text;
                SmallVec::new()
            },

            SubmissionAction::Submit { description } => {
                let description = match validate_submission(&state.submission, &description) {
                    Ok(description) => description,
                    Err(reason) => {
                        tracing::debug!(reason, "Submission refused");
                        return SmallVec::new();
                    },
                };

                let id = env.ids.next_id();
                let ticket = Ticket::new(id.clone(), description.clone(), env.clock.now());
                tracing::info!(ticket_id = %id, "Submitting ticket");

                state.submission.busy = true;
                state.submission.in_flight = Some(id.clone());
                state.submission.error = None;
                Self::apply_to_tickets(
                    state,
                    TicketsAction::InsertedOptimistically {
                        ticket: ticket.clone(),
                    },
                );

                let records = Arc::clone(&env.records);
                smallvec![gateway_call! {
                    call: records.create(ticket),
                    on_success: |()| Some(SubmissionAction::Saved { id, description }),
                    on_error: |error| Some(SubmissionAction::Failed {
                        id,
                        error: SyncError::persist(&error),
                    })
                }]
            },

            SubmissionAction::Saved { id, description } => {
                tracing::debug!(ticket_id = %id, "Ticket persisted, triggering classification");
                Self::apply_to_tickets(state, TicketsAction::Confirmed { id: id.clone() });

                let trigger = Arc::clone(&env.trigger);
                smallvec![gateway_call! {
                    call: trigger.trigger(ClassificationJob {
                        ticket_id: id.clone(),
                        description,
                    }),
                    on_success: |()| Some(SubmissionAction::Completed { id }),
                    on_error: |error| Some(SubmissionAction::Failed {
                        id,
                        error: SyncError::trigger(&error),
                    })
                }]
            },

            SubmissionAction::Completed { id } => {
                tracing::info!(ticket_id = %id, "Ticket submitted for classification");
                if state.submission.in_flight.as_ref() == Some(&id) {
                    state.submission.busy = false;
                    state.submission.in_flight = None;
                    state.submission.error = None;
                    state.submission.draft.clear();
                }
                SmallVec::new()
            },

            SubmissionAction::Failed { id, error } => {
                tracing::warn!(ticket_id = %id, %error, "Ticket submission failed");
                if state.submission.in_flight.as_ref() == Some(&id) {
                    state.submission.busy = false;
                    state.submission.in_flight = None;
                    state.submission.error = Some(error.clone());
                }
                Self::apply_to_tickets(state, TicketsAction::SubmissionFailed { id, error });
                SmallVec::new()
            },
        }
    }
}
