//! Root reducer for the support desk client.
//!
//! Combines the ticket synchronizer and the submission orchestrator into the
//! single state object the runtime owns, and issues the bulk load.

use crate::effect::Effect;
use crate::environment::{Clock, IdGenerator};
use crate::error::SyncError;
use crate::gateway_call;
use crate::records::RecordStore;
use crate::reducer::Reducer;
use crate::submission::{SubmissionAction, SubmissionReducer, SubmissionState};
use crate::tickets::{TicketsAction, TicketsReducer, TicketsState};
use crate::trigger::ClassificationTrigger;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// Everything the client displays
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeskState {
    /// The synchronized ticket list
    pub tickets: TicketsState,
    /// The ticket form
    pub submission: SubmissionState,
}

impl DeskState {
    /// Creates the startup state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Every input to the client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeskAction {
    /// Request the bulk load from the record store
    LoadTickets,
    /// Ticket list input
    Tickets(TicketsAction),
    /// Form and submission input
    Submission(SubmissionAction),
}

impl From<TicketsAction> for DeskAction {
    fn from(action: TicketsAction) -> Self {
        Self::Tickets(action)
    }
}

impl From<SubmissionAction> for DeskAction {
    fn from(action: SubmissionAction) -> Self {
        Self::Submission(action)
    }
}

/// Injected dependencies
#[derive(Clone)]
pub struct DeskEnvironment {
    /// Timestamps for new tickets
    pub clock: Arc<dyn Clock>,
    /// Identifiers for new tickets
    pub ids: Arc<dyn IdGenerator>,
    /// Persistent ticket store
    pub records: Arc<dyn RecordStore>,
    /// Classification job submission
    pub trigger: Arc<dyn ClassificationTrigger>,
}

impl DeskEnvironment {
    /// Creates a new `DeskEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        records: Arc<dyn RecordStore>,
        trigger: Arc<dyn ClassificationTrigger>,
    ) -> Self {
        Self {
            clock,
            ids,
            records,
            trigger,
        }
    }
}

impl std::fmt::Debug for DeskEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeskEnvironment").finish_non_exhaustive()
    }
}

/// Root reducer
#[derive(Clone, Copy, Debug, Default)]
pub struct DeskReducer {
    tickets: TicketsReducer,
    submission: SubmissionReducer,
}

impl DeskReducer {
    /// Creates a new `DeskReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tickets: TicketsReducer::new(),
            submission: SubmissionReducer::new(),
        }
    }
}

impl Reducer for DeskReducer {
    type State = DeskState;
    type Action = DeskAction;
    type Environment = DeskEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            DeskAction::LoadTickets => {
                state.tickets.loading = true;
                let records = Arc::clone(&env.records);
                smallvec![gateway_call! {
                    call: records.list_all(),
                    on_success: |tickets| Some(DeskAction::Tickets(TicketsAction::Loaded { tickets })),
                    on_error: |error| Some(DeskAction::Tickets(TicketsAction::LoadFailed {
                        error: SyncError::load(&error),
                    }))
                }]
            },
            DeskAction::Tickets(action) => self
                .tickets
                .reduce(&mut state.tickets, action, &())
                .into_iter()
                .map(|effect| effect.map(DeskAction::Tickets))
                .collect(),
            DeskAction::Submission(action) => self
                .submission
                .reduce(state, action, env)
                .into_iter()
                .map(|effect| effect.map(DeskAction::Submission))
                .collect(),
        }
    }
}
