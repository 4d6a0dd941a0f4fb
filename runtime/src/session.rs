//! Session lifecycle for one support desk client.
//!
//! A [`TicketSession`] is the single owner of the desk state. Starting it
//! opens the record store's update subscription, issues the bulk load, and
//! spawns a forwarder that turns every pushed row into a
//! [`TicketsAction::RemoteUpdated`]. Shutting it down releases the
//! subscription before anything else, so no update is dispatched afterwards.
//!
//! A dropped subscription is not reopened: the header shows the list as
//! disconnected and the session keeps serving the rows it already has.

use crate::error::StoreError;
use crate::store::Store;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use support_copilot_core::desk::{DeskAction, DeskEnvironment, DeskReducer, DeskState};
use support_copilot_core::error::SyncError;
use support_copilot_core::records::{RecordStore, SubscriptionHandle, TicketUpdateStream};
use support_copilot_core::submission::{SubmissionAction, validate_submission};
use support_copilot_core::ticket::TicketId;
use support_copilot_core::tickets::TicketsAction;
use support_copilot_core::view::DeskView;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// The Store specialised to the desk reducer
pub type DeskStore = Store<DeskState, DeskAction, DeskEnvironment, DeskReducer>;

/// Errors returned to the caller of a session operation
#[derive(Error, Debug)]
pub enum SessionError {
    /// The submission never started
    #[error("Submission refused: {0}")]
    Refused(&'static str),

    /// The submission started and failed
    #[error(transparent)]
    Submission(#[from] SyncError),

    /// The runtime rejected the action or stopped answering
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Session tuning
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How long [`TicketSession::submit`] waits for the save and the trigger
    /// to finish. The submission itself is not cancelled when this elapses.
    pub submit_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            submit_timeout: Duration::from_secs(120),
        }
    }
}

/// One running client: state, subscription and submission entry point
pub struct TicketSession {
    store: DeskStore,
    records: Arc<dyn RecordStore>,
    subscription: Option<SubscriptionHandle>,
    forwarder: Option<JoinHandle<()>>,
    submitting: Mutex<()>,
    config: SessionConfig,
}

impl TicketSession {
    /// Starts a session with the default configuration
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the initial actions are rejected.
    pub async fn start(environment: DeskEnvironment) -> Result<Self, SessionError> {
        Self::start_with_config(environment, SessionConfig::default()).await
    }

    /// Opens the update subscription, then requests the bulk load
    ///
    /// Subscribing first means no update committed after the snapshot was
    /// taken can be missed. Updates for rows the list does not hold yet are
    /// dropped by the synchronizer.
    ///
    /// A failure to subscribe is not fatal: the session starts disconnected.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the initial actions are rejected.
    #[tracing::instrument(skip_all, name = "session_start")]
    pub async fn start_with_config(
        environment: DeskEnvironment,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let records = Arc::clone(&environment.records);
        let store = Store::new(DeskState::new(), DeskReducer::new(), environment);

        let (subscription, forwarder) = match records.subscribe_to_updates().await {
            Ok(subscription) => {
                store.send(TicketsAction::SubscriptionEstablished.into()).await?;
                let handle = subscription.handle.clone();
                let forwarder = tokio::spawn(forward_updates(
                    store.clone(),
                    subscription.updates,
                    subscription.handle,
                ));
                (Some(handle), Some(forwarder))
            },
            Err(error) => {
                tracing::warn!(%error, "Could not open the update subscription");
                metrics::counter!("session.subscription.dropped").increment(1);
                store
                    .send(
                        TicketsAction::SubscriptionDropped {
                            error: SyncError::subscription(&error),
                        }
                        .into(),
                    )
                    .await?;
                (None, None)
            },
        };

        store.send(DeskAction::LoadTickets).await?;
        tracing::info!("Session started");

        Ok(Self {
            store,
            records,
            subscription,
            forwarder,
            submitting: Mutex::new(()),
            config,
        })
    }

    /// Submits a ticket and waits until it is saved and classification was
    /// requested
    ///
    /// The ticket appears in the list before this returns, as soon as the
    /// submission starts.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Refused`] if the description is blank or another
    ///   submission is in progress; nothing is inserted
    /// - [`SessionError::Submission`] with [`SyncError::PersistFailure`] or
    ///   [`SyncError::TriggerFailure`] if the save or the trigger failed
    /// - [`SessionError::Store`] if the session is shutting down or the
    ///   outcome did not arrive within the submit timeout
    #[tracing::instrument(skip(self, description), name = "session_submit")]
    pub async fn submit(&self, description: &str) -> Result<TicketId, SessionError> {
        let Ok(_guard) = self.submitting.try_lock() else {
            return Err(SessionError::Refused("a submission is already in progress"));
        };

        if let Some(reason) = self
            .store
            .state(|s| validate_submission(&s.submission, description).err())
            .await
        {
            return Err(SessionError::Refused(reason));
        }

        metrics::counter!("session.submissions.total").increment(1);

        let submit = SubmissionAction::Submit {
            description: description.to_string(),
        };
        let outcome = self
            .store
            .send_and_wait_for(
                submit.into(),
                |action| matches!(action, DeskAction::Submission(s) if s.is_terminal()),
                self.config.submit_timeout,
            )
            .await?;

        match outcome {
            DeskAction::Submission(SubmissionAction::Failed { error, .. }) => {
                metrics::counter!("session.submission.failures", "kind" => error.kind())
                    .increment(1);
                Err(SessionError::Submission(error))
            },
            DeskAction::Submission(SubmissionAction::Completed { id }) => Ok(id),
            other => {
                tracing::error!(action = ?other, "Non-terminal action matched the submission outcome");
                Err(SessionError::Store(StoreError::ChannelClosed))
            },
        }
    }

    /// Replaces the form's draft text
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn set_draft(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.store
            .send(SubmissionAction::DraftChanged { text: text.into() }.into())
            .await?;
        Ok(())
    }

    /// Projects the current state for rendering
    pub async fn view(&self) -> DeskView {
        self.store.state(DeskView::project).await
    }

    /// Notifies on every state change
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.store.subscribe_changes()
    }

    /// The underlying store
    #[must_use]
    pub const fn store(&self) -> &DeskStore {
        &self.store
    }

    /// Releases the subscription, stops the forwarder and drains effects
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] with [`StoreError::ShutdownTimeout`] if
    /// a save or trigger call is still running when `timeout` elapses.
    #[tracing::instrument(skip(self), name = "session_shutdown")]
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), SessionError> {
        if let Some(handle) = self.subscription.take() {
            // No reduction runs while the read lock is held, so a forwarder
            // send either finished before this or sees the release
            let records = &self.records;
            self.store.state(|_| records.unsubscribe(&handle)).await;
        }

        if let Some(mut forwarder) = self.forwarder.take() {
            if tokio::time::timeout(timeout, &mut forwarder).await.is_err() {
                tracing::warn!("Update forwarder did not stop in time, aborting it");
                forwarder.abort();
            }
        }

        self.store.shutdown(timeout).await?;
        tracing::info!("Session stopped");
        Ok(())
    }
}

impl std::fmt::Debug for TicketSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketSession")
            .field("subscribed", &self.subscription.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Dispatches pushed rows until the subscription is released or ends
///
/// Nothing is reduced once `handle` is released, even if the stream still
/// yields an item it had buffered or a send was already waiting for the lock.
async fn forward_updates(
    store: DeskStore,
    mut updates: TicketUpdateStream,
    handle: SubscriptionHandle,
) {
    let released = handle.released();
    tokio::pin!(released);

    loop {
        let next = tokio::select! {
            biased;
            () = &mut released => break,
            next = updates.next() => next,
        };
        if handle.is_released() {
            break;
        }

        let (action, last) = match next {
            Some(Ok(ticket)) => {
                metrics::counter!("session.remote_updates.received").increment(1);
                tracing::debug!(ticket_id = %ticket.id, "Row update received");
                (TicketsAction::RemoteUpdated { ticket }, false)
            },
            Some(Err(error)) => {
                metrics::counter!("session.subscription.dropped").increment(1);
                (
                    TicketsAction::SubscriptionDropped {
                        error: SyncError::subscription(&error),
                    },
                    true,
                )
            },
            None => {
                metrics::counter!("session.subscription.dropped").increment(1);
                (
                    TicketsAction::SubscriptionDropped {
                        error: SyncError::subscription(&"update stream ended"),
                    },
                    true,
                )
            },
        };

        match store.send_if(action.into(), || !handle.is_released()).await {
            Ok(Some(_)) => {},
            Ok(None) => break,
            Err(error) => {
                tracing::debug!(%error, "Store rejected update, stopping forwarder");
                break;
            },
        }

        // Precision loss is irrelevant for a list length
        #[allow(clippy::cast_precision_loss)]
        let visible = store.state(|s| s.tickets.len()).await as f64;
        metrics::gauge!("session.tickets.visible").set(visible);

        if last {
            break;
        }
    }

    tracing::debug!("Update forwarder stopped");
}
