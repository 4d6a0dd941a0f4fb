//! Record store gateway.
//!
//! The persistent store is an opaque collaborator: it can create a ticket,
//! list all tickets newest first, and push one event per row mutation to
//! subscribers. The classification service also writes results back through
//! it.
//!
//! # Subscriptions
//!
//! [`RecordStore::subscribe_to_updates`] returns an [`UpdateSubscription`]: a
//! stream of updated rows plus a [`SubscriptionHandle`]. Releasing the handle
//! ends the stream. Nothing is yielded after release, even if the adapter
//! still had rows buffered.
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let UpdateSubscription { mut updates, handle } = records.subscribe_to_updates().await?;
//! while let Some(update) = updates.next().await {
//!     store.send(TicketsAction::RemoteUpdated { ticket: update? }.into()).await?;
//! }
//! records.unsubscribe(&handle);
//! ```

use crate::ticket::{Classification, Ticket, TicketId};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Errors from record store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    /// The store could not be reached
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    /// A query or statement failed
    #[error("Query failed: {0}")]
    Query(String),

    /// No ticket with this identifier exists
    #[error("Ticket not found: {0}")]
    NotFound(TicketId),

    /// A row could not be decoded into a ticket
    #[error("Could not decode ticket row: {0}")]
    Decode(String),

    /// The update channel closed or failed
    #[error("Update subscription closed: {0}")]
    SubscriptionClosed(String),
}

/// Stream of updated ticket rows
pub type TicketUpdateStream = Pin<Box<dyn Stream<Item = Result<Ticket, RecordStoreError>> + Send>>;

/// Release token for an update subscription
///
/// Cloning shares the token: releasing any clone releases the subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    released: Arc<watch::Sender<bool>>,
}

impl SubscriptionHandle {
    /// Creates an unreleased handle
    #[must_use]
    pub fn new() -> Self {
        let (released, _) = watch::channel(false);
        Self {
            released: Arc::new(released),
        }
    }

    /// Releases the subscription. Idempotent.
    pub fn release(&self) {
        self.released.send_replace(true);
    }

    /// Whether the subscription has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Completes once the subscription is released
    ///
    /// The returned future owns its receiver and can outlive the handle.
    pub fn released(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.released.subscribe();
        async move {
            // A dropped sender also means nobody can deliver anymore.
            let _ = rx.wait_for(|released| *released).await;
        }
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// An open push-update channel
pub struct UpdateSubscription {
    /// Updated rows, in arrival order
    pub updates: TicketUpdateStream,
    /// Token that ends the stream when released
    pub handle: SubscriptionHandle,
}

impl UpdateSubscription {
    /// Wraps an adapter stream so that it ends as soon as `handle` is released
    pub fn new<S>(updates: S, handle: SubscriptionHandle) -> Self
    where
        S: Stream<Item = Result<Ticket, RecordStoreError>> + Send + 'static,
    {
        let updates = updates.take_until(handle.released()).boxed();
        Self { updates, handle }
    }
}

impl std::fmt::Debug for UpdateSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateSubscription")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Gateway to the persistent ticket store
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be shared as `Arc<dyn RecordStore>` and captured by effects.
pub trait RecordStore: Send + Sync {
    /// Persists a new ticket
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] if the row could not be written.
    fn create(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RecordStoreError>> + Send + '_>>;

    /// Lists every ticket, newest first
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] if the read failed.
    fn list_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, RecordStoreError>> + Send + '_>>;

    /// Opens a push-update channel delivering one event per row mutation
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::SubscriptionClosed`] if the channel could not
    /// be opened.
    fn subscribe_to_updates(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<UpdateSubscription, RecordStoreError>> + Send + '_>>;

    /// Releases a subscription obtained from [`subscribe_to_updates`](Self::subscribe_to_updates)
    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        handle.release();
    }

    /// Writes a classification back and returns the updated row
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::NotFound`] if no ticket has this identifier.
    fn mark_processed(
        &self,
        id: TicketId,
        classification: Classification,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, RecordStoreError>> + Send + '_>>;
}
