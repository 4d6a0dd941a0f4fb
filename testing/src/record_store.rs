//! In-memory record store for fast, deterministic tests
//!
//! [`InMemoryRecordStore`] behaves like the Postgres adapter: rows are listed
//! newest first, every row mutation is pushed to open subscriptions, and
//! released subscriptions receive nothing. Failures and latency can be
//! injected per operation.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Mutex poisoning only follows a test panic

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support_copilot_core::records::{
    RecordStore, RecordStoreError, SubscriptionHandle, UpdateSubscription,
};
use support_copilot_core::ticket::{Classification, Ticket, TicketId};
use tokio::sync::mpsc;

type UpdateSender = mpsc::UnboundedSender<Result<Ticket, RecordStoreError>>;

#[derive(Default)]
struct Inner {
    rows: Vec<Ticket>,
    subscribers: Vec<(SubscriptionHandle, UpdateSender)>,
    list_failure: Option<RecordStoreError>,
    create_failure: Option<RecordStoreError>,
    subscribe_failure: Option<RecordStoreError>,
    mark_failure: Option<RecordStoreError>,
    list_delay: Option<Duration>,
    create_delay: Option<Duration>,
    create_calls: usize,
}

impl Inner {
    fn publish(&mut self, update: &Ticket) {
        self.subscribers
            .retain(|(handle, tx)| !handle.is_released() && tx.send(Ok(update.clone())).is_ok());
    }
}

/// In-memory record store
///
/// Clones share the same rows and subscribers.
///
/// # Example
///
/// ```
/// use support_copilot_testing::InMemoryRecordStore;
/// use support_copilot_core::records::RecordStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRecordStore::new();
/// assert!(store.list_all().await?.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRecordStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding these rows
    #[must_use]
    pub fn with_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let store = Self::new();
        store.inner.lock().unwrap().rows.extend(tickets);
        store
    }

    /// Make every `list_all` call fail with `error`
    pub fn fail_list_with(&self, error: RecordStoreError) {
        self.inner.lock().unwrap().list_failure = Some(error);
    }

    /// Make every `create` call fail with `error`
    pub fn fail_creates_with(&self, error: RecordStoreError) {
        self.inner.lock().unwrap().create_failure = Some(error);
    }

    /// Make every `subscribe_to_updates` call fail with `error`
    pub fn fail_subscribe_with(&self, error: RecordStoreError) {
        self.inner.lock().unwrap().subscribe_failure = Some(error);
    }

    /// Make every `mark_processed` call fail with `error`
    pub fn fail_mark_processed_with(&self, error: RecordStoreError) {
        self.inner.lock().unwrap().mark_failure = Some(error);
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.list_failure = None;
        inner.create_failure = None;
        inner.subscribe_failure = None;
        inner.mark_failure = None;
    }

    /// Delay every `list_all` call
    pub fn set_list_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().list_delay = Some(delay);
    }

    /// Delay every `create` call
    pub fn set_create_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().create_delay = Some(delay);
    }

    /// Push a row mutation to subscribers without touching the rows
    ///
    /// Simulates an update for a row this store never saw, e.g. one created
    /// by another client.
    pub fn push_update(&self, ticket: Ticket) {
        self.inner.lock().unwrap().publish(&ticket);
    }

    /// Fail every open subscription with `error` and close it
    pub fn disconnect_subscribers(&self, error: RecordStoreError) {
        let subscribers = std::mem::take(&mut self.inner.lock().unwrap().subscribers);
        for (_, tx) in subscribers {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// Number of subscriptions that are neither released nor closed
    #[must_use]
    pub fn active_subscribers(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .iter()
            .filter(|(handle, tx)| !handle.is_released() && !tx.is_closed())
            .count()
    }

    /// Stored rows, in insertion order
    #[must_use]
    pub fn rows(&self) -> Vec<Ticket> {
        self.inner.lock().unwrap().rows.clone()
    }

    /// Stored row by identifier
    #[must_use]
    pub fn get(&self, id: &TicketId) -> Option<Ticket> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|row| &row.id == id)
            .cloned()
    }

    /// Number of `create` calls, including failed ones
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("InMemoryRecordStore")
            .field("rows", &inner.rows.len())
            .field("subscribers", &inner.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn create(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RecordStoreError>> + Send + '_>> {
        Box::pin(async move {
            let delay = {
                let mut inner = self.inner.lock().unwrap();
                inner.create_calls += 1;
                inner.create_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.create_failure.clone() {
                return Err(error);
            }
            if inner.rows.iter().any(|row| row.id == ticket.id) {
                return Err(RecordStoreError::Query(format!(
                    "duplicate key value violates unique constraint: {}",
                    ticket.id
                )));
            }
            inner.rows.push(ticket);
            Ok(())
        })
    }

    fn list_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, RecordStoreError>> + Send + '_>> {
        Box::pin(async move {
            let delay = self.inner.lock().unwrap().list_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let inner = self.inner.lock().unwrap();
            if let Some(error) = inner.list_failure.clone() {
                return Err(error);
            }
            let mut rows = inner.rows.clone();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        })
    }

    fn subscribe_to_updates(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<UpdateSubscription, RecordStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.subscribe_failure.clone() {
                return Err(error);
            }

            let (tx, mut rx) = mpsc::unbounded_channel();
            let handle = SubscriptionHandle::new();
            inner.subscribers.push((handle.clone(), tx));

            let updates = async_stream::stream! {
                while let Some(update) = rx.recv().await {
                    let closing = update.is_err();
                    yield update;
                    if closing {
                        break;
                    }
                }
            };
            Ok(UpdateSubscription::new(updates, handle))
        })
    }

    fn mark_processed(
        &self,
        id: TicketId,
        classification: Classification,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, RecordStoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if let Some(error) = inner.mark_failure.clone() {
                return Err(error);
            }
            let Some(row) = inner.rows.iter_mut().find(|row| row.id == id) else {
                return Err(RecordStoreError::NotFound(id));
            };
            *row = row.clone().classified(classification);
            let updated = row.clone();
            inner.publish(&updated);
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{at, ticket};
    use futures::StreamExt;
    use support_copilot_core::ticket::{Category, Sentiment};

    const BILLING_NEGATIVE: Classification = Classification {
        category: Category::Billing,
        sentiment: Sentiment::Negative,
    };

    #[tokio::test]
    async fn lists_newest_first() {
        let store = InMemoryRecordStore::with_tickets([
            ticket("a", at("2024-01-01T00:00:00Z")),
            ticket("b", at("2024-02-01T00:00:00Z")),
        ]);

        let ids: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id.to_string())
            .collect();

        assert_eq!(ids, ["b", "a"]);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = InMemoryRecordStore::new();
        store.create(ticket("t1", at("2024-01-01T00:00:00Z"))).await.unwrap();

        let second = store.create(ticket("t1", at("2024-01-01T00:00:00Z"))).await;

        assert!(matches!(second, Err(RecordStoreError::Query(_))));
        assert_eq!(store.create_calls(), 2);
    }

    #[tokio::test]
    async fn mark_processed_pushes_update() {
        let store = InMemoryRecordStore::with_tickets([ticket("t1", at("2024-01-01T00:00:00Z"))]);
        let mut subscription = store.subscribe_to_updates().await.unwrap();

        store
            .mark_processed(TicketId::new("t1"), BILLING_NEGATIVE)
            .await
            .unwrap();

        let update = subscription.updates.next().await.unwrap().unwrap();
        assert!(update.processed);
        assert_eq!(update.category.as_deref(), Some("Billing"));
        assert!(store.get(&TicketId::new("t1")).unwrap().processed);
    }

    #[tokio::test]
    async fn mark_processed_unknown_ticket_is_not_found() {
        let store = InMemoryRecordStore::new();

        let result = store
            .mark_processed(TicketId::new("missing"), BILLING_NEGATIVE)
            .await;

        assert_eq!(result, Err(RecordStoreError::NotFound(TicketId::new("missing"))));
    }

    #[tokio::test]
    async fn released_subscriptions_receive_nothing() {
        let store = InMemoryRecordStore::new();
        let subscription = store.subscribe_to_updates().await.unwrap();
        assert_eq!(store.active_subscribers(), 1);

        store.unsubscribe(&subscription.handle);
        store.push_update(ticket("t1", at("2024-01-01T00:00:00Z")));

        assert_eq!(store.active_subscribers(), 0);
        let mut updates = subscription.updates;
        assert!(updates.next().await.is_none());
    }

    #[tokio::test]
    async fn disconnect_yields_error_then_ends() {
        let store = InMemoryRecordStore::new();
        let mut subscription = store.subscribe_to_updates().await.unwrap();

        store.disconnect_subscribers(RecordStoreError::SubscriptionClosed("reset".into()));

        assert!(matches!(
            subscription.updates.next().await,
            Some(Err(RecordStoreError::SubscriptionClosed(_)))
        ));
        assert!(subscription.updates.next().await.is_none());
    }
}
