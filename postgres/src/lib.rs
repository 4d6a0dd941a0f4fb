//! `PostgreSQL` record store for the support desk.
//!
//! This crate implements the `RecordStore` trait from `support-copilot-core`
//! on top of a single `tickets` table:
//!
//! - Creation and newest-first listing through a connection pool
//! - Classification write-back with `UPDATE ... RETURNING`
//! - Push updates through `LISTEN ticket_updates`, fed by an `AFTER UPDATE`
//!   trigger installed by the bundled migrations
//!
//! # Example
//!
//! ```ignore
//! use support_copilot_postgres::PostgresRecordStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let records = PostgresRecordStore::connect("postgres://localhost/support", 5).await?;
//!     records.migrate().await?;
//!     let tickets = records.list_all().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use support_copilot_core::records::{
    RecordStore, RecordStoreError, SubscriptionHandle, UpdateSubscription,
};
use support_copilot_core::ticket::{Classification, Sentiment, Ticket, TicketId};

/// Channel the update trigger notifies on
pub const UPDATE_CHANNEL: &str = "ticket_updates";

const TICKET_COLUMNS: &str =
    "id::text AS id, created_at, description, category, sentiment, processed";

/// One row of the `tickets` table
#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    id: String,
    created_at: DateTime<Utc>,
    description: String,
    category: Option<String>,
    sentiment: Option<String>,
    processed: bool,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: TicketId::new(row.id),
            created_at: row.created_at,
            description: row.description,
            category: row.category,
            sentiment: row.sentiment.as_deref().map(Sentiment::from_label),
            processed: row.processed,
        }
    }
}

/// Maps a driver error onto the gateway's error kinds
fn map_sqlx(error: sqlx::Error) -> RecordStoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => RecordStoreError::Unavailable(error.to_string()),
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => {
            RecordStoreError::Decode(error.to_string())
        },
        _ => RecordStoreError::Query(error.to_string()),
    }
}

/// PostgreSQL-backed ticket store.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tickets (
///     id UUID PRIMARY KEY,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
///     description TEXT NOT NULL,
///     category TEXT,
///     sentiment TEXT,
///     processed BOOLEAN NOT NULL DEFAULT FALSE
/// );
/// ```
///
/// Ticket identifiers must be UUIDs.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Create a record store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::Unavailable`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, RecordStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| RecordStoreError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Create the `tickets` table and its update trigger if missing.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::Query`] if migration fails.
    pub async fn migrate(&self) -> Result<(), RecordStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RecordStoreError::Query(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fetch one ticket by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError::NotFound`] if no row has this identifier.
    pub async fn find(&self, id: &TicketId) -> Result<Ticket, RecordStoreError> {
        fetch_ticket(&self.pool, id).await
    }
}

async fn fetch_ticket(pool: &PgPool, id: &TicketId) -> Result<Ticket, RecordStoreError> {
    let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1::uuid");
    sqlx::query_as::<_, TicketRow>(&query)
        .bind(id.as_str())
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx)?
        .map(Ticket::from)
        .ok_or_else(|| RecordStoreError::NotFound(id.clone()))
}

impl RecordStore for PostgresRecordStore {
    fn create(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), RecordStoreError>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO tickets (id, created_at, description, category, sentiment, processed)
                 VALUES ($1::uuid, $2, $3, $4, $5, $6)",
            )
            .bind(ticket.id.as_str())
            .bind(ticket.created_at)
            .bind(&ticket.description)
            .bind(ticket.category.as_deref())
            .bind(ticket.sentiment.map(Sentiment::label))
            .bind(ticket.processed)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

            tracing::debug!(ticket_id = %ticket.id, "Ticket inserted");
            metrics::counter!("record_store.tickets.created").increment(1);
            Ok(())
        })
    }

    fn list_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Ticket>, RecordStoreError>> + Send + '_>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let query = format!("SELECT {TICKET_COLUMNS} FROM tickets ORDER BY created_at DESC");
            let rows = sqlx::query_as::<_, TicketRow>(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;

            metrics::histogram!("record_store.list.duration_seconds")
                .record(start.elapsed().as_secs_f64());
            tracing::debug!(count = rows.len(), "Tickets listed");
            Ok(rows.into_iter().map(Ticket::from).collect())
        })
    }

    fn subscribe_to_updates(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<UpdateSubscription, RecordStoreError>> + Send + '_>>
    {
        Box::pin(async move {
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| RecordStoreError::SubscriptionClosed(e.to_string()))?;
            listener
                .listen(UPDATE_CHANNEL)
                .await
                .map_err(|e| RecordStoreError::SubscriptionClosed(e.to_string()))?;
            tracing::info!(channel = UPDATE_CHANNEL, "Listening for ticket updates");

            let pool = self.pool.clone();
            let updates = async_stream::stream! {
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            metrics::counter!("record_store.notifications.received").increment(1);
                            let id = TicketId::new(notification.payload());
                            match fetch_ticket(&pool, &id).await {
                                Ok(ticket) => yield Ok(ticket),
                                // Deleted between the update and the re-read.
                                Err(RecordStoreError::NotFound(id)) => {
                                    tracing::debug!(ticket_id = %id, "Updated row no longer exists");
                                },
                                Err(error) => yield Err(error),
                            }
                        },
                        Err(error) => {
                            yield Err(RecordStoreError::SubscriptionClosed(error.to_string()));
                            break;
                        },
                    }
                }
            };

            Ok(UpdateSubscription::new(updates, SubscriptionHandle::new()))
        })
    }

    fn mark_processed(
        &self,
        id: TicketId,
        classification: Classification,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, RecordStoreError>> + Send + '_>> {
        Box::pin(async move {
            let query = format!(
                "UPDATE tickets SET category = $2, sentiment = $3, processed = TRUE
                 WHERE id = $1::uuid
                 RETURNING {TICKET_COLUMNS}"
            );
            let row = sqlx::query_as::<_, TicketRow>(&query)
                .bind(id.as_str())
                .bind(classification.category.label())
                .bind(classification.sentiment.label())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?
                .ok_or_else(|| RecordStoreError::NotFound(id.clone()))?;

            tracing::info!(
                ticket_id = %id,
                category = classification.category.label(),
                sentiment = classification.sentiment.label(),
                "Ticket classified"
            );
            Ok(row.into())
        })
    }
}
