//! # Support Copilot Testing
//!
//! Testing utilities for the support desk client.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - An in-memory record store with failure injection
//! - A scripted classification trigger
//! - The Given-When-Then [`ReducerTest`] harness
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use support_copilot_testing::{test_environment, InMemoryRecordStore, ScriptedTrigger};
//! use support_copilot_runtime::Store;
//!
//! #[tokio::test]
//! async fn test_submission() {
//!     let records = InMemoryRecordStore::new();
//!     let env = test_environment(records.clone(), ScriptedTrigger::accepting());
//!     let store = Store::new(DeskState::new(), DeskReducer::new(), env);
//!
//!     store.send(SubmissionAction::Submit { description: "help".into() }.into()).await?;
//! }
//! ```

use chrono::{DateTime, Utc};
use support_copilot_core::environment::{Clock, IdGenerator};
use support_copilot_core::ticket::TicketId;


/// In-memory record store
pub mod record_store;

/// Scripted classification trigger
pub mod trigger;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, TicketId, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use support_copilot_testing::mocks::FixedClock;
    /// use support_copilot_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable identifiers: `t1`, `t2`, ...
    #[derive(Debug, Default)]
    pub struct SequentialIds {
        next: AtomicU64,
    }

    impl SequentialIds {
        /// Start at `t1`
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }
    }

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> TicketId {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            TicketId::new(format!("t{n}"))
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use super::mocks::{SequentialIds, test_clock};
    use super::{DateTime, TicketId, Utc};
    use crate::record_store::InMemoryRecordStore;
    use crate::trigger::ScriptedTrigger;
    use std::sync::Arc;
    use support_copilot_core::desk::DeskEnvironment;
    use support_copilot_core::ticket::Ticket;

    /// Parse an RFC 3339 timestamp
    ///
    /// # Panics
    ///
    /// Panics if `rfc3339` is not a valid timestamp.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .expect("test timestamp should parse")
            .with_timezone(&Utc)
    }

    /// An unprocessed ticket with a generated description
    #[must_use]
    pub fn ticket(id: &str, created_at: DateTime<Utc>) -> Ticket {
        Ticket::new(TicketId::new(id), format!("ticket {id}"), created_at)
    }

    /// Environment with a fixed clock, sequential ids and the given doubles
    #[must_use]
    pub fn test_environment(records: InMemoryRecordStore, trigger: ScriptedTrigger) -> DeskEnvironment {
        DeskEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIds::new()),
            Arc::new(records),
            Arc::new(trigger),
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use super::{DateTime, TicketId, Utc};
    use proptest::prelude::*;
    use support_copilot_core::ticket::{Category, Sentiment, Ticket};
    use support_copilot_core::tickets::TicketsAction;

    /// Identifiers from a small pool, so that collisions are common
    pub fn arb_ticket_id() -> impl Strategy<Value = TicketId> {
        (0u8..8).prop_map(|n| TicketId::new(format!("t{n}")))
    }

    /// Timestamps during 2024, second precision
    pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (1_704_067_200i64..1_735_689_600).prop_map(|secs| {
            DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }

    /// Any sentiment, including unknown labels
    pub fn arb_sentiment() -> impl Strategy<Value = Sentiment> {
        prop_oneof![
            Just(Sentiment::Positive),
            Just(Sentiment::Negative),
            Just(Sentiment::Neutral),
            Just(Sentiment::Unknown),
        ]
    }

    /// Any category label
    pub fn arb_category() -> impl Strategy<Value = String> {
        prop::sample::select(Category::ALL.to_vec()).prop_map(|c| c.label().to_string())
    }

    /// An unprocessed ticket
    pub fn arb_ticket() -> impl Strategy<Value = Ticket> {
        (arb_ticket_id(), arb_timestamp(), "[a-z ]{1,24}")
            .prop_map(|(id, created_at, description)| Ticket::new(id, description, created_at))
    }

    /// A row as pushed by the store: any classification state, and possibly
    /// a description or timestamp that differs from the local copy
    pub fn arb_remote_row() -> impl Strategy<Value = Ticket> {
        (
            arb_ticket(),
            proptest::option::of(arb_category()),
            proptest::option::of(arb_sentiment()),
            any::<bool>(),
        )
            .prop_map(|(mut ticket, category, sentiment, processed)| {
                ticket.category = category;
                ticket.sentiment = sentiment;
                ticket.processed = processed;
                ticket
            })
    }

    /// Any of the three synchronizer write paths
    pub fn arb_sync_action() -> impl Strategy<Value = TicketsAction> {
        prop_oneof![
            1 => proptest::collection::vec(arb_ticket(), 0..6)
                .prop_map(|tickets| TicketsAction::Loaded { tickets }),
            3 => arb_ticket().prop_map(|ticket| TicketsAction::InsertedOptimistically { ticket }),
            3 => arb_remote_row().prop_map(|ticket| TicketsAction::RemoteUpdated { ticket }),
        ]
    }
}

// Re-export commonly used items
pub use helpers::{at, test_environment, ticket};
pub use mocks::{FixedClock, SequentialIds, test_clock};
pub use record_store::InMemoryRecordStore;
pub use reducer_test::{ReducerTest, assertions, run_effects};
pub use trigger::ScriptedTrigger;
