//! Ticket synchronizer.
//!
//! Owns the ordered, de-duplicated ticket list and merges three write paths
//! into it:
//!
//! - the one-shot bulk load ([`TicketsAction::Loaded`])
//! - optimistic inserts from the submission flow ([`TicketsAction::InsertedOptimistically`])
//! - classification updates from the push channel ([`TicketsAction::RemoteUpdated`])
//!
//! All of them go through [`TicketsReducer`], which the runtime executes under
//! a single write lock, so no two mutations interleave.
//!
//! # Invariants
//!
//! - At most one entry per [`TicketId`].
//! - After a load the list is sorted by `created_at`, newest first. Entries
//!   inserted optimistically afterwards sit at the front regardless of their
//!   timestamp.
//! - Remote updates never add or remove entries and never move them. They only
//!   change `category`, `sentiment` and `processed`.

use crate::effect::Effect;
use crate::error::SyncError;
use crate::reducer::Reducer;
use crate::ticket::{Ticket, TicketId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashSet;

/// Client-side delivery status of an entry
///
/// This is bookkeeping for the submission flow and never leaves the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// Inserted optimistically, create call still in flight
    Unconfirmed,
    /// Backed by a row in the record store
    Stored,
    /// The create call failed; there is no backing row
    SaveFailed,
    /// Stored, but the classification trigger failed
    TriggerFailed,
}

impl Delivery {
    /// Whether the submission that produced this entry failed
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::SaveFailed | Self::TriggerFailed)
    }
}

/// One ticket in the list, with its delivery status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEntry {
    /// The ticket as currently known
    pub ticket: Ticket,
    /// How far the ticket got through submission
    pub delivery: Delivery,
}

/// State of the push-update channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveStatus {
    /// Subscription requested, not yet open
    #[default]
    Connecting,
    /// Updates are flowing
    Live,
    /// The channel dropped; no reconnection is attempted
    Disconnected,
}

/// The synchronizer's state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketsState {
    /// Visible entries, front first
    pub entries: Vec<TicketEntry>,
    /// True until the bulk load completes or fails
    pub loading: bool,
    /// Push channel status
    pub live: LiveStatus,
    /// Most recent load or subscription failure
    pub last_error: Option<SyncError>,
}

impl Default for TicketsState {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            loading: true,
            live: LiveStatus::Connecting,
            last_error: None,
        }
    }
}

impl TicketsState {
    /// Creates the startup state: empty and loading
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by identifier
    #[must_use]
    pub fn get(&self, id: &TicketId) -> Option<&TicketEntry> {
        self.entries.iter().find(|entry| &entry.ticket.id == id)
    }

    /// Whether an entry with this identifier exists
    #[must_use]
    pub fn contains(&self, id: &TicketId) -> bool {
        self.get(id).is_some()
    }

    /// Tickets in display order
    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.entries.iter().map(|entry| &entry.ticket)
    }

    fn get_mut(&mut self, id: &TicketId) -> Option<&mut TicketEntry> {
        self.entries.iter_mut().find(|entry| &entry.ticket.id == id)
    }

    /// Replaces the list with the store's snapshot
    ///
    /// The snapshot is de-duplicated (first occurrence wins) and sorted newest
    /// first. Local entries the snapshot does not contain yet, whatever their
    /// delivery state, come from submissions that raced the load (a create may
    /// commit after the snapshot was read); they are kept at the front in
    /// their current order. When both sides know an id, the snapshot's fields win.
    pub fn load_initial(&mut self, tickets: Vec<Ticket>) {
        let mut seen = HashSet::with_capacity(tickets.len());
        let mut snapshot: Vec<Ticket> = tickets
            .into_iter()
            .filter(|ticket| seen.insert(ticket.id.clone()))
            .collect();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let previous = std::mem::take(&mut self.entries);
        let mut local_only = Vec::new();
        let mut trigger_failed = HashSet::new();
        for entry in previous {
            if !seen.contains(&entry.ticket.id) {
                local_only.push(entry);
            } else if entry.delivery == Delivery::TriggerFailed {
                trigger_failed.insert(entry.ticket.id);
            }
        }

        self.entries = local_only;
        self.entries.extend(snapshot.into_iter().map(|ticket| {
            let delivery = if trigger_failed.contains(&ticket.id) {
                Delivery::TriggerFailed
            } else {
                Delivery::Stored
            };
            TicketEntry { ticket, delivery }
        }));
        self.loading = false;
    }

    /// Records a failed bulk load: the list is kept and loading ends
    pub fn load_failed(&mut self, error: SyncError) {
        self.loading = false;
        self.last_error = Some(error);
    }

    /// Prepends a ticket that the store has not confirmed yet
    ///
    /// Returns `false` and leaves the list unchanged if the identifier is
    /// already present.
    pub fn insert_optimistic(&mut self, ticket: Ticket) -> bool {
        if self.contains(&ticket.id) {
            return false;
        }
        self.entries.insert(
            0,
            TicketEntry {
                ticket,
                delivery: Delivery::Unconfirmed,
            },
        );
        true
    }

    /// Merges a pushed row mutation into the matching entry, in place
    ///
    /// Returns `false` if no entry has this identifier. The update is then
    /// dropped: updates never create entries.
    pub fn apply_remote_update(&mut self, update: &Ticket) -> bool {
        let Some(entry) = self.get_mut(&update.id) else {
            return false;
        };
        entry.ticket.absorb_update(update);
        // A pushed row proves the row exists.
        if matches!(entry.delivery, Delivery::Unconfirmed | Delivery::SaveFailed) {
            entry.delivery = Delivery::Stored;
        }
        true
    }

    /// Marks an optimistic entry as persisted
    pub fn mark_confirmed(&mut self, id: &TicketId) -> bool {
        let Some(entry) = self.get_mut(id) else {
            return false;
        };
        if entry.delivery == Delivery::Unconfirmed {
            entry.delivery = Delivery::Stored;
        }
        true
    }

    /// Flags the entry of a failed submission, without removing it
    pub fn mark_failed(&mut self, id: &TicketId, error: &SyncError) -> bool {
        let Some(entry) = self.get_mut(id) else {
            return false;
        };
        match error {
            SyncError::PersistFailure(_) if entry.delivery == Delivery::Unconfirmed => {
                entry.delivery = Delivery::SaveFailed;
            },
            SyncError::TriggerFailure(_) if !entry.ticket.processed => {
                entry.delivery = Delivery::TriggerFailed;
            },
            _ => {},
        }
        true
    }
}

/// Inputs to the synchronizer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketsAction {
    /// The bulk read returned this snapshot
    Loaded {
        /// Every stored ticket
        tickets: Vec<Ticket>,
    },
    /// The bulk read failed
    LoadFailed {
        /// What went wrong
        error: SyncError,
    },
    /// A ticket was created locally and should show immediately
    InsertedOptimistically {
        /// The client-synthesized ticket
        ticket: Ticket,
    },
    /// The store accepted the create call for this ticket
    Confirmed {
        /// Persisted ticket
        id: TicketId,
    },
    /// A submission step failed for this ticket
    SubmissionFailed {
        /// Affected ticket
        id: TicketId,
        /// Failure kind
        error: SyncError,
    },
    /// The push channel delivered a row mutation
    RemoteUpdated {
        /// The row after mutation
        ticket: Ticket,
    },
    /// The push channel is open
    SubscriptionEstablished,
    /// The push channel closed or failed
    SubscriptionDropped {
        /// What went wrong
        error: SyncError,
    },
}

/// Reducer for the ticket list
///
/// Pure state transitions; it never produces effects.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketsReducer;

impl TicketsReducer {
    /// Creates a new `TicketsReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for TicketsReducer {
    type State = TicketsState;
    type Action = TicketsAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TicketsAction::Loaded { tickets } => {
                tracing::debug!(count = tickets.len(), "Initial ticket load completed");
                state.load_initial(tickets);
            },
            TicketsAction::LoadFailed { error } => {
                tracing::warn!(%error, "Initial ticket load failed, showing empty list");
                state.load_failed(error);
            },
            TicketsAction::InsertedOptimistically { ticket } => {
                let id = ticket.id.clone();
                if !state.insert_optimistic(ticket) {
                    tracing::warn!(ticket_id = %id, "Ignoring optimistic insert for an existing ticket");
                }
            },
            TicketsAction::Confirmed { id } => {
                if !state.mark_confirmed(&id) {
                    tracing::debug!(ticket_id = %id, "Confirmation for a ticket not in the list");
                }
            },
            TicketsAction::SubmissionFailed { id, error } => {
                if !state.mark_failed(&id, &error) {
                    tracing::debug!(ticket_id = %id, "Failure for a ticket not in the list");
                }
            },
            TicketsAction::RemoteUpdated { ticket } => {
                if state.apply_remote_update(&ticket) {
                    tracing::debug!(
                        ticket_id = %ticket.id,
                        processed = ticket.processed,
                        "Applied remote update"
                    );
                } else {
                    tracing::warn!(ticket_id = %ticket.id, "Dropping update for unknown ticket");
                }
            },
            TicketsAction::SubscriptionEstablished => {
                state.live = LiveStatus::Live;
            },
            TicketsAction::SubscriptionDropped { error } => {
                tracing::warn!(%error, "Update subscription dropped, not reconnecting");
                state.live = LiveStatus::Disconnected;
                state.last_error = Some(error);
            },
        }

        SmallVec::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ticket::{Category, Classification, Sentiment};
    use chrono::{DateTime, Utc};

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn ticket(id: &str, created_at: &str) -> Ticket {
        Ticket::new(TicketId::new(id), format!("ticket {id}"), at(created_at))
    }

    fn ids(state: &TicketsState) -> Vec<&str> {
        state.tickets().map(|t| t.id.as_str()).collect()
    }

    fn reduce(state: &mut TicketsState, action: TicketsAction) {
        let effects = TicketsReducer::new().reduce(state, action, &());
        assert!(effects.is_empty());
    }

    #[test]
    fn starts_loading_and_connecting() {
        let state = TicketsState::new();
        assert!(state.loading);
        assert!(state.is_empty());
        assert_eq!(state.live, LiveStatus::Connecting);
    }

    #[test]
    fn load_sorts_newest_first_and_clears_loading() {
        let mut state = TicketsState::new();

        reduce(
            &mut state,
            TicketsAction::Loaded {
                tickets: vec![
                    ticket("old", "2024-01-01T00:00:00Z"),
                    ticket("new", "2024-03-01T00:00:00Z"),
                    ticket("mid", "2024-02-01T00:00:00Z"),
                ],
            },
        );

        assert!(!state.loading);
        assert_eq!(ids(&state), ["new", "mid", "old"]);
        assert!(state.entries.iter().all(|e| e.delivery == Delivery::Stored));
    }

    #[test]
    fn load_deduplicates_snapshot() {
        let mut state = TicketsState::new();
        let mut duplicate = ticket("a", "2024-01-01T00:00:00Z");
        duplicate.description = "second copy".to_string();

        state.load_initial(vec![ticket("a", "2024-01-01T00:00:00Z"), duplicate]);

        assert_eq!(state.len(), 1);
        assert_eq!(state.entries[0].ticket.description, "ticket a");
    }

    #[test]
    fn load_keeps_unconfirmed_local_entries_at_front() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("local", "2020-01-01T00:00:00Z"));

        state.load_initial(vec![
            ticket("a", "2024-01-01T00:00:00Z"),
            ticket("b", "2024-02-01T00:00:00Z"),
        ]);

        assert_eq!(ids(&state), ["local", "b", "a"]);
        assert_eq!(state.entries[0].delivery, Delivery::Unconfirmed);
    }

    #[test]
    fn load_keeps_stored_entries_committed_after_the_snapshot() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("saved", "2024-05-01T00:00:00Z"));
        state.insert_optimistic(ticket("untriggered", "2024-05-02T00:00:00Z"));
        state.mark_confirmed(&TicketId::new("saved"));
        state.mark_confirmed(&TicketId::new("untriggered"));
        state.mark_failed(
            &TicketId::new("untriggered"),
            &SyncError::trigger(&"classifier down"),
        );

        // The snapshot was read before either create committed
        state.load_initial(vec![ticket("a", "2024-01-01T00:00:00Z")]);

        assert_eq!(ids(&state), ["untriggered", "saved", "a"]);
        assert_eq!(state.entries[0].delivery, Delivery::TriggerFailed);
        assert_eq!(state.entries[1].delivery, Delivery::Stored);
    }

    #[test]
    fn load_snapshot_wins_on_collision() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("t1", "2024-01-01T00:00:00Z"));
        let stored = ticket("t1", "2024-01-01T00:00:00Z").classified(Classification {
            category: Category::Technical,
            sentiment: Sentiment::Neutral,
        });

        state.load_initial(vec![stored]);

        assert_eq!(state.len(), 1);
        assert_eq!(state.entries[0].delivery, Delivery::Stored);
        assert!(state.entries[0].ticket.processed);
    }

    #[test]
    fn load_failure_keeps_list_and_ends_loading() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("t1", "2024-01-01T00:00:00Z"));

        reduce(
            &mut state,
            TicketsAction::LoadFailed {
                error: SyncError::load(&"timeout"),
            },
        );

        assert!(!state.loading);
        assert_eq!(ids(&state), ["t1"]);
        assert!(matches!(state.last_error, Some(SyncError::LoadFailure(_))));
    }

    #[test]
    fn optimistic_insert_goes_first_regardless_of_timestamp() {
        let mut state = TicketsState::new();
        state.load_initial(vec![ticket("future", "2099-01-01T00:00:00Z")]);

        reduce(
            &mut state,
            TicketsAction::InsertedOptimistically {
                ticket: ticket("now", "2024-01-01T00:00:00Z"),
            },
        );

        assert_eq!(ids(&state), ["now", "future"]);
        assert_eq!(state.entries[0].delivery, Delivery::Unconfirmed);
    }

    #[test]
    fn optimistic_insert_ignores_existing_id() {
        let mut state = TicketsState::new();
        state.load_initial(vec![ticket("t1", "2024-01-01T00:00:00Z")]);

        assert!(!state.insert_optimistic(ticket("t1", "2024-06-01T00:00:00Z")));
        assert_eq!(state.len(), 1);
        assert_eq!(state.entries[0].delivery, Delivery::Stored);
    }

    #[test]
    fn remote_update_mutates_in_place() {
        let mut state = TicketsState::new();
        state.load_initial(vec![
            ticket("a", "2024-03-01T00:00:00Z"),
            ticket("b", "2024-02-01T00:00:00Z"),
            ticket("c", "2024-01-01T00:00:00Z"),
        ]);
        let update = ticket("b", "2024-02-01T00:00:00Z").classified(Classification {
            category: Category::Billing,
            sentiment: Sentiment::Negative,
        });

        reduce(&mut state, TicketsAction::RemoteUpdated { ticket: update });

        assert_eq!(ids(&state), ["a", "b", "c"]);
        let b = &state.entries[1].ticket;
        assert!(b.processed);
        assert_eq!(b.category.as_deref(), Some("Billing"));
        assert_eq!(b.sentiment, Some(Sentiment::Negative));
    }

    #[test]
    fn remote_update_for_unknown_id_is_dropped() {
        let mut state = TicketsState::new();
        state.load_initial(vec![]);

        reduce(
            &mut state,
            TicketsAction::RemoteUpdated {
                ticket: ticket("t99", "2024-01-01T00:00:00Z"),
            },
        );

        assert!(state.is_empty());
    }

    #[test]
    fn remote_update_before_load_is_dropped() {
        let mut state = TicketsState::new();

        assert!(!state.apply_remote_update(&ticket("t1", "2024-01-01T00:00:00Z")));
        assert!(state.loading);
        assert!(state.is_empty());
    }

    #[test]
    fn remote_update_confirms_unconfirmed_entry() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("t1", "2024-01-01T00:00:00Z"));

        state.apply_remote_update(&ticket("t1", "2024-01-01T00:00:00Z"));

        assert_eq!(state.entries[0].delivery, Delivery::Stored);
    }

    #[test]
    fn failures_flag_entries_without_removing_them() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("save", "2024-01-01T00:00:00Z"));
        state.insert_optimistic(ticket("trigger", "2024-01-02T00:00:00Z"));
        state.mark_confirmed(&TicketId::new("trigger"));

        reduce(
            &mut state,
            TicketsAction::SubmissionFailed {
                id: TicketId::new("save"),
                error: SyncError::persist(&"db down"),
            },
        );
        reduce(
            &mut state,
            TicketsAction::SubmissionFailed {
                id: TicketId::new("trigger"),
                error: SyncError::trigger(&"502"),
            },
        );

        assert_eq!(state.len(), 2);
        assert_eq!(state.get(&TicketId::new("save")).unwrap().delivery, Delivery::SaveFailed);
        assert_eq!(
            state.get(&TicketId::new("trigger")).unwrap().delivery,
            Delivery::TriggerFailed
        );
    }

    #[test]
    fn load_preserves_trigger_failure_flag() {
        let mut state = TicketsState::new();
        state.insert_optimistic(ticket("t1", "2024-01-01T00:00:00Z"));
        state.mark_confirmed(&TicketId::new("t1"));
        state.mark_failed(&TicketId::new("t1"), &SyncError::trigger(&"down"));

        state.load_initial(vec![ticket("t1", "2024-01-01T00:00:00Z")]);

        assert_eq!(state.entries[0].delivery, Delivery::TriggerFailed);
    }

    #[test]
    fn subscription_status_transitions() {
        let mut state = TicketsState::new();

        reduce(&mut state, TicketsAction::SubscriptionEstablished);
        assert_eq!(state.live, LiveStatus::Live);

        reduce(
            &mut state,
            TicketsAction::SubscriptionDropped {
                error: SyncError::subscription(&"socket closed"),
            },
        );
        assert_eq!(state.live, LiveStatus::Disconnected);
        assert!(matches!(state.last_error, Some(SyncError::SubscriptionDrop(_))));
    }
}
