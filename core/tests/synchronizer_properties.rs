//! Property tests for the ticket synchronizer.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use std::collections::HashSet;
use support_copilot_core::reducer::Reducer;
use support_copilot_core::ticket::Ticket;
use support_copilot_core::tickets::{TicketsAction, TicketsReducer, TicketsState};
use support_copilot_testing::properties::{arb_remote_row, arb_sync_action, arb_ticket};

fn apply_all(actions: Vec<TicketsAction>) -> TicketsState {
    let mut state = TicketsState::new();
    for action in actions {
        let _ = TicketsReducer::new().reduce(&mut state, action, &());
    }
    state
}

fn apply(state: &mut TicketsState, action: TicketsAction) {
    let effects = TicketsReducer::new().reduce(state, action, &());
    assert!(effects.is_empty());
}

proptest! {
    #[test]
    fn ids_stay_unique(actions in proptest::collection::vec(arb_sync_action(), 0..40)) {
        let mut state = TicketsState::new();
        for action in actions {
            apply(&mut state, action);
            let mut seen = HashSet::new();
            prop_assert!(state.tickets().all(|t| seen.insert(t.id.clone())));
        }
    }

    #[test]
    fn load_sorts_newest_first(tickets in proptest::collection::vec(arb_ticket(), 0..12)) {
        let mut state = TicketsState::new();
        apply(&mut state, TicketsAction::Loaded { tickets });

        let times: Vec<_> = state.tickets().map(|t| t.created_at).collect();
        prop_assert!(times.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn new_optimistic_insert_goes_first(
        history in proptest::collection::vec(arb_sync_action(), 0..20),
        fresh in arb_ticket(),
    ) {
        let mut state = apply_all(history);
        let mut fresh = fresh;
        fresh.id = support_copilot_core::ticket::TicketId::new("fresh");

        apply(&mut state, TicketsAction::InsertedOptimistically { ticket: fresh.clone() });

        prop_assert_eq!(&state.entries[0].ticket, &fresh);
    }

    #[test]
    fn update_for_unknown_id_changes_nothing(
        history in proptest::collection::vec(arb_sync_action(), 0..20),
        update in arb_remote_row(),
    ) {
        let mut state = apply_all(history);
        prop_assume!(!state.contains(&update.id));
        let before = state.clone();

        apply(&mut state, TicketsAction::RemoteUpdated { ticket: update });

        prop_assert_eq!(state, before);
    }

    #[test]
    fn update_touches_only_classification_fields(
        history in proptest::collection::vec(arb_sync_action(), 1..20),
        update in arb_remote_row(),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut state = apply_all(history);
        prop_assume!(!state.is_empty());
        let target: Ticket = state.entries[pick.index(state.len())].ticket.clone();
        let mut update = update;
        update.id = target.id.clone();
        let before_order: Vec<_> = state.tickets().map(|t| t.id.clone()).collect();

        apply(&mut state, TicketsAction::RemoteUpdated { ticket: update.clone() });

        let after = &state.get(&target.id).unwrap().ticket;
        prop_assert_eq!(&after.id, &target.id);
        prop_assert_eq!(&after.description, &target.description);
        prop_assert_eq!(after.created_at, target.created_at);
        prop_assert_eq!(&after.category, &update.category);
        prop_assert_eq!(after.sentiment, update.sentiment);
        prop_assert_eq!(after.processed, update.processed);

        let after_order: Vec<_> = state.tickets().map(|t| t.id.clone()).collect();
        prop_assert_eq!(after_order, before_order);
    }

    #[test]
    fn applying_an_update_twice_equals_once(
        history in proptest::collection::vec(arb_sync_action(), 0..20),
        update in arb_remote_row(),
    ) {
        let mut once = apply_all(history);
        apply(&mut once, TicketsAction::RemoteUpdated { ticket: update.clone() });
        let mut twice = once.clone();

        apply(&mut twice, TicketsAction::RemoteUpdated { ticket: update });

        prop_assert_eq!(twice, once);
    }
}
