//! End-to-end reducer scenarios: load, optimistic insert, remote update,
//! failed load and refused submission.

#![allow(clippy::unwrap_used)]

use support_copilot_core::desk::{DeskAction, DeskReducer, DeskState};
use support_copilot_core::error::SyncError;
use support_copilot_core::records::RecordStoreError;
use support_copilot_core::submission::SubmissionAction;
use support_copilot_core::ticket::{Sentiment, Ticket, TicketId};
use support_copilot_core::tickets::{TicketsAction, TicketsReducer, TicketsState};
use support_copilot_core::view::{StatusBadge, TicketListView, Tone};
use support_copilot_testing::{
    InMemoryRecordStore, ReducerTest, ScriptedTrigger, assertions, at, run_effects,
    test_environment,
};

fn t1() -> Ticket {
    Ticket::new(TicketId::new("t1"), "help", at("2024-01-01T00:00:00Z"))
}

fn t1_classified() -> Ticket {
    Ticket {
        category: Some("Billing".to_string()),
        sentiment: Some(Sentiment::from_label("Negative")),
        processed: true,
        ..t1()
    }
}

#[test]
fn optimistic_insert_after_empty_load_shows_pending_card() {
    ReducerTest::new(TicketsReducer::new())
        .with_env(())
        .given_state(TicketsState::new())
        .given_actions([TicketsAction::Loaded { tickets: vec![] }])
        .when_action(TicketsAction::InsertedOptimistically { ticket: t1() })
        .then_state(|state| {
            assert_eq!(state.len(), 1);
            let view = TicketListView::project(state);
            let cards = view.cards();
            assert_eq!(cards.len(), 1);
            assert_eq!(cards[0].status.label(), "Pending");
            assert_eq!(cards[0].category, "Uncategorized");
            assert!(cards[0].sentiment.is_none());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn classification_update_mutates_the_card_in_place() {
    ReducerTest::new(TicketsReducer::new())
        .with_env(())
        .given_state(TicketsState::new())
        .given_actions([
            TicketsAction::Loaded { tickets: vec![] },
            TicketsAction::InsertedOptimistically { ticket: t1() },
        ])
        .when_action(TicketsAction::RemoteUpdated {
            ticket: t1_classified(),
        })
        .then_state(|state| {
            assert_eq!(state.len(), 1);
            let view = TicketListView::project(state);
            let card = &view.cards()[0];
            assert_eq!(card.status, StatusBadge::Processed);
            assert_eq!(card.category, "Billing");
            let tag = card.sentiment.as_ref().unwrap();
            assert_eq!(tag.label, "Negative");
            assert_eq!(tag.tone, Tone::Negative);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn update_for_never_inserted_ticket_is_ignored() {
    let mut stray = t1();
    stray.id = TicketId::new("t99");

    ReducerTest::new(TicketsReducer::new())
        .with_env(())
        .given_state(TicketsState::new())
        .given_actions([TicketsAction::Loaded { tickets: vec![] }])
        .when_action(TicketsAction::RemoteUpdated { ticket: stray })
        .then_state(|state| {
            assert_eq!(state.len(), 0);
            assert_eq!(TicketListView::project(state), TicketListView::Empty);
        })
        .run();
}

#[tokio::test]
async fn failed_load_shows_empty_state_not_skeletons() {
    let records = InMemoryRecordStore::new();
    records.fail_list_with(RecordStoreError::Unavailable("connection refused".into()));
    let env = test_environment(records, ScriptedTrigger::accepting());

    let effects = ReducerTest::new(DeskReducer::new())
        .with_env(env.clone())
        .given_state(DeskState::new())
        .when_action(DeskAction::LoadTickets)
        .then_state(|state| assert!(state.tickets.loading))
        .then_effects(|effects| assertions::assert_effects_count(effects, 1))
        .run_returning_effects();

    let actions = run_effects(effects).await;
    assert!(matches!(
        actions.as_slice(),
        [DeskAction::Tickets(TicketsAction::LoadFailed {
            error: SyncError::LoadFailure(_)
        })]
    ));

    ReducerTest::new(DeskReducer::new())
        .with_env(env)
        .given_state(DeskState::new())
        .when_action(actions.into_iter().next().unwrap())
        .then_state(|state| {
            assert!(!state.tickets.loading);
            assert!(state.tickets.is_empty());
            assert_eq!(TicketListView::project(&state.tickets), TicketListView::Empty);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn blank_submission_is_refused_before_any_insert() {
    let records = InMemoryRecordStore::new();
    let trigger = ScriptedTrigger::accepting();
    let env = test_environment(records.clone(), trigger.clone());
    let initial = DeskState::new();
    let expected = initial.clone();

    for description in ["", "   ", "\n\t "] {
        let expected = expected.clone();
        ReducerTest::new(DeskReducer::new())
            .with_env(env.clone())
            .given_state(initial.clone())
            .when_action(DeskAction::Submission(SubmissionAction::Submit {
                description: description.to_string(),
            }))
            .then_state(move |state| {
                assert_eq!(state, &expected);
                assert!(!state.submission.can_submit());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    assert_eq!(records.create_calls(), 0);
    assert_eq!(trigger.calls(), 0);
}
