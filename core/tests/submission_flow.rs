//! Submission orchestration driven step by step through the desk reducer.

#![allow(clippy::unwrap_used)]

use support_copilot_core::desk::{DeskAction, DeskEnvironment, DeskReducer, DeskState};
use support_copilot_core::error::SyncError;
use support_copilot_core::records::RecordStoreError;
use support_copilot_core::reducer::Reducer;
use support_copilot_core::submission::SubmissionAction;
use support_copilot_core::ticket::TicketId;
use support_copilot_core::tickets::{Delivery, TicketsAction};
use support_copilot_core::trigger::TriggerError;
use support_copilot_core::view::{FormView, StatusBadge, TicketListView};
use support_copilot_testing::{
    InMemoryRecordStore, ScriptedTrigger, at, run_effects, test_clock, test_environment, ticket,
};

/// Reduce one action and run its effects, returning the follow-up actions
async fn step(state: &mut DeskState, action: DeskAction, env: &DeskEnvironment) -> Vec<DeskAction> {
    let effects = DeskReducer::new().reduce(state, action, env);
    run_effects(effects).await
}

/// Reduce an action and every action its effects produce, to quiescence
async fn settle(state: &mut DeskState, action: DeskAction, env: &DeskEnvironment) {
    let mut queue = vec![action];
    while let Some(next) = queue.pop() {
        queue.extend(step(state, next, env).await);
    }
}

fn submit(description: &str) -> DeskAction {
    SubmissionAction::Submit {
        description: description.to_string(),
    }
    .into()
}

fn loaded_state() -> DeskState {
    let mut state = DeskState::new();
    state.tickets.load_initial(vec![]);
    state
}

#[tokio::test]
async fn optimistic_entry_is_visible_before_persistence() {
    let records = InMemoryRecordStore::new();
    let env = test_environment(records.clone(), ScriptedTrigger::accepting());
    let mut state = loaded_state();

    let effects = DeskReducer::new().reduce(&mut state, submit("  printer on fire  "), &env);

    assert_eq!(effects.len(), 1);
    assert!(state.submission.busy);
    assert_eq!(records.create_calls(), 0);
    let entry = &state.tickets.entries[0];
    assert_eq!(entry.ticket.id, TicketId::new("t1"));
    assert_eq!(entry.ticket.description, "printer on fire");
    assert_eq!(entry.ticket.created_at, test_clock_now());
    assert_eq!(entry.delivery, Delivery::Unconfirmed);
    assert!(!entry.ticket.processed);
    assert!(entry.ticket.category.is_none());
    assert!(entry.ticket.sentiment.is_none());
}

fn test_clock_now() -> chrono::DateTime<chrono::Utc> {
    use support_copilot_core::environment::Clock;
    test_clock().now()
}

#[tokio::test]
async fn successful_submission_persists_then_triggers() {
    let records = InMemoryRecordStore::new();
    let trigger = ScriptedTrigger::accepting();
    let env = test_environment(records.clone(), trigger.clone());
    let mut state = loaded_state();
    state.submission.draft = "help".to_string();

    let after_submit = step(&mut state, submit("help"), &env).await;
    assert_eq!(
        after_submit,
        vec![DeskAction::Submission(SubmissionAction::Saved {
            id: TicketId::new("t1"),
            description: "help".to_string(),
        })]
    );
    assert_eq!(records.rows().len(), 1);
    assert!(!records.rows()[0].processed);
    assert_eq!(trigger.calls(), 0);

    let after_save = step(&mut state, after_submit.into_iter().next().unwrap(), &env).await;
    assert_eq!(state.tickets.entries[0].delivery, Delivery::Stored);
    assert!(state.submission.busy);
    assert_eq!(trigger.jobs()[0].ticket_id, TicketId::new("t1"));
    assert_eq!(trigger.jobs()[0].description, "help");

    for action in after_save {
        let _ = step(&mut state, action, &env).await;
    }
    assert!(!state.submission.busy);
    assert!(state.submission.error.is_none());
    assert!(state.submission.draft.is_empty());
    assert_eq!(state.tickets.len(), 1);
}

#[tokio::test]
async fn persist_failure_keeps_flagged_entry_and_skips_trigger() {
    let records = InMemoryRecordStore::new();
    records.fail_creates_with(RecordStoreError::Unavailable("db down".into()));
    let trigger = ScriptedTrigger::accepting();
    let env = test_environment(records.clone(), trigger.clone());
    let mut state = loaded_state();
    state.submission.draft = "help".to_string();

    settle(&mut state, submit("help"), &env).await;

    assert!(!state.submission.busy);
    assert_eq!(state.submission.draft, "help");
    assert_eq!(
        state.submission.error,
        Some(SyncError::PersistFailure("Record store unavailable: db down".into()))
    );
    assert_eq!(
        FormView::project(&state.submission).error.as_deref(),
        Some("Could not save ticket: Record store unavailable: db down")
    );
    assert_eq!(state.tickets.len(), 1);
    assert_eq!(state.tickets.entries[0].delivery, Delivery::SaveFailed);
    assert_eq!(trigger.calls(), 0);
    assert!(records.rows().is_empty());
}

#[tokio::test]
async fn trigger_failure_reports_body_and_leaves_stored_ticket() {
    let records = InMemoryRecordStore::new();
    let trigger = ScriptedTrigger::failing(TriggerError::Rejected {
        status: 500,
        body: "workflow crashed".into(),
    });
    let env = test_environment(records.clone(), trigger);
    let mut state = loaded_state();

    settle(&mut state, submit("help"), &env).await;

    let error = state.submission.error.clone().unwrap();
    assert!(matches!(error, SyncError::TriggerFailure(_)));
    let message = error.to_string();
    assert!(message.starts_with("Could not trigger processing"));
    assert!(message.contains("workflow crashed"));
    assert_eq!(records.rows().len(), 1);

    let view = TicketListView::project(&state.tickets);
    assert_eq!(view.cards()[0].status, StatusBadge::FailedToSubmit);
}

#[tokio::test]
async fn resubmitting_after_failure_creates_a_new_ticket() {
    let records = InMemoryRecordStore::new();
    records.fail_creates_with(RecordStoreError::Unavailable("db down".into()));
    let env = test_environment(records.clone(), ScriptedTrigger::accepting());
    let mut state = loaded_state();

    settle(&mut state, submit("help"), &env).await;
    records.clear_failures();
    settle(&mut state, submit("help"), &env).await;

    let ids: Vec<_> = state.tickets.tickets().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, ["t2", "t1"]);
    assert_eq!(state.tickets.entries[0].delivery, Delivery::Stored);
    assert_eq!(state.tickets.entries[1].delivery, Delivery::SaveFailed);
    assert!(state.submission.error.is_none());
}

#[tokio::test]
async fn busy_form_refuses_a_second_submission() {
    let env = test_environment(InMemoryRecordStore::new(), ScriptedTrigger::accepting());
    let mut state = loaded_state();

    let first = DeskReducer::new().reduce(&mut state, submit("first"), &env);
    let second = DeskReducer::new().reduce(&mut state, submit("second"), &env);

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(state.tickets.len(), 1);
}

#[tokio::test]
async fn draft_is_frozen_while_submitting_and_cleared_on_success() {
    let env = test_environment(InMemoryRecordStore::new(), ScriptedTrigger::accepting());
    let mut state = loaded_state();
    let reducer = DeskReducer::new();
    let draft = |text: &str| -> DeskAction {
        SubmissionAction::DraftChanged {
            text: text.to_string(),
        }
        .into()
    };

    reducer.reduce(&mut state, draft("first ticket"), &env);
    let create = reducer.reduce(&mut state, submit("first ticket"), &env);
    let edit = reducer.reduce(&mut state, draft("second ticket"), &env);

    assert!(edit.is_empty());
    assert_eq!(state.submission.draft, "first ticket");

    let mut outcome = run_effects(create).await;
    while let Some(next) = outcome.pop() {
        outcome.extend(step(&mut state, next, &env).await);
    }

    assert!(!state.submission.busy);
    assert!(state.submission.draft.is_empty());
    reducer.reduce(&mut state, draft("second ticket"), &env);
    assert_eq!(state.submission.draft, "second ticket");
}

#[tokio::test]
async fn load_returns_snapshot_newest_first() {
    let records = InMemoryRecordStore::with_tickets([
        ticket("a", at("2024-01-01T00:00:00Z")),
        ticket("b", at("2024-02-01T00:00:00Z")),
    ]);
    let env = test_environment(records, ScriptedTrigger::accepting());
    let mut state = DeskState::new();

    settle(&mut state, DeskAction::LoadTickets, &env).await;

    assert!(!state.tickets.loading);
    let ids: Vec<_> = state.tickets.tickets().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, ["b", "a"]);
}

#[tokio::test]
async fn submission_racing_the_load_survives_it() {
    let env = test_environment(
        InMemoryRecordStore::with_tickets([ticket("old", at("2023-01-01T00:00:00Z"))]),
        ScriptedTrigger::accepting(),
    );
    let mut state = DeskState::new();

    // The load is requested first but its snapshot arrives after the insert.
    let load = step(&mut state, DeskAction::LoadTickets, &env).await;
    let _ = DeskReducer::new().reduce(&mut state, submit("help"), &env);
    for action in load {
        assert!(matches!(action, DeskAction::Tickets(TicketsAction::Loaded { .. })));
        let _ = step(&mut state, action, &env).await;
    }

    let ids: Vec<_> = state.tickets.tickets().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, ["t1", "old"]);
}
