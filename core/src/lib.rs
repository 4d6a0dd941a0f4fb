//! # Support Copilot Core
//!
//! The functional core of the support-ticket client.
//!
//! This crate keeps the ticket list consistent while three independent write
//! paths touch it: the initial bulk load, optimistic inserts made by the
//! submission flow, and classification updates pushed by the record store.
//!
//! ## Core Concepts
//!
//! - **State**: [`desk::DeskState`] combines the ticket list and the submission form
//! - **Action**: every write path is an action, dispatched through one mutation surface
//! - **Reducer**: pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: descriptions of I/O (store create/list, classification trigger)
//! - **Environment**: clock, identifier source, record store and trigger, injected
//!
//! ## Modules
//!
//! - [`ticket`]: the `Ticket` entity and its classification labels
//! - [`records`]: the record store gateway trait and its update subscription
//! - [`trigger`]: the classification trigger trait
//! - [`tickets`]: the ticket synchronizer
//! - [`submission`]: the submission orchestrator
//! - [`desk`]: the root reducer wiring the two together
//! - [`view`]: pure view projection
//!
//! ## Example
//!
//! ```ignore
//! use support_copilot_core::{desk::{DeskAction, DeskReducer, DeskState}, reducer::Reducer};
//!
//! let mut state = DeskState::default();
//! let effects = DeskReducer::new().reduce(&mut state, DeskAction::LoadTickets, &env);
//! // Effects are executed by the runtime Store.
//! ```

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Effect construction macros
pub mod effect_macros;

/// Error kinds surfaced to the user
pub mod error;

/// The ticket entity and classification labels
pub mod ticket;

/// Record store gateway
pub mod records;

/// Classification trigger
pub mod trigger;

/// Ticket synchronizer
pub mod tickets;

/// Submission orchestrator
pub mod submission;

/// Root reducer combining synchronizer and orchestrator
pub mod desk;

/// Renderable projections of state
pub mod view;

/// The reducer trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Applies one action to the state and describes the I/O it needs
    ///
    /// `reduce` must not block or perform I/O itself. Anything that talks to
    /// the record store or the classifier goes into the returned effects,
    /// which the runtime executes and whose resulting actions are reduced in
    /// turn.
    ///
    /// ```ignore
    /// impl Reducer for TicketsReducer {
    ///     type State = TicketsState;
    ///     type Action = TicketsAction;
    ///     type Environment = ();
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut TicketsState,
    ///         action: TicketsAction,
    ///         _env: &(),
    ///     ) -> SmallVec<[Effect<TicketsAction>; 4]> {
    ///         if let TicketsAction::Loaded { tickets } = action {
    ///             state.load_initial(tickets);
    ///         }
    ///         SmallVec::new()
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// State owned by the reducer
        type State;

        /// Inputs accepted by the reducer
        type Action;

        /// Injected collaborators (clock, ids, gateways)
        type Environment;

        /// Mutates `state` for `action` and returns the effects to run
        ///
        /// Most actions need no I/O, so up to four effects stay on the stack.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Deferred I/O returned by reducers
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// A unit of work for the runtime
    ///
    /// Building an effect does nothing. The runtime awaits `Future` effects
    /// and reduces the action they yield, if any.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Independent effects started together
        Parallel(Vec<Effect<Action>>),

        /// A gateway call; `Some(action)` is reduced when it finishes
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => f.write_str("Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Future(_) => f.write_str("Effect::Future(..)"),
            }
        }
    }

    impl<Action: Send + 'static> Effect<Action> {
        /// Groups effects to start together
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Rewraps the yielded action, for a parent reducer delegating to a child
        #[must_use]
        pub fn map<B, F>(self, f: F) -> Effect<B>
        where
            B: Send + 'static,
            F: Fn(Action) -> B + Clone + Send + Sync + 'static,
        {
            match self {
                Effect::None => Effect::None,
                Effect::Parallel(effects) => Effect::Parallel(
                    effects.into_iter().map(|e| e.map(f.clone())).collect(),
                ),
                Effect::Future(fut) => {
                    Effect::Future(Box::pin(async move { fut.await.map(f) }))
                },
            }
        }
    }
}

/// Time and identifier sources injected into reducers
pub mod environment {
    use crate::ticket::TicketId;
    use chrono::{DateTime, Utc};

    /// Stamps `created_at` on optimistic entries
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of fresh ticket identifiers
    ///
    /// Every call must return an identifier never returned before.
    pub trait IdGenerator: Send + Sync {
        /// Produce a new, unused ticket identifier
        fn next_id(&self) -> TicketId;
    }

    /// Identifier source producing random UUID v4 strings
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidIdGenerator;

    impl IdGenerator for UuidIdGenerator {
        fn next_id(&self) -> TicketId {
            TicketId::generate()
        }
    }
}
