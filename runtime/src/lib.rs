//! # Support Copilot Runtime
//!
//! Runtime for the support desk client.
//!
//! This crate provides the Store that serializes every write to the desk
//! state, executes the effects reducers return, and feeds the resulting
//! actions back in. On top of it, [`session::TicketSession`] owns the
//! lifetime of one client: the bulk load, the update subscription and the
//! submissions made by the user.
//!
//! ## Core Components
//!
//! - **Store**: manages state and executes effects
//! - **`TicketSession`**: wires the record store subscription into the Store
//!   and tears it down on shutdown
//! - **Metrics**: Prometheus exporter and metric descriptions
//!
//! ## Example
//!
//! ```ignore
//! use support_copilot_runtime::session::TicketSession;
//!
//! let session = TicketSession::start(environment).await?;
//! session.submit("My invoice is wrong").await?;
//! let view = session.view().await;
//! session.shutdown(Duration::from_secs(5)).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support_copilot_core::{effect::Effect, reducer::Reducer};
use tokio::sync::{RwLock, watch};

/// Prometheus metrics for observability
pub mod metrics;

/// Session lifecycle for one client
pub mod session;

/// Store errors
pub mod error {
    use thiserror::Error;

    /// Why a store call failed
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// [`Store::shutdown`](crate::Store::shutdown) was called; no more actions are reduced
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects were still running when the shutdown deadline passed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Nothing matching arrived before the deadline
        #[error("Timeout waiting for action")]
        Timeout,

        /// The feedback broadcast has no sender left
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Completion tracker for the effects one action started
///
/// Returned by [`Store::send()`]. Effects started later by feedback actions
/// are not counted.
///
/// ```ignore
/// let mut handle = store.send(DeskAction::LoadTickets).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // The list call returned and its outcome has been reduced.
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let tracking = EffectTracking::new();
        let handle = Self {
            effects: Arc::clone(&tracking.counter),
            completion: tracking.notifier.subscribe(),
        };
        (handle, tracking)
    }

    /// A handle with nothing to wait for
    #[must_use]
    pub fn completed() -> Self {
        Self::new().0
    }

    /// Effects of this action that have not finished
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Waits until every effect of this action has finished
    pub async fn wait(&mut self) {
        while self.pending() > 0 {
            // The sender lives in every tracker clone; once it is gone no
            // effect can still be running.
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// [`wait`](Self::wait), bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if effects are still running when
    /// `timeout` elapses. They keep running.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Running-effect counter that signals when it drops to zero
///
/// Used per action (behind [`EffectHandle`]) and once per store for
/// shutdown.
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn new() -> Self {
        let (notifier, _) = watch::channel(());
        Self {
            counter: Arc::new(AtomicUsize::new(0)),
            notifier: Arc::new(notifier),
        }
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Counts one more running effect until the guard drops
    fn start(&self) -> EffectGuard {
        self.counter.fetch_add(1, Ordering::SeqCst);
        EffectGuard(self.clone())
    }

    /// Waits until no effect is running
    async fn idle(&self) {
        // Subscribe before reading the count so a decrement in between is seen
        let mut changed = self.notifier.subscribe();
        while self.count() > 0 {
            if changed.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Ends one running effect on drop, including when the effect panics
struct EffectGuard(EffectTracking);

impl Drop for EffectGuard {
    fn drop(&mut self) {
        if self.0.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.notifier.send_replace(());
        }
    }
}

/// The state container and effect executor
pub mod store {
    use super::{Arc, Duration, Effect, EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError, watch};
    use std::sync::atomic::AtomicBool;
    use tokio::sync::broadcast;

    /// Owns the state, runs the reducer and executes effects
    ///
    /// Every mutation goes through [`send`](Self::send), which reduces under
    /// the write lock. Concurrent senders are serialized there, so the bulk
    /// load, optimistic inserts and remote updates never interleave inside a
    /// reduction. Actions returned by effects are sent back in the same way.
    ///
    /// Clones share state, environment and effect accounting.
    ///
    /// ```ignore
    /// let store = Store::new(DeskState::new(), DeskReducer::new(), environment);
    ///
    /// store.send(DeskAction::LoadTickets).await?;
    /// let count = store.state(|s| s.tickets.len()).await;
    /// ```
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        in_flight: EffectTracking,
        /// Actions produced by effects, after they were reduced
        feedback: broadcast::Sender<A>,
        /// Bumped after every reduction
        revision: Arc<watch::Sender<u64>>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Sync + Clone + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Creates a store whose feedback broadcast buffers 16 actions
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Creates a store with a custom feedback broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (feedback, _) = broadcast::channel(capacity);
            let (revision, _) = watch::channel(0);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                in_flight: EffectTracking::new(),
                feedback,
                revision: Arc::new(revision),
            }
        }

        /// Whether [`shutdown`](Self::shutdown) was called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Effects currently running, across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.in_flight.count()
        }

        /// Stops accepting actions and waits for running effects
        ///
        /// Actions produced by effects that finish after this call are
        /// dropped, not reduced.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects
        /// still running when `timeout` elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            metrics::counter!("store.shutdown.initiated").increment(1);
            self.shutdown.store(true, Ordering::Release);
            tracing::info!(pending_effects = self.pending_effects(), "Store shutting down");

            if tokio::time::timeout(timeout, self.in_flight.idle()).await.is_ok() {
                metrics::counter!("store.shutdown.completed").increment(1);
                tracing::info!("Store stopped");
                return Ok(());
            }

            let pending = self.pending_effects();
            metrics::counter!("store.shutdown.timeout").increment(1);
            tracing::error!(pending_effects = pending, "Shutdown timed out");
            Err(StoreError::ShutdownTimeout(pending))
        }

        /// Reduces `action` and starts its effects
        ///
        /// Returns once the effects are spawned, not when they finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        ///
        /// # Panics
        ///
        /// A panicking reducer panics the caller.
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            let handle = self.send_if(action, || true).await?;
            Ok(handle.unwrap_or_else(EffectHandle::completed))
        }

        /// Reduces `action` only if `admit` still holds once the write lock
        /// is taken
        ///
        /// Returns `Ok(None)` without touching the state when `admit` refuses.
        /// A condition flipped while holding [`state`](Self::state)'s read lock
        /// is therefore seen by every later reduction.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        ///
        /// # Panics
        ///
        /// A panicking reducer panics the caller.
        #[tracing::instrument(skip(self, action, admit), name = "store_send")]
        pub async fn send_if<F>(&self, action: A, admit: F) -> Result<Option<EffectHandle>, StoreError>
        where
            F: FnOnce() -> bool,
        {
            if self.is_shutting_down() {
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                tracing::warn!("Action rejected, store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                if !admit() {
                    tracing::trace!("Action no longer admitted, skipped");
                    return Ok(None);
                }
                metrics::counter!("store.actions.total").increment(1);

                let started = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut state, action, &self.environment);
                metrics::histogram!("store.reducer.duration_seconds")
                    .record(started.elapsed().as_secs_f64());

                // Still under the write lock, so revisions follow reduction order
                self.revision.send_modify(|revision| *revision += 1);
                effects
            };
            tracing::trace!(effects = effects.len(), "Reduced");

            let (handle, tracking) = EffectHandle::new();
            for effect in effects {
                self.execute_effect(effect, &tracking);
            }
            Ok(Some(handle))
        }

        /// Sends `action` and waits for the first feedback action matching
        /// `predicate`
        ///
        /// The returned action has already been reduced. Timing out does not
        /// cancel anything.
        ///
        /// # Errors
        ///
        /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
        /// - [`StoreError::Timeout`] if nothing matched within `timeout`
        /// - [`StoreError::ChannelClosed`] if the broadcast closed
        ///
        /// ```ignore
        /// let outcome = store.send_and_wait_for(
        ///     SubmissionAction::Submit { description }.into(),
        ///     |a| matches!(a, DeskAction::Submission(s) if s.is_terminal()),
        ///     Duration::from_secs(30),
        /// ).await?;
        /// ```
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            // Subscribe first: the outcome may be broadcast before send returns
            let mut feedback = self.feedback.subscribe();
            self.send(action).await?;

            let matching = async {
                loop {
                    match feedback.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Feedback observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            };
            tokio::time::timeout(timeout, matching)
                .await
                .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribes to feedback actions
        ///
        /// Actions passed to `send` directly are not broadcast. A slow receiver
        /// skips old actions and sees
        /// [`RecvError::Lagged`](broadcast::error::RecvError::Lagged).
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.feedback.subscribe()
        }

        /// Subscribes to the revision counter, bumped after every reduction
        #[must_use]
        pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
            self.revision.subscribe()
        }

        /// Reads the state through `f`
        ///
        /// ```ignore
        /// let busy = store.state(|s| s.submission.busy).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            f(&*self.state.read().await)
        }

        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                },
                Effect::Future(future) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guards = (tracking.start(), self.in_flight.start());
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        let Some(action) = future.await else {
                            return;
                        };

                        match store.send(action.clone()).await {
                            Ok(_) => {
                                // No subscriber is fine
                                let _ = store.feedback.send(action);
                            },
                            Err(error) => {
                                tracing::debug!(%error, "Dropped action produced by effect");
                            },
                        }
                    });
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                in_flight: self.in_flight.clone(),
                feedback: self.feedback.clone(),
                revision: Arc::clone(&self.revision),
            }
        }
    }
}

pub use store::Store;
