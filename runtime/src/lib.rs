//! # Seatbook Runtime
//!
//! Executes reducers. A [`Store`] owns the state, applies one action at a time, and runs
//! the effects each reduction returns, sending any resulting actions back in.
//!
//! Effects wrapped in [`Effect::Cancellable`] are tracked by id so that a later
//! [`Effect::Cancel`] aborts them; the booking client uses this for the readiness poll
//! and the countdown timer.
//!
//! ```ignore
//! use seatbook_runtime::Store;
//!
//! let store = Store::new(BookingState::new(), BookingReducer::new(), environment);
//! store.send(BookingAction::LoadSeats).await?;
//! let seats = store.state(|s| s.seats.seats().len()).await;
//! ```

use seatbook_core::{
    effect::{Effect, EffectId},
    reducer::Reducer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

/// Production environment implementations backed by real randomness
pub mod environment;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Failures reported by [`Store`](crate::Store)
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// `send()` after `shutdown()` started
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Effects still running when the shutdown deadline passed
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// No matching action before the deadline
        #[error("Timeout waiting for action")]
        Timeout,

        /// The action broadcast is gone
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Counts one effect out of the shutdown tally when dropped
///
/// Runs on normal completion, on panic, and when the task is aborted.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-flight cancellable tasks, grouped by effect id
#[derive(Clone, Default)]
struct CancellationRegistry {
    tasks: Arc<Mutex<HashMap<EffectId, Vec<AbortHandle>>>>,
}

impl CancellationRegistry {
    fn register(&self, id: EffectId, handle: AbortHandle) {
        let Ok(mut tasks) = self.tasks.lock() else {
            tracing::error!(effect_id = %id, "Cancellation registry poisoned, aborting task");
            handle.abort();
            return;
        };
        let handles = tasks.entry(id).or_default();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn cancel(&self, id: EffectId) -> usize {
        let handles = match self.tasks.lock() {
            Ok(mut tasks) => tasks.remove(&id).unwrap_or_default(),
            Err(poisoned) => poisoned.into_inner().remove(&id).unwrap_or_default(),
        };
        let mut aborted = 0;
        for handle in handles {
            if !handle.is_finished() {
                handle.abort();
                aborted += 1;
            }
        }
        aborted
    }

    fn cancel_all(&self) -> usize {
        let drained: Vec<_> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain().flat_map(|(_, handles)| handles).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .drain()
                .flat_map(|(_, handles)| handles)
                .collect(),
        };
        let count = drained.len();
        for handle in drained {
            handle.abort();
        }
        count
    }

    fn in_flight(&self, id: EffectId) -> usize {
        self.tasks.lock().map_or(0, |tasks| {
            tasks
                .get(&id)
                .map_or(0, |handles| handles.iter().filter(|h| !h.is_finished()).count())
        })
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, CancellationRegistry, Duration, Effect, EffectId, Ordering,
        PendingGuard, Reducer, RwLock, StoreError,
    };
    use std::future::Future;
    use std::pin::Pin;
    use tokio::sync::broadcast;

    type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send>>;

    /// Owner of one reducer's state
    ///
    /// Every reduction runs under the state's write lock, so actions from the user, from
    /// timers and from finished requests are applied one at a time in arrival order.
    /// Cloning a store yields another handle to the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: CancellationRegistry,
        /// Every action, broadcast after the reducer has applied it.
        ///
        /// Observers (views, tests) can read the state on receipt and see the
        /// result of that action.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Send + Sync + Clone + std::fmt::Debug + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Store starting from `initial_state`
        ///
        /// The action broadcast buffers 64 actions; a slower subscriber sees `Lagged`.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (action_broadcast, _) = broadcast::channel(64);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: CancellationRegistry::default(),
                action_broadcast,
            }
        }

        /// Stop accepting actions, abort cancellable effects and wait for the rest
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            let aborted = self.cancellations.cancel_all();
            if aborted > 0 {
                tracing::debug!(aborted, "Aborted cancellable effects on shutdown");
            }

            let start = tokio::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Shutdown timeout: {} effects still running", pending
                    );
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Reduce `action`, publish it, then start its effects in order
        ///
        /// Returns once the effects are started. Cancellable effects are registered before
        /// the state lock is released, so a `Cancel` reduced by a concurrent `send` always
        /// finds them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!(?action, "Rejecting action, store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.received").increment(1);

            let mut state = self.state.write().await;
            let observed = action.clone();
            let effects = self.reducer.reduce(&mut state, action, &self.environment);
            let _ = self.action_broadcast.send(observed);
            for effect in effects {
                self.execute_effect(effect);
            }
            drop(state);

            Ok(())
        }

        /// Send `action` and return the first applied action matching `predicate`
        ///
        /// The subscription is taken before sending, so `action` itself can match.
        ///
        /// # Errors
        ///
        /// [`StoreError::Timeout`], [`StoreError::ChannelClosed`] or
        /// [`StoreError::ShutdownInProgress`].
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged, continuing");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to every action applied by the store
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Number of live tasks registered under a cancellation id
        #[must_use]
        pub fn in_flight(&self, id: EffectId) -> usize {
            self.cancellations.in_flight(id)
        }

        /// Start an effect. Runs synchronously up to the point of spawning, so a
        /// `Cancel` takes effect before any later effect in the same batch begins.
        fn execute_effect(&self, effect: Effect<A>) {
            match effect {
                Effect::Cancel(id) => self.cancel(id),
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable")
                        .increment(1);
                    let abort = self.spawn_tracked(self.clone().run(*effect));
                    self.cancellations.register(id, abort);
                },
                other => {
                    let _ = self.spawn_tracked(self.clone().run(other));
                },
            }
        }

        fn spawn_tracked(&self, run: BoxedRun) -> tokio::task::AbortHandle {
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let guard = PendingGuard(Arc::clone(&self.pending_effects));

            let task = tokio::spawn(async move {
                let _guard = guard;
                run.await;
            });
            task.abort_handle()
        }

        fn cancel(&self, id: EffectId) {
            let aborted = self.cancellations.cancel(id);
            tracing::debug!(effect_id = %id, aborted, "Cancelled effects");
            metrics::counter!("store.effects.cancelled", "id" => id.name()).increment(1);
        }

        /// Run an effect to completion inside the current task.
        fn run(self, effect: Effect<A>) -> BoxedRun {
            Box::pin(async move {
                match effect {
                    Effect::Future(fut) => {
                        metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            self.feedback(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay completed, sending action");
                        self.feedback(*action).await;
                    },
                    // nested: the inner id gets its own registration
                    Effect::Cancellable { id, effect } => {
                        let task = tokio::spawn(self.clone().run(*effect));
                        self.cancellations.register(id, task.abort_handle());
                        if let Err(error) = task.await {
                            if error.is_panic() {
                                tracing::error!(effect_id = %id, "Cancellable effect panicked");
                            }
                        }
                    },
                    Effect::Cancel(id) => self.cancel(id),
                }
            })
        }

        async fn feedback(&self, action: A) {
            if let Err(error) = self.send(action).await {
                tracing::debug!(error = %error, "Dropped action produced by effect");
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
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: self.cancellations.clone(),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;
