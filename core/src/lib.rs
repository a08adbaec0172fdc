//! # Seatbook Core
//!
//! Core traits and types for the seat booking client.
//!
//! Every piece of booking logic is written as a reducer: a function that takes the current
//! state and an action, mutates the state in place, and returns descriptions of the side
//! effects it wants performed. The runtime crate executes those descriptions and feeds the
//! resulting actions back in.
//!
//! ## Vocabulary
//!
//! - **State**: what a feature knows (for the client, one booking session plus the seat map)
//! - **Action**: everything that can happen to it: user intents, server answers, timer fires
//! - **Reducer**: `(&mut State, Action, &Environment) -> effects`, with no I/O of its own
//! - **Effect**: a value naming work for the runtime to do (call, wait, cancel)
//! - **Environment**: the reducer's collaborators behind traits (clock, jitter, remote API)
//!
//! ## Example
//!
//! ```
//! use seatbook_core::{effect::{Effect, EffectId}, reducer::Reducer, smallvec, SmallVec};
//! use std::time::Duration;
//!
//! const HOLD: EffectId = EffectId::new("hold");
//!
//! #[derive(Debug, Default)]
//! struct Hold {
//!     seat: Option<u32>,
//! }
//!
//! #[derive(Debug)]
//! enum HoldAction {
//!     Take(u32),
//!     Lapse,
//! }
//!
//! struct HoldReducer;
//!
//! impl Reducer for HoldReducer {
//!     type State = Hold;
//!     type Action = HoldAction;
//!     type Environment = Duration;
//!
//!     fn reduce(
//!         &self,
//!         hold: &mut Hold,
//!         action: HoldAction,
//!         ttl: &Duration,
//!     ) -> SmallVec<[Effect<HoldAction>; 4]> {
//!         match action {
//!             HoldAction::Take(seat) => {
//!                 hold.seat = Some(seat);
//!                 smallvec![Effect::delay(*ttl, HoldAction::Lapse).cancellable(HOLD)]
//!             },
//!             HoldAction::Lapse => {
//!                 hold.seat = None;
//!                 SmallVec::new()
//!             },
//!         }
//!     }
//! }
//!
//! let mut hold = Hold::default();
//! let effects = HoldReducer.reduce(&mut hold, HoldAction::Take(7), &Duration::from_secs(60));
//! assert_eq!(hold.seat, Some(7));
//! assert_eq!(effects.len(), 1);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// The [`Reducer`](reducer::Reducer) trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business logic of one feature
    ///
    /// A reducer owns every rule about how its state changes. It never performs I/O; it
    /// returns [`Effect`] values and the runtime performs them, feeding any resulting
    /// actions back through `reduce`.
    pub trait Reducer {
        /// State mutated in place
        type State;

        /// Inputs
        type Action;

        /// Collaborators available while reducing
        type Environment;

        /// Apply `action` to `state` and describe the follow-up work
        ///
        /// Actions that make no sense in the current state are ignored by returning no
        /// effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect descriptions returned by reducers
pub mod effect {
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier for a group of in-flight effects that can be cancelled together.
    ///
    /// Every effect started under [`Effect::Cancellable`] with a given id is torn down by a
    /// later [`Effect::Cancel`] carrying the same id.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EffectId(&'static str);

    impl EffectId {
        /// Create an effect id from a static name
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(name)
        }

        /// The id's name
        #[must_use]
        pub const fn name(&self) -> &'static str {
            self.0
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    /// Work a reducer asks the runtime to do
    ///
    /// A reducer with nothing to do returns an empty batch.
    pub enum Effect<Action> {
        /// Send `action` after `duration` (backoff, countdown ticks)
        Delay {
            /// Wait
            duration: Duration,
            /// Sent when the wait is over
            action: Box<Action>,
        },

        /// Async work whose `Some` result is sent back to the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Run an effect that can later be torn down with [`Effect::Cancel`]
        Cancellable {
            /// Group the effect is registered under
            id: EffectId,
            /// The effect to run
            effect: Box<Effect<Action>>,
        },

        /// Abort every in-flight effect registered under the id
        ///
        /// Cancellation happens before any effect listed after it in the same batch starts.
        Cancel(EffectId),
    }

    // Futures are opaque
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block producing an optional action
        #[must_use]
        pub fn future<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Dispatch `action` after `duration`
        #[must_use]
        pub fn delay(duration: Duration, action: Action) -> Effect<Action> {
            Effect::Delay {
                duration,
                action: Box::new(action),
            }
        }

        /// Register this effect under `id` so it can be cancelled later
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }

        /// The delayed action, if this is a (possibly cancellable) delay
        #[must_use]
        pub fn delayed_action(&self) -> Option<(Duration, &Action)> {
            match self {
                Effect::Delay { duration, action } => Some((*duration, action)),
                Effect::Cancellable { effect, .. } => effect.delayed_action(),
                _ => None,
            }
        }
    }
}

/// Time and randomness, injected so reducers stay deterministic under test
pub mod environment {
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    /// Wall clock
    ///
    /// # Examples
    ///
    /// ```
    /// use seatbook_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
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

    /// Source of random delay added on top of a deterministic backoff.
    ///
    /// Implementations must return a value in `[0, max)`, or zero when `max` is zero.
    pub trait Jitter: Send + Sync {
        /// Pick a jitter duration below `max`
        fn jitter(&self, max: Duration) -> Duration;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::effect::{Effect, EffectId};
    use std::time::Duration;

    const TICK: EffectId = EffectId::new("tick");

    #[test]
    fn test_cancellable_wraps_effect() {
        let effect = Effect::delay(Duration::from_secs(1), 7_u32).cancellable(TICK);

        match &effect {
            Effect::Cancellable { id, effect } => {
                assert_eq!(*id, TICK);
                assert!(matches!(**effect, Effect::Delay { .. }));
            },
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn test_delayed_action_sees_through_cancellable() {
        let effect = Effect::delay(Duration::from_millis(250), "poll").cancellable(TICK);
        let (duration, action) = effect.delayed_action().unwrap();

        assert_eq!(duration, Duration::from_millis(250));
        assert_eq!(*action, "poll");
        assert!(Effect::<&str>::Cancel(TICK).delayed_action().is_none());
    }

    #[test]
    fn test_debug_does_not_poll_futures() {
        let effect: Effect<u8> = Effect::future(async { Some(1) });
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
        assert_eq!(format!("{}", TICK), "tick");
    }
}
