//! # Seatbook Testing
//!
//! Testing utilities and helpers for the seatbook reducers.
//!
//! This crate provides:
//! - Deterministic implementations of environment traits (clocks, jitter)
//! - A Given-When-Then harness for reducers
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use seatbook_testing::ReducerTest;
//!
//! ReducerTest::new(BookingReducer::new())
//!     .with_env(test_environment())
//!     .given_state(BookingState::new())
//!     .when_action(BookingAction::ToggleSeat { seat_id: SeatId::new(1) })
//!     .then_state(|state| assert_eq!(state.seats.selected_ids().len(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use seatbook_core::environment::{Clock, Jitter};


pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Jitter, Utc};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use seatbook_testing::mocks::FixedClock;
    /// use seatbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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

    /// Clock that only moves when a test advances it
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the environment under test.
    ///
    /// ```
    /// use seatbook_testing::mocks::ManualClock;
    /// use seatbook_core::environment::Clock;
    /// use chrono::Utc;
    /// use std::time::Duration;
    ///
    /// let start = Utc::now();
    /// let clock = ManualClock::new(start);
    /// clock.advance(Duration::from_secs(5));
    /// assert_eq!((clock.now() - start).num_seconds(), 5);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock stopped at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Jitter source that always returns the same offset (clamped below the bound)
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FixedJitter(pub Duration);

    impl FixedJitter {
        /// No jitter at all
        #[must_use]
        pub const fn none() -> Self {
            Self(Duration::ZERO)
        }
    }

    impl Jitter for FixedJitter {
        fn jitter(&self, max: Duration) -> Duration {
            if max.is_zero() {
                Duration::ZERO
            } else if self.0 >= max {
                max - Duration::from_millis(1)
            } else {
                self.0
            }
        }
    }

    /// The instant every test clock starts from (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

pub use mocks::{epoch, FixedClock, FixedJitter, ManualClock};
