//! Payment readiness poller.
//!
//! After a reservation is created the payment backend creates the matching payment record on
//! its own schedule. Confirm and cancel fail until that record exists, so the client polls the
//! readiness check with linear backoff and jitter:
//!
//! ```text
//! attempt:  0      1            2            ...  9
//! wait:     0+j    1000ms+j     2000ms+j          9000ms+j     (j in [0, 500ms))
//! ```
//!
//! The poller is a bounded state machine (`Idle -> Polling -> Ready | TimedOut`). It never
//! sleeps itself: the coordinator schedules each attempt as a cancellable delay and reports
//! the result back, so attempt `i + 1` can only be scheduled once attempt `i` has resolved.

use crate::error::{ApiError, BookingError};
use crate::types::ReservationId;
use seatbook_core::environment::Jitter;
use std::time::Duration;

/// Backoff schedule for readiness checks.
///
/// # Default Values
///
/// - `max_attempts`: 10
/// - `step`: 1 second (added per attempt)
/// - `max_jitter`: 500ms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Linear backoff step
    pub step: Duration,
    /// Exclusive upper bound of the random delay added to every wait
    pub max_jitter: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            step: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl PollPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> PollPolicyBuilder {
        PollPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Deterministic part of the wait before `attempt`: `attempt * step`
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }

    /// Full wait before `attempt`, jitter included
    #[must_use]
    pub fn delay_before(&self, attempt: u32, jitter: &dyn Jitter) -> Duration {
        self.base_delay(attempt) + jitter.jitter(self.max_jitter)
    }
}

/// Builder for [`PollPolicy`].
#[derive(Debug, Clone)]
pub struct PollPolicyBuilder {
    policy: PollPolicy,
}

impl PollPolicyBuilder {
    /// Set the attempt budget.
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Set the linear backoff step.
    #[must_use]
    pub const fn step(mut self, step: Duration) -> Self {
        self.policy.step = step;
        self
    }

    /// Set the jitter bound.
    #[must_use]
    pub const fn max_jitter(mut self, max_jitter: Duration) -> Self {
        self.policy.max_jitter = max_jitter;
        self
    }

    /// Build the [`PollPolicy`].
    #[must_use]
    pub const fn build(self) -> PollPolicy {
        self.policy
    }
}

/// Proof that the payment record for a reservation exists.
///
/// Only the poller can create one, and payment confirm/cancel require one, so payment actions
/// cannot be issued before readiness is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyReservation {
    reservation_id: ReservationId,
}

impl ReadyReservation {
    /// The reservation whose payment is ready
    #[must_use]
    pub const fn reservation_id(&self) -> &ReservationId {
        &self.reservation_id
    }
}

/// Poller state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PollState {
    /// No reservation to poll for
    #[default]
    Idle,
    /// Waiting for the result of `attempt`
    Polling {
        /// Reservation being polled for
        reservation_id: ReservationId,
        /// Outstanding attempt, zero-based
        attempt: u32,
    },
    /// Payment record exists
    Ready(ReadyReservation),
    /// Attempt budget exhausted
    TimedOut {
        /// Reservation that never became ready
        reservation_id: ReservationId,
    },
}

/// What the coordinator must do after a poller transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStep {
    /// Schedule `attempt` after the policy's delay
    Schedule {
        /// Reservation to poll for
        reservation_id: ReservationId,
        /// Attempt to schedule
        attempt: u32,
    },
    /// Already polling or ready for this reservation; nothing to do
    Unchanged,
    /// Result did not match the outstanding attempt; dropped
    Stale,
    /// Payment is ready
    Ready,
    /// Budget exhausted; the session is over
    TimedOut(BookingError),
}

/// Bounded readiness state machine for one reservation at a time
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadinessPoller {
    state: PollState,
}

impl ReadinessPoller {
    /// Create an idle poller
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &PollState {
        &self.state
    }

    /// Start polling for a reservation
    ///
    /// Starting again for the reservation already being polled (or already ready) does
    /// nothing.
    pub fn start(&mut self, reservation_id: &ReservationId) -> PollStep {
        match &self.state {
            PollState::Polling {
                reservation_id: current,
                ..
            } if current == reservation_id => return PollStep::Unchanged,
            PollState::Ready(ready) if &ready.reservation_id == reservation_id => {
                return PollStep::Unchanged;
            },
            _ => {},
        }

        tracing::debug!(reservation_id = %reservation_id, "Polling for payment readiness");
        self.state = PollState::Polling {
            reservation_id: reservation_id.clone(),
            attempt: 0,
        };
        PollStep::Schedule {
            reservation_id: reservation_id.clone(),
            attempt: 0,
        }
    }

    /// Whether `attempt` for `reservation_id` is the one outstanding
    #[must_use]
    pub fn is_outstanding(&self, reservation_id: &ReservationId, attempt: u32) -> bool {
        matches!(
            &self.state,
            PollState::Polling { reservation_id: current, attempt: outstanding }
                if current == reservation_id && *outstanding == attempt
        )
    }

    /// Apply the result of a readiness check
    ///
    /// Transport failures count as "not ready yet". Results for anything other than the
    /// outstanding attempt are reported as [`PollStep::Stale`] and change nothing.
    pub fn on_result(
        &mut self,
        reservation_id: &ReservationId,
        attempt: u32,
        result: &Result<bool, ApiError>,
        policy: &PollPolicy,
    ) -> PollStep {
        if !self.is_outstanding(reservation_id, attempt) {
            tracing::debug!(
                reservation_id = %reservation_id,
                attempt,
                "Dropping stale readiness result"
            );
            return PollStep::Stale;
        }

        metrics::counter!("booking.poll.attempts").increment(1);

        match result {
            Ok(true) => {
                tracing::info!(reservation_id = %reservation_id, attempt, "Payment is ready");
                self.state = PollState::Ready(ReadyReservation {
                    reservation_id: reservation_id.clone(),
                });
                return PollStep::Ready;
            },
            Ok(false) => {
                tracing::debug!(reservation_id = %reservation_id, attempt, "Payment not ready yet");
            },
            Err(err) => {
                let error = BookingError::transient_poll(attempt, err);
                tracing::warn!(reservation_id = %reservation_id, %error, "Retrying readiness check");
                metrics::counter!("booking.poll.transient_errors").increment(1);
            },
        }

        let next = attempt + 1;
        if next >= policy.max_attempts {
            tracing::error!(
                reservation_id = %reservation_id,
                attempts = next,
                "Payment never became ready"
            );
            metrics::counter!("booking.poll.timeouts").increment(1);
            self.state = PollState::TimedOut {
                reservation_id: reservation_id.clone(),
            };
            return PollStep::TimedOut(BookingError::PollTimeout { attempts: next });
        }

        self.state = PollState::Polling {
            reservation_id: reservation_id.clone(),
            attempt: next,
        };
        PollStep::Schedule {
            reservation_id: reservation_id.clone(),
            attempt: next,
        }
    }

    /// Readiness token, if the payment for `reservation_id` is ready
    #[must_use]
    pub fn ready_for(&self, reservation_id: &ReservationId) -> Option<&ReadyReservation> {
        match &self.state {
            PollState::Ready(ready) if &ready.reservation_id == reservation_id => Some(ready),
            _ => None,
        }
    }

    /// Whether the poller has reached `Ready`
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, PollState::Ready(_))
    }

    /// Abandon polling; later results become stale
    pub fn stop(&mut self) {
        self.state = PollState::Idle;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use seatbook_testing::FixedJitter;

    fn id() -> ReservationId {
        ReservationId::new("R1")
    }

    #[test]
    fn test_delay_is_linear_plus_jitter() {
        let policy = PollPolicy::default();
        let jitter = FixedJitter(Duration::from_millis(250));

        assert_eq!(policy.delay_before(0, &jitter), Duration::from_millis(250));
        assert_eq!(policy.delay_before(1, &jitter), Duration::from_millis(1250));
        assert_eq!(policy.delay_before(9, &jitter), Duration::from_millis(9250));
    }

    #[test]
    fn test_builder() {
        let policy = PollPolicy::builder()
            .max_attempts(3)
            .step(Duration::from_millis(10))
            .max_jitter(Duration::ZERO)
            .build();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_before(2, &FixedJitter(Duration::from_millis(7))), Duration::from_millis(20));
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut poller = ReadinessPoller::new();

        assert_eq!(
            poller.start(&id()),
            PollStep::Schedule { reservation_id: id(), attempt: 0 }
        );
        assert_eq!(poller.start(&id()), PollStep::Unchanged);

        let policy = PollPolicy::default();
        poller.on_result(&id(), 0, &Ok(true), &policy);
        assert_eq!(poller.start(&id()), PollStep::Unchanged);
        assert!(poller.is_ready());
    }

    #[test]
    fn test_ready_on_third_attempt() {
        let mut poller = ReadinessPoller::new();
        let policy = PollPolicy::default();
        poller.start(&id());

        assert_eq!(
            poller.on_result(&id(), 0, &Ok(false), &policy),
            PollStep::Schedule { reservation_id: id(), attempt: 1 }
        );
        assert!(poller.ready_for(&id()).is_none());
        assert_eq!(
            poller.on_result(&id(), 1, &Err(ApiError::RequestFailed("reset".into())), &policy),
            PollStep::Schedule { reservation_id: id(), attempt: 2 }
        );
        assert_eq!(poller.on_result(&id(), 2, &Ok(true), &policy), PollStep::Ready);

        let ready = poller.ready_for(&id()).unwrap();
        assert_eq!(ready.reservation_id(), &id());
        assert!(poller.ready_for(&ReservationId::new("R2")).is_none());
    }

    #[test]
    fn test_times_out_after_budget() {
        let mut poller = ReadinessPoller::new();
        let policy = PollPolicy::default();
        poller.start(&id());

        for attempt in 0..9 {
            assert!(matches!(
                poller.on_result(&id(), attempt, &Ok(false), &policy),
                PollStep::Schedule { attempt: next, .. } if next == attempt + 1
            ));
        }

        assert_eq!(
            poller.on_result(&id(), 9, &Ok(false), &policy),
            PollStep::TimedOut(BookingError::PollTimeout { attempts: 10 })
        );
        assert_eq!(
            poller.state(),
            &PollState::TimedOut { reservation_id: id() }
        );
        // Nothing is outstanding any more
        assert_eq!(poller.on_result(&id(), 9, &Ok(true), &policy), PollStep::Stale);
    }

    #[test]
    fn test_stale_results_are_dropped() {
        let mut poller = ReadinessPoller::new();
        let policy = PollPolicy::default();
        poller.start(&id());

        assert_eq!(poller.on_result(&id(), 3, &Ok(true), &policy), PollStep::Stale);
        assert_eq!(
            poller.on_result(&ReservationId::new("R0"), 0, &Ok(true), &policy),
            PollStep::Stale
        );

        poller.stop();
        assert_eq!(poller.on_result(&id(), 0, &Ok(true), &policy), PollStep::Stale);
        assert_eq!(poller.state(), &PollState::Idle);
    }

    proptest! {
        #[test]
        fn prop_delay_stays_in_attempt_window(attempt in 0_u32..10, jitter_ms in 0_u64..2_000) {
            let policy = PollPolicy::default();
            let delay = policy.delay_before(attempt, &FixedJitter(Duration::from_millis(jitter_ms)));
            let base = Duration::from_millis(1000) * attempt;

            prop_assert!(delay >= base);
            prop_assert!(delay < base + Duration::from_millis(500));
        }
    }
}
