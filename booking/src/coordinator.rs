//! Booking coordinator: the reducer that sequences a booking session.
//!
//! ```text
//!              submit (create ok)                 confirm ok / countdown 0 / poll timeout
//!   Booking ─────────────────────────▶ Payment ───────────────────────────────────────▶ reset
//!      ▲                                  │
//!      └──────────── cancel ok ───────────┘
//! ```
//!
//! All session state lives in [`BookingState`]. Timers (poll backoff, countdown tick) are
//! cancellable delays registered under [`POLL`] and [`COUNTDOWN`]; every way out of a
//! session cancels both. Results that arrive for a superseded session, reservation or poll
//! attempt are dropped.

use crate::api::BookingApi;
use crate::config::SessionConfig;
use crate::error::{ApiError, BookingError};
use crate::payment::{PaymentManager, PaymentOp, PaymentRequest};
use crate::poller::{PollStep, ReadinessPoller};
use crate::reservation::{ReservationManager, SubmitOutcome};
use crate::seats::SeatRegistry;
use crate::types::{Payment, Reservation, ReservationId, Seat, SeatId};
use chrono::{DateTime, Utc};
use seatbook_core::effect::{Effect, EffectId};
use seatbook_core::environment::{Clock, Jitter, SystemClock};
use seatbook_core::reducer::Reducer;
use seatbook_runtime::environment::RandomJitter;
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Effect group of the readiness poll (backoff timers and in-flight checks)
pub const POLL: EffectId = EffectId::new("readiness_poll");

/// Effect group of the reservation countdown tick
pub const COUNTDOWN: EffectId = EffectId::new("reservation_countdown");

const TICK: Duration = Duration::from_secs(1);

/// Whole seconds left before a reservation created at `created_at` expires
///
/// Never negative and never more than `ttl`, even if the server's clock runs ahead.
#[must_use]
pub fn countdown(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> u64 {
    let elapsed_ms = (now - created_at).num_milliseconds().max(0);
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let remaining_ms = ttl_ms.saturating_sub(elapsed_ms);
    u64::try_from(remaining_ms).unwrap_or(0) / 1000
}

// ============================================================================
// State
// ============================================================================

/// Message shown after a session ends on its own
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Confirm succeeded
    PaymentCompleted,
    /// Countdown reached zero
    ReservationExpired,
    /// Payment never became ready
    PollTimedOut,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentCompleted => write!(f, "Payment completed! Redirecting to home"),
            Self::ReservationExpired => write!(f, "Reservation expired"),
            Self::PollTimedOut => write!(f, "TIMEOUT"),
        }
    }
}

/// Booking screen state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingScreen {
    /// Last validation or reservation error
    pub error: Option<BookingError>,
}

/// Payment screen state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentScreen {
    /// Reservation being paid for
    pub reservation_id: ReservationId,
    /// Last payment error
    pub error: Option<BookingError>,
}

/// The screen the view renders
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// Seat selection and identity form
    Booking(BookingScreen),
    /// Waiting for readiness, then countdown and confirm/cancel
    Payment(PaymentScreen),
}

impl Default for Screen {
    fn default() -> Self {
        Self::Booking(BookingScreen::default())
    }
}

/// One booking attempt, from the first seat pick to paid, cancelled or expired
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    /// Session number; results tagged with an older number are dropped
    pub id: u64,
    /// Current screen
    pub screen: Screen,
    /// Name field
    pub name: String,
    /// Email field
    pub email: String,
    /// Held reservation
    pub reservations: ReservationManager,
    /// Payment readiness
    pub poller: ReadinessPoller,
    /// Confirm/cancel calls
    pub payment: PaymentManager,
}

impl Session {
    /// Start a fresh session
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Everything the booking client knows
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingState {
    /// Seat snapshot and selection; survives session resets (selection does not)
    pub seats: SeatRegistry,
    /// Current session
    pub session: Session,
    /// Message from the last session that ended on its own
    pub notice: Option<Notice>,
}

impl BookingState {
    /// Create the initial state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Everything that can happen to a booking session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    // Seats
    /// Fetch the current seat snapshot
    LoadSeats,
    /// Seat query answered
    SeatsLoaded {
        /// Snapshot or error
        result: Result<Vec<Seat>, ApiError>,
    },
    /// Push channel delivered a snapshot
    SeatsReplaced {
        /// Full snapshot
        seats: Vec<Seat>,
    },
    /// User clicked a seat
    ToggleSeat {
        /// Seat clicked
        seat_id: SeatId,
    },

    // Booking form
    /// User edited the name field
    SetName {
        /// New value
        name: String,
    },
    /// User edited the email field
    SetEmail {
        /// New value
        email: String,
    },
    /// User pressed "Continue to Payment"
    Submit,
    /// Reservation create answered
    ReservationCreated {
        /// Session the request belonged to
        session: u64,
        /// Reservation or error
        result: Result<Reservation, ApiError>,
    },

    // Readiness poll
    /// Backoff elapsed; run the readiness check
    PollAttempt {
        /// Reservation polled for
        reservation_id: ReservationId,
        /// Attempt number, zero-based
        attempt: u32,
    },
    /// Readiness check answered
    PollResult {
        /// Reservation polled for
        reservation_id: ReservationId,
        /// Attempt number, zero-based
        attempt: u32,
        /// Whether the payment exists, or the transport error
        result: Result<bool, ApiError>,
    },

    // Countdown
    /// One second passed on the payment screen
    Tick {
        /// Session the timer belongs to
        session: u64,
    },

    // Payment
    /// User pressed "Confirm"
    Confirm,
    /// User pressed "Cancel"
    Cancel {
        /// Reason sent to the payment backend
        reason: String,
    },
    /// Confirm answered
    PaymentConfirmed {
        /// Reservation paid for
        reservation_id: ReservationId,
        /// Payment or error
        result: Result<Payment, ApiError>,
    },
    /// Cancel answered
    PaymentCancelled {
        /// Reservation released
        reservation_id: ReservationId,
        /// Payment or error
        result: Result<Payment, ApiError>,
    },

    // Session
    /// Abandon the session and start over
    Restart,
    /// User acknowledged the notice
    DismissNotice,
}

impl BookingAction {
    /// Cancel with the default reason
    #[must_use]
    pub fn cancel() -> Self {
        Self::Cancel {
            reason: crate::payment::DEFAULT_CANCEL_REASON.to_string(),
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the booking reducer
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Wall clock for the countdown
    pub clock: Arc<dyn Clock>,
    /// Random part of the poll backoff
    pub jitter: Arc<dyn Jitter>,
    /// Booking and payment backends
    pub api: Arc<dyn BookingApi>,
    /// Reservation window and poll schedule
    pub session: SessionConfig,
}

impl BookingEnvironment {
    /// Production environment: system clock, random jitter
    #[must_use]
    pub fn new(api: Arc<dyn BookingApi>, session: SessionConfig) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            jitter: Arc::new(RandomJitter),
            api,
            session,
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the jitter source
    #[must_use]
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the booking session
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

type Effects = SmallVec<[Effect<BookingAction>; 4]>;

impl BookingReducer {
    /// Create a new booking reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load_seats(env: &BookingEnvironment) -> Effect<BookingAction> {
        let seats = env.api.seats();
        Effect::future(async move {
            Some(BookingAction::SeatsLoaded {
                result: seats.await,
            })
        })
    }

    fn schedule_poll(
        env: &BookingEnvironment,
        reservation_id: ReservationId,
        attempt: u32,
    ) -> Effect<BookingAction> {
        let delay = env
            .session
            .poll
            .delay_before(attempt, env.jitter.as_ref());
        tracing::debug!(
            reservation_id = %reservation_id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduling readiness check"
        );
        Effect::delay(delay, BookingAction::PollAttempt {
            reservation_id,
            attempt,
        })
        .cancellable(POLL)
    }

    fn schedule_tick(session: u64) -> Effect<BookingAction> {
        Effect::delay(TICK, BookingAction::Tick { session }).cancellable(COUNTDOWN)
    }

    /// Show the payment screen for the held reservation, start polling and the countdown
    fn enter_payment(state: &mut BookingState, env: &BookingEnvironment) -> Effects {
        let session = &mut state.session;
        let Some(held) = session.reservations.held() else {
            return SmallVec::new();
        };
        let reservation_id = held.reservation.id.clone();

        session.screen = Screen::Payment(PaymentScreen {
            reservation_id: reservation_id.clone(),
            error: None,
        });

        let mut effects: Effects = smallvec![
            Effect::Cancel(COUNTDOWN),
            Self::schedule_tick(session.id),
        ];
        if let PollStep::Schedule {
            reservation_id,
            attempt,
        } = session.poller.start(&reservation_id)
        {
            effects.push(Self::schedule_poll(env, reservation_id, attempt));
        }
        effects
    }

    /// End the session: fresh state, timers torn down, seats refetched
    fn reset(state: &mut BookingState, env: &BookingEnvironment, notice: Option<Notice>) -> Effects {
        let next = state.session.id + 1;
        tracing::info!(
            session = state.session.id,
            next,
            notice = ?notice,
            "Resetting booking session"
        );
        state.session = Session::new(next);
        state.seats.clear_selection();
        state.notice = notice;

        smallvec![
            Effect::Cancel(POLL),
            Effect::Cancel(COUNTDOWN),
            Self::load_seats(env),
        ]
    }

    fn payment_screen(state: &mut BookingState) -> Option<&mut PaymentScreen> {
        match &mut state.session.screen {
            Screen::Payment(screen) => Some(screen),
            Screen::Booking(_) => None,
        }
    }

    /// Issue a confirm or cancel if the payment is ready and nothing is in flight
    fn start_payment(
        state: &mut BookingState,
        env: &BookingEnvironment,
        op: PaymentOp,
        reason: &str,
    ) -> Effects {
        let session = &mut state.session;
        let Screen::Payment(screen) = &mut session.screen else {
            return SmallVec::new();
        };
        let Some(ready) = session.poller.ready_for(&screen.reservation_id) else {
            tracing::debug!(?op, "Payment not ready, ignoring");
            return SmallVec::new();
        };
        let request = match op {
            PaymentOp::Confirm => session.payment.confirm(ready),
            PaymentOp::Cancel => session.payment.cancel(ready, reason),
        };
        let Some(request) = request else {
            return SmallVec::new();
        };
        screen.error = None;

        let effect = match request {
            PaymentRequest::Confirm { reservation_id } => {
                let call = env.api.confirm_payment(reservation_id.clone());
                Effect::future(async move {
                    Some(BookingAction::PaymentConfirmed {
                        reservation_id,
                        result: call.await,
                    })
                })
            },
            PaymentRequest::Cancel {
                reservation_id,
                reason,
            } => {
                let call = env.api.cancel_payment(reservation_id.clone(), reason);
                Effect::future(async move {
                    Some(BookingAction::PaymentCancelled {
                        reservation_id,
                        result: call.await,
                    })
                })
            },
        };
        smallvec![effect]
    }

    /// Whether a payment answer belongs to the current session's outstanding call
    fn is_current_payment(state: &BookingState, reservation_id: &ReservationId, op: PaymentOp) -> bool {
        let session = &state.session;
        session.payment.pending() == Some(op)
            && session
                .reservations
                .held()
                .is_some_and(|held| &held.reservation.id == reservation_id)
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Seats ==========
            BookingAction::LoadSeats => smallvec![Self::load_seats(env)],

            BookingAction::SeatsLoaded { result } => {
                match result {
                    Ok(seats) => {
                        state.seats.replace_all(seats);
                    },
                    Err(e) => tracing::warn!(error = %e, "Seat query failed"),
                }
                SmallVec::new()
            },

            BookingAction::SeatsReplaced { seats } => {
                state.seats.replace_all(seats);
                SmallVec::new()
            },

            BookingAction::ToggleSeat { seat_id } => {
                if matches!(state.session.screen, Screen::Booking(_)) {
                    state.seats.toggle_selection(seat_id);
                }
                SmallVec::new()
            },

            // ========== Booking form ==========
            BookingAction::SetName { name } => {
                state.session.name = name;
                SmallVec::new()
            },

            BookingAction::SetEmail { email } => {
                state.session.email = email;
                SmallVec::new()
            },

            BookingAction::Submit => {
                let Screen::Booking(_) = state.session.screen else {
                    return SmallVec::new();
                };
                let session = &mut state.session;
                let outcome = session.reservations.submit(
                    &session.name,
                    &session.email,
                    state.seats.selected_ids(),
                );

                match outcome {
                    Err(error) => {
                        tracing::debug!(%error, "Booking form rejected");
                        session.screen = Screen::Booking(BookingScreen { error: Some(error) });
                        SmallVec::new()
                    },
                    Ok(SubmitOutcome::InFlight) => SmallVec::new(),
                    Ok(SubmitOutcome::Reuse(reservation_id)) => {
                        tracing::debug!(reservation_id = %reservation_id, "Reusing held reservation");
                        Self::enter_payment(state, env)
                    },
                    Ok(SubmitOutcome::Create(request)) => {
                        session.screen = Screen::Booking(BookingScreen::default());
                        let session_id = session.id;
                        let call = env.api.create_reservation(request);
                        smallvec![Effect::future(async move {
                            Some(BookingAction::ReservationCreated {
                                session: session_id,
                                result: call.await,
                            })
                        })]
                    },
                }
            },

            BookingAction::ReservationCreated { session, result } => {
                if session != state.session.id {
                    tracing::debug!(session, "Dropping reservation result from an old session");
                    return SmallVec::new();
                }

                match result {
                    Ok(reservation) => {
                        if state.session.reservations.created(reservation).is_none() {
                            return SmallVec::new();
                        }
                        state.seats.clear_selection();
                        Self::enter_payment(state, env)
                    },
                    Err(e) => {
                        let error = state.session.reservations.create_failed(&e);
                        state.session.screen = Screen::Booking(BookingScreen { error: Some(error) });
                        SmallVec::new()
                    },
                }
            },

            // ========== Readiness poll ==========
            BookingAction::PollAttempt {
                reservation_id,
                attempt,
            } => {
                if !state.session.poller.is_outstanding(&reservation_id, attempt) {
                    return SmallVec::new();
                }
                let check = env.api.check_payment(reservation_id.clone());
                smallvec![Effect::future(async move {
                    Some(BookingAction::PollResult {
                        reservation_id,
                        attempt,
                        result: check.await,
                    })
                })
                .cancellable(POLL)]
            },

            BookingAction::PollResult {
                reservation_id,
                attempt,
                result,
            } => {
                let step = state.session.poller.on_result(
                    &reservation_id,
                    attempt,
                    &result,
                    &env.session.poll,
                );
                match step {
                    PollStep::Schedule {
                        reservation_id,
                        attempt,
                    } => smallvec![Self::schedule_poll(env, reservation_id, attempt)],
                    PollStep::TimedOut(_) => Self::reset(state, env, Some(Notice::PollTimedOut)),
                    PollStep::Ready | PollStep::Stale | PollStep::Unchanged => SmallVec::new(),
                }
            },

            // ========== Countdown ==========
            BookingAction::Tick { session } => {
                if session != state.session.id {
                    return SmallVec::new();
                }
                let Some(held) = state.session.reservations.held() else {
                    return SmallVec::new();
                };
                if !matches!(state.session.screen, Screen::Payment(_)) {
                    return SmallVec::new();
                }

                let remaining = countdown(
                    held.reservation.created_at,
                    env.clock.now(),
                    env.session.reservation_ttl,
                );
                if remaining == 0 {
                    tracing::info!(
                        reservation_id = %held.reservation.id,
                        "Reservation expired before payment"
                    );
                    return Self::reset(state, env, Some(Notice::ReservationExpired));
                }
                smallvec![Self::schedule_tick(session)]
            },

            // ========== Payment ==========
            BookingAction::Confirm => Self::start_payment(state, env, PaymentOp::Confirm, ""),

            BookingAction::Cancel { reason } => {
                Self::start_payment(state, env, PaymentOp::Cancel, &reason)
            },

            BookingAction::PaymentConfirmed {
                reservation_id,
                result,
            } => {
                if !Self::is_current_payment(state, &reservation_id, PaymentOp::Confirm) {
                    return SmallVec::new();
                }
                match state.session.payment.finish(result).map(|_| ()) {
                    Ok(()) => {
                        state.session.reservations.mark_paid();
                        Self::reset(state, env, Some(Notice::PaymentCompleted))
                    },
                    Err(error) => {
                        if let Some(screen) = Self::payment_screen(state) {
                            screen.error = Some(error);
                        }
                        SmallVec::new()
                    },
                }
            },

            BookingAction::PaymentCancelled {
                reservation_id,
                result,
            } => {
                if !Self::is_current_payment(state, &reservation_id, PaymentOp::Cancel) {
                    return SmallVec::new();
                }
                match state.session.payment.finish(result).map(|_| ()) {
                    Ok(()) => {
                        let session = &mut state.session;
                        session.reservations.clear();
                        session.payment.clear();
                        session.poller.stop();
                        session.screen = Screen::default();
                        state.seats.clear_selection();
                        tracing::info!(reservation_id = %reservation_id, "Reservation cancelled");
                        smallvec![Effect::Cancel(POLL), Effect::Cancel(COUNTDOWN)]
                    },
                    Err(error) => {
                        if let Some(screen) = Self::payment_screen(state) {
                            screen.error = Some(error);
                        }
                        SmallVec::new()
                    },
                }
            },

            // ========== Session ==========
            BookingAction::Restart => Self::reset(state, env, None),

            BookingAction::DismissNotice => {
                state.notice = None;
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::api::MockBookingApi;
    use crate::error::ValidationError;
    use crate::poller::PollState;
    use crate::types::{ReservationStatus, SeatStatus};
    use proptest::prelude::*;
    use seatbook_testing::{assertions, epoch, FixedJitter, ManualClock, ReducerTest};

    fn env_with(clock: ManualClock) -> BookingEnvironment {
        BookingEnvironment::new(Arc::new(MockBookingApi::new()), SessionConfig::default())
            .with_clock(Arc::new(clock))
            .with_jitter(Arc::new(FixedJitter(Duration::from_millis(100))))
    }

    fn env() -> BookingEnvironment {
        env_with(ManualClock::new(epoch()))
    }

    fn reservation(id: &str) -> Reservation {
        Reservation {
            id: ReservationId::new(id),
            name: "Ana".into(),
            email: "a@x.com".into(),
            price: "80".into(),
            status: ReservationStatus::Pending,
            reason: None,
            created_at: epoch(),
            updated_at: epoch(),
        }
    }

    fn seats() -> Vec<Seat> {
        vec![
            Seat::new(1, "A1", SeatStatus::Cancelled),
            Seat::new(2, "A2", SeatStatus::Cancelled),
            Seat::new(3, "A3", SeatStatus::Reserved),
        ]
    }

    fn filled_form() -> Vec<BookingAction> {
        vec![
            BookingAction::SeatsReplaced { seats: seats() },
            BookingAction::SetName { name: "Ana".into() },
            BookingAction::SetEmail { email: "a@x.com".into() },
            BookingAction::ToggleSeat { seat_id: SeatId::new(1) },
            BookingAction::ToggleSeat { seat_id: SeatId::new(2) },
        ]
    }

    fn on_payment_screen() -> Vec<BookingAction> {
        let mut actions = filled_form();
        actions.push(BookingAction::Submit);
        actions.push(BookingAction::ReservationCreated {
            session: 0,
            result: Ok(reservation("R1")),
        });
        actions
    }

    fn payment_ready() -> Vec<BookingAction> {
        let mut actions = on_payment_screen();
        actions.push(BookingAction::PollResult {
            reservation_id: ReservationId::new("R1"),
            attempt: 0,
            result: Ok(true),
        });
        actions
    }

    fn booking_error(state: &BookingState) -> Option<BookingError> {
        match &state.session.screen {
            Screen::Booking(screen) => screen.error.clone(),
            Screen::Payment(_) => panic!("expected booking screen"),
        }
    }

    fn payment_error(state: &BookingState) -> Option<BookingError> {
        match &state.session.screen {
            Screen::Payment(screen) => screen.error.clone(),
            Screen::Booking(_) => panic!("expected payment screen"),
        }
    }

    #[test]
    fn test_countdown_bounds() {
        let ttl = Duration::from_secs(60);
        let t = epoch();

        assert_eq!(countdown(t, t, ttl), 60);
        assert_eq!(countdown(t, t + chrono::Duration::milliseconds(500), ttl), 59);
        assert_eq!(countdown(t, t + chrono::Duration::seconds(60), ttl), 0);
        assert_eq!(countdown(t, t + chrono::Duration::hours(1), ttl), 0);
        assert_eq!(countdown(t, t - chrono::Duration::seconds(5), ttl), 60);
    }

    proptest! {
        #[test]
        fn prop_countdown_never_exceeds_ttl(offset_ms in -120_000_i64..120_000, ttl_secs in 1_u64..600) {
            let t = epoch();
            let ttl = Duration::from_secs(ttl_secs);
            let remaining = countdown(t, t + chrono::Duration::milliseconds(offset_ms), ttl);

            prop_assert!(remaining <= ttl_secs);
            if offset_ms >= 0 {
                let elapsed_secs = u64::try_from(offset_ms).unwrap() / 1000;
                prop_assert!(remaining <= ttl_secs.saturating_sub(elapsed_secs));
            }
        }
    }

    #[test]
    fn test_submit_reports_first_missing_field() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(vec![BookingAction::SeatsReplaced { seats: seats() }])
            .when_action(BookingAction::Submit)
            .then_state(|state| {
                assert_eq!(
                    booking_error(state),
                    Some(BookingError::Validation(ValidationError::MissingName))
                );
                assert!(!state.session.reservations.is_creating());
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(vec![
                BookingAction::SetName { name: "Ana".into() },
                BookingAction::SetEmail { email: "a@x.com".into() },
            ])
            .when_action(BookingAction::Submit)
            .then_state(|state| {
                assert_eq!(
                    booking_error(state),
                    Some(BookingError::Validation(ValidationError::MissingSeats))
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_submit_creates_once() {
        let mut actions = filled_form();
        actions.push(BookingAction::Submit);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::Submit)
            .then_state(|state| assert!(state.session.reservations.is_creating()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_reservation_created_enters_payment() {
        let mut actions = filled_form();
        actions.push(BookingAction::Submit);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::ReservationCreated {
                session: 0,
                result: Ok(reservation("R1")),
            })
            .then_state(|state| {
                assert!(matches!(state.session.screen, Screen::Payment(_)));
                assert!(state.seats.selected_ids().is_empty());
                assert_eq!(
                    state.session.reservations.held().unwrap().seats,
                    vec![SeatId::new(1), SeatId::new(2)]
                );
                assert_eq!(
                    state.session.poller.state(),
                    &PollState::Polling {
                        reservation_id: ReservationId::new("R1"),
                        attempt: 0
                    }
                );
            })
            .then_effects(|effects| {
                assertions::assert_schedules(effects, POLL);
                assertions::assert_schedules(effects, COUNTDOWN);
                let delayed = assertions::delayed_actions(effects);
                assert!(delayed.contains(&(
                    Duration::from_millis(100),
                    &BookingAction::PollAttempt {
                        reservation_id: ReservationId::new("R1"),
                        attempt: 0
                    }
                )));
                assert!(delayed.contains(&(TICK, &BookingAction::Tick { session: 0 })));
            })
            .run();
    }

    #[test]
    fn test_reservation_rejected_stays_on_booking() {
        let mut actions = filled_form();
        actions.push(BookingAction::Submit);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::ReservationCreated {
                session: 0,
                result: Err(ApiError::Rejected {
                    status: 409,
                    message: "seat 2 is taken".into(),
                }),
            })
            .then_state(|state| {
                assert_eq!(
                    booking_error(state),
                    Some(BookingError::Reservation("seat 2 is taken".into()))
                );
                assert_eq!(state.seats.selected_ids().len(), 2);
                assert!(!state.session.reservations.is_creating());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_reservation_from_old_session_is_dropped() {
        let mut actions = filled_form();
        actions.push(BookingAction::Submit);
        actions.push(BookingAction::Restart);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::ReservationCreated {
                session: 0,
                result: Ok(reservation("R1")),
            })
            .then_state(|state| {
                assert_eq!(state.session.id, 1);
                assert!(state.session.reservations.held().is_none());
                assert!(matches!(state.session.screen, Screen::Booking(_)));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_confirm_before_ready_is_unreachable() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(on_payment_screen())
            .when_action(BookingAction::Confirm)
            .then_state(|state| assert_eq!(state.session.payment.pending(), None))
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(on_payment_screen())
            .when_action(BookingAction::cancel())
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_not_ready_schedules_next_attempt() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(on_payment_screen())
            .when_action(BookingAction::PollResult {
                reservation_id: ReservationId::new("R1"),
                attempt: 0,
                result: Err(ApiError::RequestFailed("connection reset".into())),
            })
            .then_effects(|effects| {
                let delayed = assertions::delayed_actions(effects);
                assert_eq!(
                    delayed,
                    vec![(
                        Duration::from_millis(1100),
                        &BookingAction::PollAttempt {
                            reservation_id: ReservationId::new("R1"),
                            attempt: 1
                        }
                    )]
                );
            })
            .run();
    }

    #[test]
    fn test_stale_poll_attempt_is_dropped() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(on_payment_screen())
            .when_action(BookingAction::PollAttempt {
                reservation_id: ReservationId::new("R1"),
                attempt: 4,
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_poll_timeout_resets_session() {
        let mut actions = on_payment_screen();
        for attempt in 0..9 {
            actions.push(BookingAction::PollResult {
                reservation_id: ReservationId::new("R1"),
                attempt,
                result: Ok(false),
            });
        }

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::PollResult {
                reservation_id: ReservationId::new("R1"),
                attempt: 9,
                result: Ok(false),
            })
            .then_state(|state| {
                assert_eq!(state.notice, Some(Notice::PollTimedOut));
                assert_eq!(state.notice.unwrap().to_string(), "TIMEOUT");
                assert_eq!(state.session, Session::new(1));
                assert_eq!(state.seats.seats().len(), 3);
            })
            .then_effects(|effects| {
                assertions::assert_cancels(effects, POLL);
                assertions::assert_cancels(effects, COUNTDOWN);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn test_tick_reschedules_until_expiry() {
        let clock = ManualClock::new(epoch());
        clock.advance(Duration::from_secs(30));

        ReducerTest::new(BookingReducer::new())
            .with_env(env_with(clock.clone()))
            .given_state(BookingState::new())
            .given_actions(on_payment_screen())
            .when_action(BookingAction::Tick { session: 0 })
            .then_effects(|effects| {
                assertions::assert_schedules(effects, COUNTDOWN);
            })
            .run();

        clock.advance(Duration::from_secs(30));

        ReducerTest::new(BookingReducer::new())
            .with_env(env_with(clock))
            .given_state(BookingState::new())
            .given_actions(payment_ready())
            .when_action(BookingAction::Tick { session: 0 })
            .then_state(|state| {
                assert_eq!(state.notice, Some(Notice::ReservationExpired));
                assert!(state.session.reservations.held().is_none());
            })
            .then_effects(|effects| {
                assertions::assert_cancels(effects, POLL);
                assertions::assert_cancels(effects, COUNTDOWN);
            })
            .run();
    }

    #[test]
    fn test_tick_from_old_session_is_ignored() {
        let mut actions = on_payment_screen();
        actions.push(BookingAction::Restart);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::Tick { session: 0 })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_confirm_once_ready() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(payment_ready())
            .when_action(BookingAction::Confirm)
            .then_state(|state| {
                assert_eq!(state.session.payment.pending(), Some(PaymentOp::Confirm));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();

        let mut actions = payment_ready();
        actions.push(BookingAction::Confirm);
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::cancel())
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_confirm_rejected_keeps_payment_screen() {
        let mut actions = payment_ready();
        actions.push(BookingAction::Confirm);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::PaymentConfirmed {
                reservation_id: ReservationId::new("R1"),
                result: Err(ApiError::Rejected {
                    status: 402,
                    message: "card declined".into(),
                }),
            })
            .then_state(|state| {
                assert_eq!(
                    payment_error(state),
                    Some(BookingError::Payment("card declined".into()))
                );
                assert!(state.session.poller.is_ready());
                assert_eq!(state.session.payment.pending(), None);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_cancel_success_returns_to_booking() {
        let mut actions = payment_ready();
        actions.push(BookingAction::cancel());

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::PaymentCancelled {
                reservation_id: ReservationId::new("R1"),
                result: Ok(Payment {
                    id: "P1".into(),
                    name: "Ana".into(),
                    email: "a@x.com".into(),
                    reservation_id: ReservationId::new("R1"),
                    status: "cancelled".into(),
                    reason: Some("user cancelled payment".into()),
                    created_at: epoch(),
                    updated_at: epoch(),
                }),
            })
            .then_state(|state| {
                assert_eq!(state.session.screen, Screen::default());
                assert!(state.session.reservations.held().is_none());
                assert!(state.session.payment.payment().is_none());
                assert!(state.seats.selected_ids().is_empty());
                assert_eq!(state.session.id, 0);
            })
            .then_effects(|effects| {
                assertions::assert_cancels(effects, POLL);
                assertions::assert_cancels(effects, COUNTDOWN);
            })
            .run();
    }

    #[test]
    fn test_payment_answer_for_other_reservation_is_dropped() {
        let mut actions = payment_ready();
        actions.push(BookingAction::Confirm);

        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(actions)
            .when_action(BookingAction::PaymentConfirmed {
                reservation_id: ReservationId::new("R0"),
                result: Err(ApiError::MissingData),
            })
            .then_state(|state| {
                assert_eq!(state.session.payment.pending(), Some(PaymentOp::Confirm));
                assert_eq!(payment_error(state), None);
            })
            .run();
    }

    #[test]
    fn test_toggle_ignored_on_payment_screen() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(on_payment_screen())
            .when_action(BookingAction::ToggleSeat { seat_id: SeatId::new(1) })
            .then_state(|state| assert!(state.seats.selected_ids().is_empty()))
            .run();
    }

    #[test]
    fn test_restart_and_dismiss() {
        ReducerTest::new(BookingReducer::new())
            .with_env(env())
            .given_state(BookingState::new())
            .given_actions(payment_ready())
            .when_action(BookingAction::Restart)
            .then_state(|state| {
                assert_eq!(state.notice, None);
                assert_eq!(state.session, Session::new(1));
            })
            .then_effects(|effects| {
                assertions::assert_cancels(effects, POLL);
                assertions::assert_cancels(effects, COUNTDOWN);
            })
            .run();

        let mut state = BookingState::new();
        state.notice = Some(Notice::PaymentCompleted);
        let _ = BookingReducer::new().reduce(&mut state, BookingAction::DismissNotice, &env());
        assert_eq!(state.notice, None);
    }
}
