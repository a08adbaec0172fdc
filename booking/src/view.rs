//! Read-only projection of [`BookingState`] for rendering.

use crate::coordinator::{countdown, BookingState, Screen};
use crate::error::BookingError;
use crate::poller::PollState;
use crate::seats::SeatView;
use crate::types::{ReservationId, SeatId};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// What the current screen shows
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreenView {
    /// Seat map and identity form
    Booking {
        /// Every seat with its selection mark
        seats: Vec<SeatView>,
        /// Name field
        name: String,
        /// Email field
        email: String,
        /// Last validation or reservation error
        error: Option<String>,
        /// A create request is in flight
        submitting: bool,
    },
    /// Reservation held, payment not yet ready
    Waiting {
        /// Held reservation
        reservation_id: ReservationId,
        /// Seconds left on the reservation
        remaining_secs: u64,
    },
    /// Payment ready; confirm and cancel are available
    Payment {
        /// Held reservation
        reservation_id: ReservationId,
        /// Name the reservation was made under
        name: String,
        /// Contact email of the reservation
        email: String,
        /// Seats the reservation covers
        seats: Vec<SeatId>,
        /// Seconds left on the reservation
        remaining_secs: u64,
        /// Last payment error
        error: Option<String>,
        /// A confirm or cancel is in flight
        busy: bool,
    },
}

/// Everything the terminal draws
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    /// Current screen
    pub screen: ScreenView,
    /// Message from the last finished session
    pub notice: Option<String>,
}

/// `mm:ss`
#[must_use]
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn message(error: Option<&BookingError>) -> Option<String> {
    error.map(ToString::to_string)
}

/// Project the state at `now`
#[must_use]
pub fn render(state: &BookingState, now: DateTime<Utc>, ttl: Duration) -> View {
    let session = &state.session;
    let held = session.reservations.held();

    let screen = match (&session.screen, held) {
        (Screen::Payment(payment), Some(held)) => {
            let remaining_secs = countdown(held.reservation.created_at, now, ttl);
            if matches!(session.poller.state(), PollState::Ready(_)) {
                ScreenView::Payment {
                    reservation_id: payment.reservation_id.clone(),
                    name: held.reservation.name.clone(),
                    email: held.reservation.email.clone(),
                    seats: held.seats.clone(),
                    remaining_secs,
                    error: message(payment.error.as_ref()),
                    busy: session.payment.pending().is_some(),
                }
            } else {
                ScreenView::Waiting {
                    reservation_id: payment.reservation_id.clone(),
                    remaining_secs,
                }
            }
        },
        (Screen::Booking(booking), _) => ScreenView::Booking {
            seats: state.seats.view(),
            name: session.name.clone(),
            email: session.email.clone(),
            error: message(booking.error.as_ref()),
            submitting: session.reservations.is_creating(),
        },
        (Screen::Payment(_), None) => ScreenView::Booking {
            seats: state.seats.view(),
            name: session.name.clone(),
            email: session.email.clone(),
            error: None,
            submitting: false,
        },
    };

    View {
        screen,
        notice: state.notice.map(|notice| notice.to_string()),
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(notice) = &self.notice {
            writeln!(f, "*** {notice} ***")?;
        }

        match &self.screen {
            ScreenView::Booking {
                seats,
                name,
                email,
                error,
                submitting,
            } => {
                writeln!(f, "== Seats ==")?;
                for seat in seats {
                    let mark = if seat.selected { "[x]" } else { "[ ]" };
                    writeln!(f, "{mark} {:>4} {:<8} {}", seat.id, seat.name, seat.status)?;
                }
                writeln!(f, "name:  {name}")?;
                writeln!(f, "email: {email}")?;
                if *submitting {
                    writeln!(f, "Reserving...")?;
                }
                if let Some(error) = error {
                    writeln!(f, "error: {error}")?;
                }
            },
            ScreenView::Waiting {
                reservation_id,
                remaining_secs,
            } => {
                writeln!(f, "== Reservation {reservation_id} ==")?;
                writeln!(f, "Preparing payment... ({})", format_countdown(*remaining_secs))?;
            },
            ScreenView::Payment {
                reservation_id,
                name,
                email,
                seats,
                remaining_secs,
                error,
                busy,
            } => {
                writeln!(f, "== Payment for {reservation_id} ==")?;
                writeln!(f, "name:  {name}")?;
                writeln!(f, "email: {email}")?;
                let seats: Vec<String> = seats.iter().map(ToString::to_string).collect();
                writeln!(f, "seats: {}", seats.join(", "))?;
                writeln!(f, "time left: {}", format_countdown(*remaining_secs))?;
                if *busy {
                    writeln!(f, "Processing...")?;
                } else {
                    writeln!(f, "confirm | cancel [reason]")?;
                }
                if let Some(error) = error {
                    writeln!(f, "error: {error}")?;
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::api::MockBookingApi;
    use crate::coordinator::{BookingAction, BookingEnvironment, BookingReducer, Notice};
    use crate::config::SessionConfig;
    use crate::types::{Reservation, ReservationStatus, Seat, SeatStatus};
    use seatbook_core::reducer::Reducer;
    use seatbook_testing::{epoch, FixedClock, FixedJitter};
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(60);

    fn apply(actions: Vec<BookingAction>) -> BookingState {
        let env = BookingEnvironment::new(Arc::new(MockBookingApi::new()), SessionConfig::default())
            .with_clock(Arc::new(FixedClock::new(epoch())))
            .with_jitter(Arc::new(FixedJitter::none()));
        let mut state = BookingState::new();
        for action in actions {
            let _ = BookingReducer::new().reduce(&mut state, action, &env);
        }
        state
    }

    fn reserve() -> Vec<BookingAction> {
        vec![
            BookingAction::SeatsReplaced {
                seats: vec![Seat::new(7, "B7", SeatStatus::Cancelled)],
            },
            BookingAction::SetName { name: "Ana".into() },
            BookingAction::SetEmail { email: "a@x.com".into() },
            BookingAction::ToggleSeat { seat_id: SeatId::new(7) },
            BookingAction::Submit,
            BookingAction::ReservationCreated {
                session: 0,
                result: Ok(Reservation {
                    id: ReservationId::new("R7"),
                    name: "Ana".into(),
                    email: "a@x.com".into(),
                    price: "40".into(),
                    status: ReservationStatus::Pending,
                    reason: None,
                    created_at: epoch(),
                    updated_at: epoch(),
                }),
            },
        ]
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(60), "01:00");
        assert_eq!(format_countdown(59), "00:59");
        assert_eq!(format_countdown(0), "00:00");
    }

    #[test]
    fn test_waiting_until_ready() {
        let state = apply(reserve());
        let view = render(&state, epoch() + chrono::Duration::seconds(12), TTL);

        assert_eq!(
            view.screen,
            ScreenView::Waiting {
                reservation_id: ReservationId::new("R7"),
                remaining_secs: 48,
            }
        );
    }

    #[test]
    fn test_payment_controls_once_ready() {
        let mut actions = reserve();
        actions.push(BookingAction::PollResult {
            reservation_id: ReservationId::new("R7"),
            attempt: 0,
            result: Ok(true),
        });
        let view = render(&apply(actions), epoch(), TTL);

        assert_eq!(
            view.screen,
            ScreenView::Payment {
                reservation_id: ReservationId::new("R7"),
                name: "Ana".into(),
                email: "a@x.com".into(),
                seats: vec![SeatId::new(7)],
                remaining_secs: 60,
                error: None,
                busy: false,
            }
        );
        let text = view.to_string();
        assert!(text.contains("name:  Ana"));
        assert!(text.contains("email: a@x.com"));
        assert!(text.contains("seats: 7"));
        assert!(text.contains("time left: 01:00"));
    }

    #[test]
    fn test_booking_shows_selection_and_notice() {
        let mut state = apply(vec![
            BookingAction::SeatsReplaced {
                seats: vec![
                    Seat::new(1, "A1", SeatStatus::Cancelled),
                    Seat::new(2, "A2", SeatStatus::Reserved),
                ],
            },
            BookingAction::ToggleSeat { seat_id: SeatId::new(1) },
            BookingAction::Submit,
        ]);
        state.notice = Some(Notice::PollTimedOut);

        let view = render(&state, epoch(), TTL);
        let ScreenView::Booking { seats, error, .. } = &view.screen else {
            panic!("expected booking screen");
        };
        assert!(seats[0].selected);
        assert!(!seats[1].selected);
        assert_eq!(error.as_deref(), Some("name is required"));
        assert_eq!(view.notice.as_deref(), Some("TIMEOUT"));
    }
}
