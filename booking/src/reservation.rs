//! Reservation manager: validates a booking request and holds the one active reservation.
//!
//! The manager never performs I/O. [`ReservationManager::submit`] decides whether a create
//! request has to go out; the coordinator sends it and reports the outcome back through
//! [`ReservationManager::created`] or [`ReservationManager::create_failed`].

use crate::error::{ApiError, BookingError, ValidationError};
use crate::types::{NewReservation, Reservation, ReservationId, ReservationStatus, SeatId};

/// Check a booking request, reporting only the first problem in the order name, email, seats
///
/// # Errors
///
/// Returns the first [`ValidationError`] that applies.
pub fn validate(name: &str, email: &str, seats: &[SeatId]) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    if email.is_empty() {
        return Err(ValidationError::MissingEmail);
    }
    if seats.is_empty() {
        return Err(ValidationError::MissingSeats);
    }
    Ok(())
}

/// A reservation the client holds, with the seats it was requested for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeldReservation {
    /// The reservation as returned by the backend
    pub reservation: Reservation,
    /// Seats sent in the create request
    pub seats: Vec<SeatId>,
}

/// What a submit asks the coordinator to do
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A reservation is already held; go straight to payment with it
    Reuse(ReservationId),
    /// Send this create request
    Create(NewReservation),
    /// A create request is already in flight
    InFlight,
}

/// Holds at most one reservation and guarantees at most one create per reservation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservationManager {
    held: Option<HeldReservation>,
    creating: Option<Vec<SeatId>>,
}

impl ReservationManager {
    /// Create a manager holding nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what a submit should do
    ///
    /// A held reservation is reused without validating the form. Otherwise the form is
    /// validated and, when valid, the manager records that a create is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Validation`] when the form is incomplete.
    pub fn submit(
        &mut self,
        name: &str,
        email: &str,
        seats: Vec<SeatId>,
    ) -> Result<SubmitOutcome, BookingError> {
        if let Some(held) = &self.held {
            return Ok(SubmitOutcome::Reuse(held.reservation.id.clone()));
        }
        if self.creating.is_some() {
            return Ok(SubmitOutcome::InFlight);
        }

        validate(name, email, &seats)?;

        self.creating = Some(seats.clone());
        Ok(SubmitOutcome::Create(NewReservation {
            name: name.to_string(),
            email: email.to_string(),
            seats,
        }))
    }

    /// Record a successful create
    ///
    /// Returns the held reservation, or `None` if no create was in flight (the result is
    /// stale and ignored).
    pub fn created(&mut self, reservation: Reservation) -> Option<&HeldReservation> {
        let seats = self.creating.take()?;
        tracing::info!(
            reservation_id = %reservation.id,
            seats = seats.len(),
            "Reservation created"
        );
        self.held = Some(HeldReservation { reservation, seats });
        self.held.as_ref()
    }

    /// Record a rejected create and convert the transport error
    pub fn create_failed(&mut self, err: &ApiError) -> BookingError {
        self.creating = None;
        tracing::warn!(error = %err, "Reservation create rejected");
        BookingError::reservation(err)
    }

    /// Mark the held reservation as paid
    pub fn mark_paid(&mut self) {
        if let Some(held) = &mut self.held {
            held.reservation.status = ReservationStatus::Paid;
        }
    }

    /// Drop the held reservation
    pub fn clear(&mut self) -> Option<HeldReservation> {
        self.creating = None;
        self.held.take()
    }

    /// The held reservation, if any
    #[must_use]
    pub const fn held(&self) -> Option<&HeldReservation> {
        self.held.as_ref()
    }

    /// Whether a create request is outstanding
    #[must_use]
    pub const fn is_creating(&self) -> bool {
        self.creating.is_some()
    }
}
