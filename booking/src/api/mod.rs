//! Remote collaborators of the booking client.
//!
//! [`BookingApi`] is the seam between the coordinator and the two backends. Every method
//! returns a boxed `'static` future so the coordinator can move the call into an
//! [`Effect::Future`](seatbook_core::effect::Effect::Future) without borrowing the API.
//!
//! - [`HttpBookingApi`]: reqwest implementation talking to the real backends
//! - [`MockBookingApi`]: scripted in-memory implementation for tests and demos

use crate::error::ApiError;
use crate::types::{NewReservation, Payment, Reservation, ReservationId, Seat};
use futures::stream::Stream;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

mod http;
mod mock;

pub use http::HttpBookingApi;
pub use mock::{ApiCall, MockBookingApi};

/// Result of a backend call
pub type ApiResult<T> = Result<T, ApiError>;

/// Boxed future returned by [`BookingApi`] methods
pub type ApiFuture<T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send>>;

/// Stream of full seat snapshots from the push channel
pub type SeatStream = Pin<Box<dyn Stream<Item = ApiResult<Vec<Seat>>> + Send>>;

/// Calls the booking client makes against the booking and payment backends
pub trait BookingApi: Send + Sync {
    /// Diagnostic health check of the booking backend
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or unhealthy.
    fn health(&self) -> ApiFuture<serde_json::Value>;

    /// Current full seat snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn seats(&self) -> ApiFuture<Vec<Seat>>;

    /// Create a reservation
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] with the backend's reason if it refuses.
    fn create_reservation(&self, request: NewReservation) -> ApiFuture<Reservation>;

    /// Whether the payment record for a reservation exists yet
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn check_payment(&self, reservation_id: ReservationId) -> ApiFuture<bool>;

    /// Pay for a reservation
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] with the backend's reason if it refuses.
    fn confirm_payment(&self, reservation_id: ReservationId) -> ApiFuture<Payment>;

    /// Cancel the payment and release the reservation
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Rejected`] with the backend's reason if it refuses.
    fn cancel_payment(&self, reservation_id: ReservationId, reason: String) -> ApiFuture<Payment>;

    /// Open the push channel
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened. Errors after that are items of the
    /// returned stream.
    fn seat_updates(&self) -> ApiFuture<SeatStream>;
}

/// Response envelope used by both backends: `{ "data": ... }`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
}

/// Pull a human-readable reason out of an error body
///
/// JSON bodies with an `error` or `message` string yield that string; anything else is
/// returned as-is. An empty body falls back to `fallback`.
pub(crate) fn error_message(body: &str, fallback: &str) -> String {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        for key in ["error", "message"] {
            if let Some(serde_json::Value::String(message)) = fields.get(key) {
                return message.clone();
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        fallback.to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_missing_data() {
        let envelope: Envelope<Vec<u32>> = serde_json::from_str("{}").unwrap();
        assert_eq!(envelope.data, None);

        let envelope: Envelope<bool> = serde_json::from_str(r#"{"data": true}"#).unwrap();
        assert_eq!(envelope.data, Some(true));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error": "seat taken"}"#, "409"), "seat taken");
        assert_eq!(error_message(r#"{"message": "not found"}"#, "404"), "not found");
        assert_eq!(error_message("upstream down", "502"), "upstream down");
        assert_eq!(error_message(r#"{"code": 7}"#, "400"), r#"{"code": 7}"#);
        assert_eq!(error_message("  ", "Internal Server Error"), "Internal Server Error");
    }
}
