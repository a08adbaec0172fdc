//! Scripted in-memory [`BookingApi`]
//!
//! Responses are queued per endpoint and consumed in order. Every call is recorded so tests
//! can assert on what the client sent and how often.

use super::{ApiFuture, ApiResult, BookingApi, SeatStream};
use crate::error::ApiError;
use crate::types::{NewReservation, Payment, Reservation, ReservationId, Seat};
use async_stream::stream;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// A call made against [`MockBookingApi`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    /// `GET /health`
    Health,
    /// `GET /seats`
    Seats,
    /// `POST /reservations`
    CreateReservation(NewReservation),
    /// `GET /payments?reservation_id=`
    CheckPayment(ReservationId),
    /// `POST /payments`
    ConfirmPayment(ReservationId),
    /// `DELETE /payments`
    CancelPayment {
        /// Reservation released
        reservation_id: ReservationId,
        /// Reason sent
        reason: String,
    },
    /// `GET /events`
    SeatUpdates,
}

#[derive(Default)]
struct Script {
    seats: Vec<Seat>,
    reservations: VecDeque<ApiResult<Reservation>>,
    readiness: VecDeque<ApiResult<bool>>,
    confirms: VecDeque<ApiResult<Payment>>,
    cancels: VecDeque<ApiResult<Payment>>,
    calls: Vec<ApiCall>,
    updates: Option<mpsc::UnboundedReceiver<Vec<Seat>>>,
}

/// Scripted booking and payment backends
///
/// When a queue runs dry: readiness answers `false`, confirm and cancel synthesize a
/// payment for the reservation, and create is rejected.
#[derive(Clone)]
pub struct MockBookingApi {
    script: Arc<Mutex<Script>>,
    updates: mpsc::UnboundedSender<Vec<Seat>>,
    latency: Duration,
}

impl Default for MockBookingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBookingApi {
    /// Create a mock with empty scripts
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            script: Arc::new(Mutex::new(Script {
                updates: Some(rx),
                ..Script::default()
            })),
            updates: tx,
            latency: Duration::ZERO,
        }
    }

    /// Delay every response by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot returned by the seat query
    pub fn set_seats(&self, seats: Vec<Seat>) {
        self.script().seats = seats;
    }

    /// Queue a reservation create response
    pub fn push_reservation(&self, result: ApiResult<Reservation>) {
        self.script().reservations.push_back(result);
    }

    /// Queue readiness check responses
    pub fn push_readiness(&self, results: impl IntoIterator<Item = ApiResult<bool>>) {
        self.script().readiness.extend(results);
    }

    /// Queue a confirm response
    pub fn push_confirm(&self, result: ApiResult<Payment>) {
        self.script().confirms.push_back(result);
    }

    /// Queue a cancel response
    pub fn push_cancel(&self, result: ApiResult<Payment>) {
        self.script().cancels.push_back(result);
    }

    /// Deliver a snapshot on the push channel
    pub fn send_snapshot(&self, seats: Vec<Seat>) {
        if self.updates.send(seats).is_err() {
            tracing::debug!("Push channel subscriber gone, dropping snapshot");
        }
    }

    /// Every call made so far
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.script().calls.clone()
    }

    /// How many calls matched `predicate`
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.script().calls.iter().filter(|call| predicate(call)).count()
    }

    fn respond<T, F>(&self, call: ApiCall, answer: F) -> ApiFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Script) -> ApiResult<T>,
    {
        let result = {
            let mut script = self.script();
            script.calls.push(call);
            answer(&mut script)
        };
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}

fn synthesized_payment(reservation_id: ReservationId, status: &str, reason: Option<String>) -> Payment {
    let now = Utc::now();
    Payment {
        id: format!("payment-{reservation_id}"),
        name: String::new(),
        email: String::new(),
        reservation_id,
        status: status.to_string(),
        reason,
        created_at: now,
        updated_at: now,
    }
}

impl BookingApi for MockBookingApi {
    fn health(&self) -> ApiFuture<serde_json::Value> {
        self.respond(ApiCall::Health, |_| Ok(serde_json::json!({"status": "ok"})))
    }

    fn seats(&self) -> ApiFuture<Vec<Seat>> {
        self.respond(ApiCall::Seats, |script| Ok(script.seats.clone()))
    }

    fn create_reservation(&self, request: NewReservation) -> ApiFuture<Reservation> {
        self.respond(ApiCall::CreateReservation(request), |script| {
            script.reservations.pop_front().unwrap_or_else(|| {
                Err(ApiError::Rejected {
                    status: 500,
                    message: "no scripted reservation".into(),
                })
            })
        })
    }

    fn check_payment(&self, reservation_id: ReservationId) -> ApiFuture<bool> {
        self.respond(ApiCall::CheckPayment(reservation_id), |script| {
            script.readiness.pop_front().unwrap_or(Ok(false))
        })
    }

    fn confirm_payment(&self, reservation_id: ReservationId) -> ApiFuture<Payment> {
        self.respond(ApiCall::ConfirmPayment(reservation_id.clone()), |script| {
            script
                .confirms
                .pop_front()
                .unwrap_or_else(|| Ok(synthesized_payment(reservation_id, "paid", None)))
        })
    }

    fn cancel_payment(&self, reservation_id: ReservationId, reason: String) -> ApiFuture<Payment> {
        let call = ApiCall::CancelPayment {
            reservation_id: reservation_id.clone(),
            reason: reason.clone(),
        };
        self.respond(call, |script| {
            script.cancels.pop_front().unwrap_or_else(|| {
                Ok(synthesized_payment(reservation_id, "cancelled", Some(reason)))
            })
        })
    }

    fn seat_updates(&self) -> ApiFuture<SeatStream> {
        self.respond(ApiCall::SeatUpdates, |script| {
            let Some(mut rx) = script.updates.take() else {
                return Err(ApiError::StreamFailed("push channel already open".into()));
            };
            let updates: SeatStream = Box::pin(stream! {
                while let Some(seats) = rx.recv().await {
                    yield Ok(seats);
                }
            });
            Ok(updates)
        })
    }
}
