//! Payment manager: confirms or cancels a payment once the poller says it exists.

use crate::error::{ApiError, BookingError};
use crate::poller::ReadyReservation;
use crate::types::{Payment, ReservationId};

/// Reason sent when the user backs out of a payment
pub const DEFAULT_CANCEL_REASON: &str = "user cancelled payment";

/// Request the coordinator must send to the payment backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentRequest {
    /// `POST /payments`
    Confirm {
        /// Reservation to pay for
        reservation_id: ReservationId,
    },
    /// `DELETE /payments`
    Cancel {
        /// Reservation to release
        reservation_id: ReservationId,
        /// Reason recorded by the backend
        reason: String,
    },
}

/// Which payment call is outstanding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentOp {
    /// Confirm in flight
    Confirm,
    /// Cancel in flight
    Cancel,
}

/// Tracks the single outstanding confirm/cancel call and the last payment returned
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentManager {
    pending: Option<PaymentOp>,
    payment: Option<Payment>,
}

impl PaymentManager {
    /// Create a manager with nothing in flight
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a confirm; `None` if a call is already in flight
    pub fn confirm(&mut self, ready: &ReadyReservation) -> Option<PaymentRequest> {
        self.begin(PaymentOp::Confirm)?;
        Some(PaymentRequest::Confirm {
            reservation_id: ready.reservation_id().clone(),
        })
    }

    /// Start a cancel; `None` if a call is already in flight
    pub fn cancel(&mut self, ready: &ReadyReservation, reason: &str) -> Option<PaymentRequest> {
        self.begin(PaymentOp::Cancel)?;
        Some(PaymentRequest::Cancel {
            reservation_id: ready.reservation_id().clone(),
            reason: reason.to_string(),
        })
    }

    fn begin(&mut self, op: PaymentOp) -> Option<()> {
        if let Some(pending) = self.pending {
            tracing::debug!(?pending, requested = ?op, "Payment call already in flight");
            return None;
        }
        self.pending = Some(op);
        Some(())
    }

    /// Record the outcome of the outstanding call
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::Payment`] with the backend's reason when the call failed.
    pub fn finish(&mut self, result: Result<Payment, ApiError>) -> Result<&Payment, BookingError> {
        let op = self.pending.take();
        match result {
            Ok(payment) => {
                tracing::info!(
                    reservation_id = %payment.reservation_id,
                    status = %payment.status,
                    ?op,
                    "Payment call succeeded"
                );
                Ok(&*self.payment.insert(payment))
            },
            Err(err) => {
                tracing::warn!(error = %err, ?op, "Payment call rejected");
                Err(BookingError::payment(&err))
            },
        }
    }

    /// Outstanding call, if any
    #[must_use]
    pub const fn pending(&self) -> Option<PaymentOp> {
        self.pending
    }

    /// Last payment returned by the backend
    #[must_use]
    pub const fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    /// Forget the payment and any outstanding call
    pub fn clear(&mut self) {
        self.pending = None;
        self.payment = None;
    }
}
