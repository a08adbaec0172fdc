//! Error types for the booking client.
//!
//! Three layers:
//! - [`ApiError`]: what the HTTP transport reports
//! - [`BookingError`]: what the coordinator reasons about and the view shows
//! - [`ConfigError`]: invalid startup configuration

use thiserror::Error;

/// Errors reported by the booking and payment backends or the transport to them
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    /// HTTP request could not be sent or completed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Response body did not have the expected shape
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// Backend answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Reason given by the backend
        message: String,
    },

    /// Response envelope had no `data`
    #[error("Response envelope has no data")]
    MissingData,

    /// Push channel failed
    #[error("Stream failed: {0}")]
    StreamFailed(String),
}

impl ApiError {
    /// The reason to show a user: the backend's own message when it gave one
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Local input problems, reported in this precedence order
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Name field is empty
    #[error("name is required")]
    MissingName,
    /// Email field is empty
    #[error("email is required")]
    MissingEmail,
    /// No seat selected
    #[error("seats is required")]
    MissingSeats,
}

/// Errors the booking coordinator handles
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    /// Input rejected locally; no request was made
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Booking backend refused to create the reservation
    #[error("{0}")]
    Reservation(String),

    /// One readiness check failed; the poller retries
    #[error("readiness check {attempt} failed: {reason}")]
    TransientPoll {
        /// Zero-based attempt number
        attempt: u32,
        /// Transport or backend reason
        reason: String,
    },

    /// No payment record appeared within the attempt budget
    #[error("TIMEOUT")]
    PollTimeout {
        /// Attempts made
        attempts: u32,
    },

    /// Payment backend refused to confirm or cancel
    #[error("{0}")]
    Payment(String),
}

impl BookingError {
    /// Convert a failed reservation create
    #[must_use]
    pub fn reservation(err: &ApiError) -> Self {
        Self::Reservation(err.reason())
    }

    /// Convert a failed readiness check
    #[must_use]
    pub fn transient_poll(attempt: u32, err: &ApiError) -> Self {
        Self::TransientPoll {
            attempt,
            reason: err.reason(),
        }
    }

    /// Convert a failed confirm or cancel
    #[must_use]
    pub fn payment(err: &ApiError) -> Self {
        Self::Payment(err.reason())
    }
}

/// Invalid configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A URL setting does not parse
    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl {
        /// Setting name
        name: &'static str,
        /// Rejected value
        value: String,
    },

    /// A numeric setting is out of range
    #[error("{name} must be greater than zero")]
    MustBePositive {
        /// Setting name
        name: &'static str,
    },
}
