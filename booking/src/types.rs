//! Domain types for the seat booking client.
//!
//! Value objects shared by the seat registry, the reservation and payment managers and the
//! HTTP API. Field names follow the booking and payment backends' JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a seat on the seat map
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(u32);

impl SeatId {
    /// Create a `SeatId` from its numeric value
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a reservation, assigned by the booking backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(String);

impl ReservationId {
    /// Create a `ReservationId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Seats
// ============================================================================

/// Status of a seat as reported by the booking backend
///
/// The backend reuses its reservation vocabulary for seats: a seat whose last reservation was
/// cancelled is the one that can be booked again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Shown as free but not bookable
    Available,
    /// Held or sold
    Reserved,
    /// Released by a cancelled reservation; open for a new selection
    Cancelled,
}

impl SeatStatus {
    /// Whether a user may add a seat with this status to their selection
    #[must_use]
    pub const fn is_selectable(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Reserved => write!(f, "reserved"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A seat on the seat map
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat identity
    pub id: SeatId,
    /// Display label (e.g. "A1")
    pub name: String,
    /// Current status
    pub status: SeatStatus,
}

impl Seat {
    /// Create a seat
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, status: SeatStatus) -> Self {
        Self {
            id: SeatId::new(id),
            name: name.into(),
            status,
        }
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Lifecycle status of a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Waiting for payment
    Pending,
    /// Paid
    Paid,
    /// Cancelled by the user or the payment backend
    Cancelled,
    /// Not paid in time
    Expired,
}

/// A time-boxed hold on a set of seats pending payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identity
    pub id: ReservationId,
    /// Name the reservation was made under
    pub name: String,
    /// Contact email
    pub email: String,
    /// Price as formatted by the backend
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: String,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Reason attached to the last status change, if any
    #[serde(default)]
    pub reason: Option<String>,
    /// Creation time; the payment window is measured from here
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Body of a reservation create request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewReservation {
    /// Name to reserve under
    pub name: String,
    /// Contact email
    pub email: String,
    /// Seats to hold, ascending
    pub seats: Vec<SeatId>,
}

// ============================================================================
// Payments
// ============================================================================

/// Payment record created by the payment backend for a reservation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identity
    pub id: String,
    /// Payer name
    #[serde(default)]
    pub name: String,
    /// Payer email
    #[serde(default)]
    pub email: String,
    /// Reservation the payment settles
    #[serde(rename = "reservationId", alias = "reservation_id")]
    pub reservation_id: ReservationId,
    /// Status as reported by the payment backend
    pub status: String,
    /// Reason attached to the last status change, if any
    #[serde(default)]
    pub reason: Option<String>,
    /// Creation time
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
        Raw::Null => String::new(),
    })
}
