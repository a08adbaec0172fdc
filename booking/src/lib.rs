//! # Seatbook
//!
//! Client-side coordinator for a seat booking system.
//!
//! A user picks seats from a live seat map, enters name and email, and receives a timed
//! reservation. The client then waits for the payment backend to materialise the payment
//! record, shows a countdown, and lets the user confirm or cancel.
//!
//! ## Layout
//!
//! - [`types`]: wire types shared with the booking and payment backends
//! - [`seats`]: seat snapshot and local selection
//! - [`reservation`]: form validation and the at-most-once reservation create
//! - [`poller`]: bounded, jittered payment readiness polling
//! - [`payment`]: confirm/cancel, gated on readiness
//! - [`coordinator`]: the reducer sequencing a booking session
//! - [`api`]: the [`BookingApi`](api::BookingApi) seam with HTTP and scripted implementations
//! - [`push`]: server-sent seat snapshots with reconnect
//! - [`view`]: render model for the terminal client
//! - [`config`]: environment configuration
//!
//! ## Example
//!
//! ```ignore
//! use seatbook::{api::HttpBookingApi, BookingAction, BookingEnvironment, BookingReducer, BookingState, Config};
//! use seatbook_runtime::Store;
//! use std::sync::Arc;
//!
//! let config = Config::from_env();
//! let api = Arc::new(HttpBookingApi::new(&config.api));
//! let store = Store::new(
//!     BookingState::new(),
//!     BookingReducer::new(),
//!     BookingEnvironment::new(api, config.session),
//! );
//! store.send(BookingAction::LoadSeats).await?;
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod payment;
pub mod poller;
pub mod push;
pub mod reservation;
pub mod seats;
pub mod types;
pub mod view;

pub use config::Config;
pub use coordinator::{BookingAction, BookingEnvironment, BookingReducer, BookingState, Notice};
pub use error::{ApiError, BookingError, ConfigError, ValidationError};
pub use types::{Payment, Reservation, ReservationId, Seat, SeatId, SeatStatus};
