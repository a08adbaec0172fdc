//! Configuration management for the booking client.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::ConfigError;
use crate::poller::PollPolicy;
use std::env;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend endpoints
    pub api: ApiConfig,
    /// Reservation window and readiness polling
    pub session: SessionConfig,
    /// How long to wait for in-flight effects on exit
    pub shutdown_timeout: Duration,
}

/// Backend endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Booking backend (seats, reservations, push channel)
    pub booking_url: String,
    /// Payment backend
    pub payments_url: String,
    /// Timeout for single request/response calls (not the push channel)
    pub request_timeout: Duration,
}

/// Timing of one booking session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a reservation stays valid after creation
    pub reservation_ttl: Duration,
    /// Readiness polling schedule
    pub poll: PollPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::from_secs(60),
            poll: PollPolicy::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            booking_url: "http://localhost:8080".to_string(),
            payments_url: "http://localhost:4040".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        let poll = PollPolicy::builder()
            .max_attempts(
                lookup("SEATBOOK_POLL_MAX_ATTEMPTS")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(defaults.session.poll.max_attempts),
            )
            .step(Duration::from_millis(number("SEATBOOK_POLL_STEP_MS", 1000)))
            .max_jitter(Duration::from_millis(number("SEATBOOK_POLL_JITTER_MS", 500)))
            .build();

        Self {
            api: ApiConfig {
                booking_url: lookup("SEATBOOK_BOOKING_URL").unwrap_or(defaults.api.booking_url),
                payments_url: lookup("SEATBOOK_PAYMENTS_URL").unwrap_or(defaults.api.payments_url),
                request_timeout: Duration::from_secs(number("SEATBOOK_REQUEST_TIMEOUT_SECS", 10)),
            },
            session: SessionConfig {
                reservation_ttl: Duration::from_secs(number("SEATBOOK_RESERVATION_TTL_SECS", 60)),
                poll,
            },
            shutdown_timeout: Duration::from_secs(number("SEATBOOK_SHUTDOWN_TIMEOUT_SECS", 5)),
        }
    }

    /// Check values that would make the client misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable URL, a zero attempt budget, a zero
    /// reservation window or a zero request timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("SEATBOOK_BOOKING_URL", &self.api.booking_url),
            ("SEATBOOK_PAYMENTS_URL", &self.api.payments_url),
        ] {
            if reqwest::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidUrl {
                    name,
                    value: value.clone(),
                });
            }
        }

        if self.session.poll.max_attempts == 0 {
            return Err(ConfigError::MustBePositive {
                name: "SEATBOOK_POLL_MAX_ATTEMPTS",
            });
        }
        if self.session.reservation_ttl.is_zero() {
            return Err(ConfigError::MustBePositive {
                name: "SEATBOOK_RESERVATION_TTL_SECS",
            });
        }
        if self.api.request_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                name: "SEATBOOK_REQUEST_TIMEOUT_SECS",
            });
        }
        Ok(())
    }
}
