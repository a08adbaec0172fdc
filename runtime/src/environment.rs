//! Production implementations of environment traits that need real randomness.

use rand::Rng;
use seatbook_core::environment::Jitter;
use std::time::Duration;

/// Uniform random jitter from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn jitter(&self, max: Duration) -> Duration {
        // Jitter bounds are a few hundred milliseconds; u64 millis cannot overflow here.
        #[allow(clippy::cast_possible_truncation)]
        let max_ms = max.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}
