//! Backoff between reconnection attempts of a fetch engine.
//!
//! All of the constructors and configuration functions are `const`.
//!
//! # Example
//!
//! ```
//! # use import_scheduler::engine::backoff::{ReconnectBackoff, Jitter};
//! # use std::time::Duration;
//! let backoff = ReconnectBackoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .with_jitter(Jitter::Relative(0.1));
//!
//! assert!(backoff.delay(1) >= Duration::from_millis(90));
//! assert!(backoff.delay(1) <= Duration::from_millis(110));
//! // Note the max here is the max plus max jitter
//! assert!(backoff.delay(10) <= Duration::from_millis(2200));
//! ```
use std::time::Duration;

use rand::Rng;

/// A random jitter to be applied to a given delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// A random jitter in the range `-delta =< jitter =< delta`.
    Absolute(Duration),
    /// A random jitter as a proportion of the current delay.
    Relative(f64),
}

impl Jitter {
    fn apply(&self, value: Duration) -> Duration {
        let millis = i64::try_from(value.as_millis()).unwrap_or(i64::MAX);
        let spread = match self {
            Self::Absolute(delta) => i64::try_from(delta.as_millis()).unwrap_or(i64::MAX),
            Self::Relative(ratio) => (millis as f64 * ratio).round() as i64,
        }
        .saturating_abs();
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(millis.saturating_add(jitter).max(0) as u64)
    }
}

/// Exponential backoff, doubling the base delay with every failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Option<Duration>,
    jitter: Option<Jitter>,
}

impl ReconnectBackoff {
    /// The delay used between attempts by [`super::simulated::SimulatedEngine`] by default.
    pub const DEFAULT: ReconnectBackoff = ReconnectBackoff::exponential(Duration::from_millis(250))
        .with_max(Duration::from_secs(8))
        .with_jitter(Jitter::Relative(0.1));

    pub const fn exponential(base: Duration) -> Self {
        Self {
            base,
            max: None,
            jitter: None,
        }
    }

    /// Clamps the delay returned by [`ReconnectBackoff::delay`] to `max` before jitter.
    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = Some(max);
        self
    }

    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// The delay before the next attempt after `attempt` attempts have failed.
    pub fn delay(&self, attempt: u16) -> Duration {
        let factor = 2u32.checked_pow(u32::from(attempt.saturating_sub(1)));
        let mut delay = factor
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(Duration::MAX);
        if let Some(max) = self.max {
            delay = delay.min(max);
        }
        match self.jitter {
            Some(jitter) => jitter.apply(delay),
            None => delay,
        }
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::DEFAULT
    }
}
