//! Retry policy and backoff math for outbound API calls.

use rand::Rng;
use std::time::Duration;

/// HTTP statuses retried by default.
pub const DEFAULT_TRANSIENT_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_JITTER_FRACTION: f64 = 0.1;

/// Retry tuning for the request executor. Read-only once built; each
/// executor invocation keeps its own attempt counter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_factor: f64,
    pub jitter_fraction: f64,
    pub transient_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            transient_statuses: DEFAULT_TRANSIENT_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// True when the status is plausibly temporary and worth retrying.
    pub fn is_transient(&self, status: u16) -> bool {
        self.transient_statuses.contains(&status)
    }

    /// Delay inserted after failed attempt `attempt` (1-based), jittered
    /// uniformly within +/- `jitter_fraction`. The first attempt itself
    /// never waits.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.initial_backoff.as_secs_f64() * self.backoff_factor.powi(exponent as i32);
        let jitter = rand::thread_rng().gen_range(-self.jitter_fraction..=self.jitter_fraction);
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }
}
