//! Exponential backoff between reconnect attempts.

use std::time::Duration;

/// Next retry delay: double the current one, capped at `max`.
///
/// Saturates instead of overflowing, so any `current` is accepted.
pub fn next_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Delay that precedes the `attempt`-th consecutive reconnect (1-based):
/// `min(initial * 2^(attempt - 1), max)`. Attempt 0 is treated as attempt 1.
pub fn delay_for_attempt(initial: Duration, max: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    initial.saturating_mul(1u32 << shift).min(max)
}
