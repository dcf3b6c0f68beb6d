use crate::contract::{BackoffKind, RetryPolicy};
use std::time::Duration;

/// Delay before the attempt following failed attempt number `attempt` (1-based).
/// Exponential backoff doubles from `delay_ms`; both kinds are capped at
/// `max_delay_ms`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy.delay_ms;
    let delay = match policy.backoff {
        BackoffKind::Fixed => base,
        BackoffKind::Exponential => {
            let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
            base.saturating_mul(factor)
        }
    };
    Duration::from_millis(delay.min(policy.max_delay_ms))
}
