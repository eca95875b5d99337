//! Shared retry helpers for the transport layer.

use std::time::Duration;

/// Maximum number of retries for transient connection failures.
pub(crate) const MAX_CONNECT_RETRIES: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_millis(100);
const BACKOFF_CAP: Duration = Duration::from_secs(2);

/// Exponential backoff delay for the given retry attempt (0-based).
///
/// 100ms, 200ms, 400ms, ... capped at 2s. Kept short: these retries only
/// cover failures to establish a connection, not request-level failures.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_CAP)
}

/// Whether a `reqwest` error is a transient connection failure worth
/// retrying.
///
/// Deliberately narrow: anything past the connect phase (timeouts, resets
/// mid-response) is excluded because the server may already have acted on
/// the request.
pub(crate) fn is_retryable_connect(err: &reqwest::Error) -> bool {
    err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(2), Duration::from_millis(400));
        assert_eq!(backoff_delay(10), Duration::from_secs(2));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(2));
    }
}
