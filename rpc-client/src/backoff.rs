//! Retry policy for the request transport.
//!
//! The policy is linear: after the `n`-th failed attempt the transport waits
//! `delay * n` before trying again, up to `max_attempts` attempts in total.
//! Whether a failure is worth another attempt is decided by [`classify`].

use {
    std::time::Duration,
    trv1_rpc_client_api::{
        client_error::{ErrorKind, RpcError},
        custom_error,
    },
};

/// Outcome of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient: wait and try again (possibly on another endpoint).
    Retry,
    /// Permanent: surface the error immediately.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay multiplied by the attempt number.
    pub delay: Duration,
    /// Total attempts, including the first one.
    pub max_attempts: usize,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::linear(Duration::from_millis(500), 5)
    }
}

impl BackoffPolicy {
    pub const fn linear(delay: Duration, max_attempts: usize) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Delay to wait after the failed attempt numbered `attempt` (1-based).
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt).unwrap_or(u32::MAX);
        self.delay.saturating_mul(factor)
    }

    /// Whether another attempt may follow the failed attempt `attempt`.
    pub fn should_retry(&self, attempt: usize, decision: RetryDecision) -> bool {
        decision == RetryDecision::Retry && attempt < self.max_attempts
    }
}

/// Sorts a failed attempt into retryable or fatal.
pub fn classify(kind: &ErrorKind) -> RetryDecision {
    match kind {
        // timeouts, refused connections, truncated bodies
        ErrorKind::Reqwest(_) | ErrorKind::SerdeJson(_) => RetryDecision::Retry,
        ErrorKind::HttpStatus { status, .. } => {
            if *status == 429 || *status >= 500 {
                RetryDecision::Retry
            } else {
                RetryDecision::Fatal
            }
        }
        ErrorKind::RpcError(RpcError::RpcResponseError { code, .. }) => {
            if custom_error::is_rate_limited(*code) || custom_error::is_node_unhealthy(*code) {
                RetryDecision::Retry
            } else {
                RetryDecision::Fatal
            }
        }
        ErrorKind::PaymentRequired(_)
        | ErrorKind::RpcError(_)
        | ErrorKind::TransportExhausted { .. }
        | ErrorKind::Unknown
        | ErrorKind::Custom(_) => RetryDecision::Fatal,
    }
}

/// Whether the failure was the remote side throttling us.
pub fn is_rate_limited(kind: &ErrorKind) -> bool {
    match kind {
        ErrorKind::HttpStatus { status, .. } => *status == 429,
        ErrorKind::RpcError(RpcError::RpcResponseError { code, .. }) => {
            custom_error::is_rate_limited(*code)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    fn response_error(code: i64) -> ErrorKind {
        ErrorKind::RpcError(RpcError::RpcResponseError {
            code,
            message: String::new(),
            data: None,
        })
    }

    #[test]
    fn test_linear_delays() {
        let policy = BackoffPolicy::linear(Duration::from_millis(100), 3);
        assert_eq!(policy.next_delay(1), Duration::from_millis(100));
        assert_eq!(policy.next_delay(2), Duration::from_millis(200));
        assert_eq!(policy.next_delay(3), Duration::from_millis(300));
        assert!(policy.next_delay(1) < policy.next_delay(2));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = BackoffPolicy::linear(Duration::MAX, 3);
        assert_eq!(policy.next_delay(usize::MAX), Duration::MAX);
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = BackoffPolicy::linear(Duration::from_millis(1), 3);
        assert!(policy.should_retry(1, RetryDecision::Retry));
        assert!(policy.should_retry(2, RetryDecision::Retry));
        assert!(!policy.should_retry(3, RetryDecision::Retry));
        assert!(!policy.should_retry(1, RetryDecision::Fatal));
    }

    #[test_case(response_error(429), RetryDecision::Retry; "rate limited")]
    #[test_case(response_error(-32429), RetryDecision::Retry; "rate limited server code")]
    #[test_case(response_error(-32005), RetryDecision::Retry; "no healthy node")]
    #[test_case(response_error(-32602), RetryDecision::Fatal; "invalid params")]
    #[test_case(response_error(-32000), RetryDecision::Fatal; "other remote code")]
    #[test_case(ErrorKind::HttpStatus { status: 429, body: String::new() }, RetryDecision::Retry; "http too many requests")]
    #[test_case(ErrorKind::HttpStatus { status: 503, body: String::new() }, RetryDecision::Retry; "http unavailable")]
    #[test_case(ErrorKind::HttpStatus { status: 404, body: String::new() }, RetryDecision::Fatal; "http not found")]
    #[test_case(ErrorKind::PaymentRequired(String::new()), RetryDecision::Fatal; "payment required")]
    #[test_case(ErrorKind::Unknown, RetryDecision::Fatal; "unknown")]
    fn test_classify(kind: ErrorKind, expected: RetryDecision) {
        assert_eq!(classify(&kind), expected);
    }

    #[test]
    fn test_is_rate_limited() {
        assert!(is_rate_limited(&response_error(429)));
        assert!(is_rate_limited(&ErrorKind::HttpStatus {
            status: 429,
            body: String::new()
        }));
        assert!(!is_rate_limited(&response_error(-32005)));
    }
}
