use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);
pub const DEFAULT_SERVER_RETRIES: u32 = 3;
pub const DEFAULT_NETWORK_RETRIES: u32 = 1;

/// How often, and after how long, a failed call is tried again.
///
/// Server errors back off exponentially from `base_delay`, doubling per
/// attempt up to `max_delay`. Network errors are retried after `base_delay`.
/// Client errors, rate limiting, decode and validation failures are final.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub server_retries: u32,
    pub network_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            server_retries: DEFAULT_SERVER_RETRIES,
            network_retries: DEFAULT_NETWORK_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            server_retries: 0,
            network_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Delay before retry number `retry` (0-based), or `None` to give up.
    pub fn delay_for(&self, err: &ApiError, retry: u32) -> Option<Duration> {
        match err {
            ApiError::Server { .. } if retry < self.server_retries => {
                let factor = 2u32.saturating_pow(retry);
                Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
            }
            ApiError::Network(_) if retry < self.network_retries => Some(self.base_delay),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn server() -> ApiError {
        ApiError::Server {
            status: 502,
            message: String::new(),
        }
    }

    #[test]
    fn server_errors_back_off_exponentially() {
        let p = RetryPolicy::default();
        let delays: Vec<_> = (0..4).map(|i| p.delay_for(&server(), i)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(500)),
                Some(Duration::from_millis(1000)),
                Some(Duration::from_millis(2000)),
                None,
            ]
        );
    }

    #[test]
    fn backoff_is_capped() {
        let p = RetryPolicy {
            server_retries: 10,
            ..RetryPolicy::default()
        };
        assert_eq!(p.delay_for(&server(), 9), Some(DEFAULT_MAX_DELAY));
    }

    #[test]
    fn only_transient_errors_retry() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(&ApiError::Network("reset".into()), 0), Some(DEFAULT_BASE_DELAY));
        assert_eq!(p.delay_for(&ApiError::Network("reset".into()), 1), None);
        assert_eq!(p.delay_for(&ApiError::from_status(404, ""), 0), None);
        assert_eq!(p.delay_for(&ApiError::RateLimited { retry_after: None }, 0), None);
        assert_eq!(p.delay_for(&ApiError::Decode("x".into()), 0), None);
    }
}
