//! Backoff configuration for the HTTP caller.

use rand::Rng;
use std::time::Duration;

/// Retry policy for transient RPC transport failures.
///
/// Only errors classified retryable by
/// [`RpcError::is_retryable`](crate::RpcError::is_retryable) are retried,
/// and only inside [`HttpRpcCaller`](crate::HttpRpcCaller): once an
/// outcome reaches the cache it is final.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
    /// Jitter applied to each delay, to avoid synchronized retry bursts.
    pub jitter: JitterMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_retries: 3,
            jitter: JitterMode::Full,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before the next attempt, grown from `current_delay` and
    /// jittered.
    pub fn next_backoff(&self, attempt: u32, current_delay: Duration) -> Duration {
        let base = if attempt == 0 {
            self.base_delay
        } else {
            let grown = current_delay.as_secs_f64() * self.multiplier;
            Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
        };
        self.jitter.apply(base)
    }
}

/// How much randomness to mix into a backoff delay.
#[derive(Clone, Debug, Default)]
pub enum JitterMode {
    /// Use the exact computed delay.
    None,
    /// Random delay between zero and the computed delay.
    #[default]
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterMode {
    fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        match self {
            JitterMode::None => delay,
            JitterMode::Full => Duration::from_secs_f64(rng.gen::<f64>() * delay.as_secs_f64()),
            JitterMode::Equal => {
                let half = delay.as_secs_f64() / 2.0;
                Duration::from_secs_f64(half + rng.gen::<f64>() * half)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_bounded() {
        let config = RetryConfig::default().with_max_retries(2);
        assert!(config.should_retry(0));
        assert!(config.should_retry(1));
        assert!(!config.should_retry(2));
        assert!(!RetryConfig::disabled().should_retry(0));
    }

    #[test]
    fn backoff_grows_up_to_the_cap() {
        let config = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            max_retries: 10,
            jitter: JitterMode::None,
        };
        let d0 = config.next_backoff(0, Duration::ZERO);
        let d1 = config.next_backoff(1, d0);
        let d2 = config.next_backoff(2, d1);
        assert_eq!(d0, Duration::from_millis(100));
        assert_eq!(d1, Duration::from_millis(200));
        assert_eq!(d2, Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..100 {
            let full = JitterMode::Full.apply(delay);
            assert!(full <= delay);
            let equal = JitterMode::Equal.apply(delay);
            assert!(equal >= delay / 2 && equal <= delay);
        }
    }
}
