use std::time::Duration;

use coffeebuddy_core::config::BrokerConfig;

/// Exponential backoff between broker attempts.
///
/// `max_retries` counts retries after the first attempt, so a policy with
/// `max_retries = 2` makes at most three requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 25, max_delay_ms: 200 }
    }
}

impl From<&BrokerConfig> for RetryPolicy {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::RetryPolicy;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 25, max_delay_ms: 150 };

        assert_eq!(policy.backoff(0), Duration::from_millis(25));
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(150));
        assert_eq!(policy.backoff(40), Duration::from_millis(150));
    }

    #[test]
    fn attempts_include_the_first_request() {
        assert_eq!(RetryPolicy::default().attempts(), 3);
        assert_eq!(RetryPolicy::none().attempts(), 1);
        assert_eq!(RetryPolicy { max_retries: u32::MAX, ..RetryPolicy::none() }.attempts(), u32::MAX);
    }
}
