use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RetryStrategy {
    /// Fixed wait between attempts, in seconds.
    Linear { interval: u32 },
    /// `base ^ attempt` seconds, capped to one hour.
    Exponential { base: u32 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    /// None retries forever; the queue treats that as configuration error
    /// for destructive jobs.
    pub max_retries: Option<u32>,
}

const MAX_WAIT_SECONDS: u64 = 60 * 60;

impl RetryPolicy {
    /// Seconds to wait before the given attempt (1-based).
    pub fn wait_time(&self, attempt: u32) -> u64 {
        let wait = match self.strategy {
            RetryStrategy::Linear { interval } => interval as u64,
            RetryStrategy::Exponential { base } => {
                (base.max(2) as u64).saturating_pow(attempt.min(16))
            }
        };
        wait.min(MAX_WAIT_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_wait_is_constant() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Linear { interval: 30 },
            max_retries: Some(3),
        };
        assert_eq!(policy.wait_time(1), 30);
        assert_eq!(policy.wait_time(5), 30);
    }

    #[test]
    fn exponential_wait_grows_and_caps() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Exponential { base: 2 },
            max_retries: Some(10),
        };
        assert_eq!(policy.wait_time(1), 2);
        assert_eq!(policy.wait_time(3), 8);
        assert_eq!(policy.wait_time(30), MAX_WAIT_SECONDS);
    }
}
