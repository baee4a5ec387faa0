use crate::transport::TransportKind;
use crate::types::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_INTERVAL, IncusError, Result};
use std::time::Duration;

/// Fixed-delay retry policy with a bounded attempt counter.
///
/// One instance is kept per transport kind. The counter goes up on every
/// unsolicited closure or failed request and goes back to zero on success.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    transport: TransportKind,
    attempts: u32,
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(transport: TransportKind, max_attempts: u32, delay: Duration) -> Self {
        Self {
            transport,
            attempts: 0,
            max_attempts,
            delay,
        }
    }

    /// Records a failure and returns the delay before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`IncusError::RetryExhausted`] once the cap has been reached;
    /// the counter is left at the cap.
    pub fn next_delay(&mut self) -> Result<Duration> {
        if self.attempts >= self.max_attempts {
            return Err(IncusError::RetryExhausted {
                transport: self.transport,
                attempts: self.attempts,
            });
        }

        self.attempts += 1;
        Ok(self.delay)
    }

    /// Reset the counter
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            TransportKind::Socket,
            DEFAULT_MAX_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_INTERVAL),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_until_cap() {
        let mut policy = RetryPolicy::new(TransportKind::Poll, 3, Duration::from_millis(250));

        for expected in 1..=3 {
            assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(250));
            assert_eq!(policy.attempts(), expected);
        }

        assert!(policy.is_exhausted());
        match policy.next_delay() {
            Err(IncusError::RetryExhausted {
                transport,
                attempts,
            }) => {
                assert_eq!(transport, TransportKind::Poll);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(policy.attempts(), 3);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut policy = RetryPolicy::default();
        for _ in 0..DEFAULT_MAX_RETRIES {
            policy.next_delay().unwrap();
        }
        assert!(policy.is_exhausted());

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(
            policy.next_delay().unwrap(),
            Duration::from_millis(DEFAULT_RETRY_INTERVAL)
        );
    }

    #[test]
    fn test_zero_cap_never_retries() {
        let mut policy = RetryPolicy::new(TransportKind::Socket, 0, Duration::from_secs(1));
        assert!(policy.next_delay().is_err());
    }
}
