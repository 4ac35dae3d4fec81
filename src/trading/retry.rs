//! Bounded retry policy for entry orders.
//!
//! A failed entry leaves the symbol flat; the next attempt is only allowed
//! once the backoff delay has elapsed on a later tick. After
//! `entry_max_attempts` consecutive failures entries stay suspended until the
//! daily reset. Exits never go through this policy.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};

use super::config::RetryConfig;

/// Entry retry gate for one symbol.
#[derive(Debug)]
pub struct EntryRetry {
    backoff: ExponentialBackoff,
    max_attempts: u32,
    consecutive_failures: u32,
    next_allowed: Option<DateTime<Utc>>,
}

impl EntryRetry {
    pub fn new(config: &RetryConfig) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_secs(config.entry_initial_backoff_secs))
            .with_max_interval(std::time::Duration::from_secs(config.entry_max_backoff_secs))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        Self {
            backoff,
            max_attempts: config.entry_max_attempts,
            consecutive_failures: 0,
            next_allowed: None,
        }
    }

    /// Whether a new entry attempt may be made at `now`.
    pub fn allowed(&self, now: DateTime<Utc>) -> bool {
        self.consecutive_failures < self.max_attempts
            && self.next_allowed.map_or(true, |t| now >= t)
    }

    pub fn is_exhausted(&self) -> bool {
        self.consecutive_failures >= self.max_attempts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn next_allowed(&self) -> Option<DateTime<Utc>> {
        self.next_allowed
    }

    /// Register a failed entry and schedule the next allowed attempt.
    pub fn on_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        let delay = self
            .backoff
            .next_backoff()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(chrono::Duration::zero);
        self.next_allowed = Some(now + delay);
    }

    pub fn on_success(&mut self) {
        self.reset();
    }

    /// Clear failures and backoff state (successful entry or new session).
    pub fn reset(&mut self) {
        self.backoff.reset();
        self.consecutive_failures = 0;
        self.next_allowed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn config() -> RetryConfig {
        RetryConfig {
            entry_initial_backoff_secs: 30,
            entry_max_backoff_secs: 100,
            entry_max_attempts: 3,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut retry = EntryRetry::new(&config());
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 4, 0, 0).unwrap();

        assert!(retry.allowed(t0));

        retry.on_failure(t0);
        assert_eq!(retry.next_allowed(), Some(t0 + Duration::seconds(30)));
        assert!(!retry.allowed(t0 + Duration::seconds(29)));
        assert!(retry.allowed(t0 + Duration::seconds(30)));

        let t1 = t0 + Duration::seconds(30);
        retry.on_failure(t1);
        assert_eq!(retry.next_allowed(), Some(t1 + Duration::seconds(60)));

        let t2 = t1 + Duration::seconds(60);
        retry.on_failure(t2);
        assert!(retry.is_exhausted());
        assert!(!retry.allowed(t2 + Duration::hours(1)));
    }

    #[test]
    fn test_success_resets() {
        let mut retry = EntryRetry::new(&config());
        let t0 = Utc.with_ymd_and_hms(2025, 6, 2, 4, 0, 0).unwrap();

        retry.on_failure(t0);
        retry.on_failure(t0);
        retry.on_success();

        assert_eq!(retry.consecutive_failures(), 0);
        assert!(retry.allowed(t0));

        retry.on_failure(t0);
        assert_eq!(retry.next_allowed(), Some(t0 + Duration::seconds(30)));
    }
}
