//! Exponential backoff with a total elapsed-time budget.

use std::time::Duration;

use common::BackoffConfig;

/// Produces the delays between consumer retries.
///
/// Each delay is the previous one times the multiplier, capped at `max`.
/// Once the delays handed out add up to `max_elapsed`, the backoff stops and
/// the caller is expected to give up on the message.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current: Duration,
    elapsed: Duration,
}

impl ExponentialBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            config: config.clone(),
            current: config.initial,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns the next delay, or `None` when the budget is spent.
    ///
    /// The last delay is shortened so the total never exceeds `max_elapsed`.
    /// A schedule that cannot make progress (a zero delay) is treated as spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let remaining = self.config.max_elapsed.saturating_sub(self.elapsed);
        let delay = self.current.min(self.config.max).min(remaining);
        if delay.is_zero() {
            return None;
        }

        self.elapsed += delay;
        let grown = self.current.as_secs_f64() * self.config.multiplier;
        self.current = Duration::from_secs_f64(grown.min(self.config.max.as_secs_f64()));
        Some(delay)
    }

    /// Sum of the delays handed out so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delays(config: &BackoffConfig) -> Vec<u64> {
        let mut backoff = ExponentialBackoff::new(config);
        std::iter::from_fn(|| backoff.next_delay())
            .map(|d| d.as_millis() as u64)
            .collect()
    }

    #[test]
    fn test_default_schedule() {
        let schedule = delays(&BackoffConfig::default());
        assert_eq!(
            schedule,
            vec![1000, 2000, 4000, 8000, 10_000, 10_000, 10_000, 10_000, 5000]
        );
    }

    #[test]
    fn test_budget_is_respected() {
        let config = BackoffConfig {
            initial: Duration::from_millis(10),
            multiplier: 2.0,
            max: Duration::from_millis(40),
            max_elapsed: Duration::from_millis(100),
        };
        let mut backoff = ExponentialBackoff::new(&config);
        while backoff.next_delay().is_some() {}
        assert_eq!(backoff.elapsed(), config.max_elapsed);
        assert_eq!(delays(&config), vec![10, 20, 40, 30]);
    }

    #[test]
    fn test_zero_budget_never_waits() {
        let config = BackoffConfig {
            max_elapsed: Duration::ZERO,
            ..BackoffConfig::default()
        };
        assert!(delays(&config).is_empty());
    }

    #[test]
    fn test_default_schedule_stays_within_budget() {
        let total: u64 = delays(&BackoffConfig::default()).iter().sum();
        assert_eq!(total, 60_000);
    }

    #[test]
    fn test_zero_initial_delay_still_runs_out() {
        let config = BackoffConfig {
            initial: Duration::ZERO,
            ..BackoffConfig::default()
        };
        let mut backoff = ExponentialBackoff::new(&config);
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.elapsed(), Duration::ZERO);
    }
}
