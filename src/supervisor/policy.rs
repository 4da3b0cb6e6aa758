//! What the supervisor does when an initialized worker exits.

use std::time::Duration;

use rand::Rng;

use crate::config::schema::{RestartStrategy, SupervisorConfig};
use crate::supervisor::launcher::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Fork a replacement now.
    Now,
    /// Fork a replacement after the delay.
    After(Duration),
}

pub trait RestartPolicy: Send {
    /// Called for every exit after initialization while the fleet is running.
    fn on_exit(&mut self, reason: &ExitReason) -> RestartDecision;

    /// Called whenever a worker reports ready.
    fn on_ready(&mut self) {}
}

/// Refork immediately, without limit.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysRestart;

impl RestartPolicy for AlwaysRestart {
    fn on_exit(&mut self, _reason: &ExitReason) -> RestartDecision {
        RestartDecision::Now
    }
}

/// Exponential delay between consecutive exits, reset by readiness.
#[derive(Debug, Clone)]
pub struct BackoffRestart {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl BackoffRestart {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            attempt: 0,
        }
    }
}

impl RestartPolicy for BackoffRestart {
    fn on_exit(&mut self, _reason: &ExitReason) -> RestartDecision {
        self.attempt = self.attempt.saturating_add(1);
        RestartDecision::After(calculate_backoff(self.attempt, self.base_ms, self.max_ms))
    }

    fn on_ready(&mut self) {
        self.attempt = 0;
    }
}

pub fn from_config(config: &SupervisorConfig) -> Box<dyn RestartPolicy> {
    match config.restart {
        RestartStrategy::Immediate => Box::new(AlwaysRestart),
        RestartStrategy::Backoff => Box::new(BackoffRestart::new(config.base_delay_ms, config.max_delay_ms)),
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Jitter: 0 to 10% of the delay
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn test_always_restart_is_immediate() {
        let mut policy = AlwaysRestart;
        for _ in 0..100 {
            assert_eq!(policy.on_exit(&ExitReason::Code(1)), RestartDecision::Now);
        }
    }

    #[test]
    fn test_backoff_grows_and_resets_on_ready() {
        let mut policy = BackoffRestart::new(100, 10_000);
        let delay = |d: RestartDecision| match d {
            RestartDecision::After(d) => d,
            RestartDecision::Now => Duration::ZERO,
        };

        let first = delay(policy.on_exit(&ExitReason::Graceful));
        let second = delay(policy.on_exit(&ExitReason::Graceful));
        assert!(first < Duration::from_millis(200));
        assert!(second >= Duration::from_millis(200));

        policy.on_ready();
        let reset = delay(policy.on_exit(&ExitReason::Graceful));
        assert!(reset < Duration::from_millis(200));
    }
}
