use std::time::{Duration, Instant};

use curator_logging::{curator_debug, curator_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { until: Instant },
    /// Cooldown elapsed; the next submission is a trial.
    HalfOpen,
}

/// Consecutive-failure circuit breaker guarding the classification service.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failures: u32,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            failures: 0,
            state: BreakerState::Closed,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// `Err(retry_at)` while open.
    pub fn admit(&mut self, now: Instant) -> Result<(), Instant> {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open { until } if now >= until => {
                curator_debug!("breaker half-open, allowing a trial batch");
                self.state = BreakerState::HalfOpen;
                Ok(())
            }
            BreakerState::Open { until } => Err(until),
        }
    }

    pub fn record_success(&mut self) {
        if self.state != BreakerState::Closed {
            curator_info!("breaker closed after successful trial");
        }
        self.failures = 0;
        self.state = BreakerState::Closed;
    }

    /// Returns the reopen instant when this failure opened the breaker.
    pub fn record_failure(&mut self, now: Instant) -> Option<Instant> {
        self.failures = self.failures.saturating_add(1);
        let trip = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.failures >= self.threshold,
            BreakerState::Open { .. } => false,
        };
        if trip {
            let until = now + self.cooldown;
            curator_info!(
                "breaker open after {} consecutive failure(s); retry in {:?}",
                self.failures,
                self.cooldown
            );
            self.state = BreakerState::Open { until };
            Some(until)
        } else {
            None
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_and_recovers_through_half_open() {
        let t0 = Instant::now();
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(10));

        assert_eq!(breaker.record_failure(t0), None);
        assert_eq!(breaker.state(), BreakerState::Closed);
        let until = t0 + Duration::from_secs(10);
        assert_eq!(breaker.record_failure(t0), Some(until));
        assert_eq!(breaker.state(), BreakerState::Open { until });
        assert_eq!(breaker.admit(t0 + Duration::from_secs(9)), Err(until));

        assert_eq!(breaker.admit(until), Ok(()));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn failed_trial_reopens() {
        let t0 = Instant::now();
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(5));
        breaker.record_failure(t0);
        let reopen_at = t0 + Duration::from_secs(5);
        assert_eq!(breaker.admit(reopen_at), Ok(()));
        breaker.record_failure(reopen_at);
        assert_eq!(
            breaker.state(),
            BreakerState::Open {
                until: reopen_at + Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn success_resets_the_failure_run() {
        let t0 = Instant::now();
        let mut breaker = CircuitBreaker::default();
        breaker.record_failure(t0);
        breaker.record_failure(t0);
        breaker.record_success();
        breaker.record_failure(t0);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
