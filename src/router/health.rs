//! Per-provider circuit breaker state.

use crate::config::BreakerPolicy;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct HealthState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Point-in-time view of one provider's circuit.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub consecutive_failures: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

/// Runtime health of a single provider.
///
/// Owned exclusively by the router; adapters never touch it. Each provider
/// has its own lock so unrelated providers are never serialized against each
/// other.
///
/// An open circuit deprioritizes the provider in the fallback chain rather
/// than excluding it — recovery probing stays possible. A single success
/// closes the circuit and zeroes the failure counter; an elapsed cooldown
/// closes it lazily on the next inspection.
pub struct ProviderHealth {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<HealthState>,
}

impl ProviderHealth {
    pub fn new(policy: &BreakerPolicy) -> Self {
        Self {
            threshold: policy.failure_threshold.max(1),
            cooldown: policy.cooldown(),
            state: Mutex::new(HealthState {
                consecutive_failures: 0,
                open_until: None,
            }),
        }
    }

    /// Whether the circuit is currently open. Closes it first when the
    /// cooldown window has elapsed.
    pub fn is_open(&self) -> bool {
        let mut st = match self.state.lock() {
            Ok(st) => st,
            // Poisoned state: treat as closed rather than wedging the chain.
            Err(_) => return false,
        };
        match st.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                st.open_until = None;
                st.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    pub fn on_success(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.consecutive_failures = 0;
            st.open_until = None;
        }
    }

    pub fn on_failure(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            if st.consecutive_failures >= self.threshold {
                st.open_until = Some(Instant::now() + self.cooldown);
            }
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let now = Instant::now();
        match self.state.lock() {
            Ok(st) => HealthSnapshot {
                consecutive_failures: st.consecutive_failures,
                open_remaining_ms: st.open_until.and_then(|until| {
                    (until > now).then(|| (until - now).as_millis() as u64)
                }),
            },
            Err(_) => HealthSnapshot {
                consecutive_failures: 0,
                open_remaining_ms: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(threshold: u32, cooldown_secs: u64) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: threshold,
            cooldown_secs,
        }
    }

    #[test]
    fn opens_at_threshold() {
        let health = ProviderHealth::new(&policy(3, 60));
        health.on_failure();
        health.on_failure();
        assert!(!health.is_open());
        health.on_failure();
        assert!(health.is_open());
        assert!(health.snapshot().open_remaining_ms.is_some());
    }

    #[test]
    fn success_closes_immediately_and_resets_counter() {
        let health = ProviderHealth::new(&policy(2, 60));
        health.on_failure();
        health.on_failure();
        assert!(health.is_open());

        health.on_success();
        assert!(!health.is_open());
        assert_eq!(health.snapshot().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn cooldown_elapse_closes_lazily() {
        let health = ProviderHealth::new(&BreakerPolicy {
            failure_threshold: 1,
            cooldown_secs: 0,
        });
        health.on_failure();
        // zero cooldown: open window has already elapsed
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!health.is_open());
        assert_eq!(health.snapshot().consecutive_failures, 0);
    }
}
