//! Per-attempt metrics reporting.
//!
//! The sink is a write-only collaborator: `record` is synchronous, infallible
//! and fire-and-forget, so it can never block or fail a request.

use crate::types::ProviderId;
use std::fmt;
use std::sync::Mutex;

/// Outcome of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    TransientFail,
    PermanentFail,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Success => "success",
            Outcome::TransientFail => "transient_fail",
            Outcome::PermanentFail => "permanent_fail",
        })
    }
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, provider: ProviderId, latency_ms: u64, tokens: u64, outcome: Outcome);
}

/// Default sink: discards everything.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _: ProviderId, _: u64, _: u64, _: Outcome) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRecord {
    pub provider: ProviderId,
    pub latency_ms: u64,
    pub tokens: u64,
    pub outcome: Outcome,
}

/// In-memory sink for test inspection.
pub struct InMemoryMetrics {
    records: Mutex<Vec<MetricsRecord>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<MetricsRecord> {
        self.records.lock().expect("metrics lock").clone()
    }

    pub fn count(&self, provider: ProviderId, outcome: Outcome) -> usize {
        self.records()
            .iter()
            .filter(|r| r.provider == provider && r.outcome == outcome)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("metrics lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.lock().expect("metrics lock").clear();
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, provider: ProviderId, latency_ms: u64, tokens: u64, outcome: Outcome) {
        self.records.lock().expect("metrics lock").push(MetricsRecord {
            provider,
            latency_ms,
            tokens,
            outcome,
        });
    }
}

/// Sink that emits structured tracing events.
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn record(&self, provider: ProviderId, latency_ms: u64, tokens: u64, outcome: Outcome) {
        tracing::info!(
            provider = provider.as_str(),
            latency_ms,
            tokens,
            outcome = %outcome,
            "llm-relay attempt"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_accumulates_and_filters() {
        let sink = InMemoryMetrics::new();
        sink.record(ProviderId::OpenAi, 10, 5, Outcome::Success);
        sink.record(ProviderId::OpenAi, 20, 0, Outcome::TransientFail);
        sink.record(ProviderId::Llama, 30, 0, Outcome::PermanentFail);

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.count(ProviderId::OpenAi, Outcome::Success), 1);
        assert_eq!(sink.count(ProviderId::OpenAi, Outcome::TransientFail), 1);
        assert_eq!(sink.count(ProviderId::Llama, Outcome::PermanentFail), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
