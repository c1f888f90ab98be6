//! Passive AI metrics registry (§4.1.1), grounded on the teacher's
//! `health.rs` rolling tracker but simplified to the spec's "dashmap-backed
//! rolling counter set" reset per job rather than a time-windowed status
//! derivation — there is no REDESIGN FLAG asking C1 to act on these numbers,
//! only to record them.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricEntry {
    pub calls_ok: u64,
    pub calls_timeout: u64,
    pub calls_error: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub total_elapsed_ms: u64,
}

impl MetricEntry {
    pub fn total_calls(&self) -> u64 {
        self.calls_ok + self.calls_timeout + self.calls_error
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSnapshot {
    pub provider: String,
    pub op: String,
    pub entry: MetricEntry,
}

/// Keyed by `(provider, op)` (§4.1.1). `model` is recorded but not part of
/// the key — a provider may rotate models without fragmenting the counters.
pub struct ProviderMetrics {
    entries: DashMap<(String, String), MetricEntry>,
}

impl ProviderMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    pub fn record(
        &self,
        provider: &str,
        _model: &str,
        op: &str,
        tokens_in: u32,
        tokens_out: u32,
        elapsed: Duration,
        outcome: Outcome,
    ) {
        let mut entry = self
            .entries
            .entry((provider.to_string(), op.to_string()))
            .or_default();
        match outcome {
            Outcome::Ok => entry.calls_ok += 1,
            Outcome::Timeout => entry.calls_timeout += 1,
            Outcome::Error => entry.calls_error += 1,
        }
        entry.tokens_in += tokens_in as u64;
        entry.tokens_out += tokens_out as u64;
        entry.total_elapsed_ms += elapsed.as_millis() as u64;
    }

    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.entries
            .iter()
            .map(|e| MetricSnapshot {
                provider: e.key().0.clone(),
                op: e.key().1.clone(),
                entry: e.value().clone(),
            })
            .collect()
    }

    /// Reset per job (§5 "AI metrics counters: guarded by a mutex, reset per job").
    pub fn reset(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_aggregates_per_provider_op() {
        let m = ProviderMetrics::new();
        m.record("openai", "gpt-4o-mini", "chat", 10, 20, Duration::from_millis(100), Outcome::Ok);
        m.record("openai", "gpt-4o-mini", "chat", 5, 15, Duration::from_millis(50), Outcome::Error);
        let snap = m.snapshot();
        assert_eq!(snap.len(), 1);
        let entry = &snap[0].entry;
        assert_eq!(entry.calls_ok, 1);
        assert_eq!(entry.calls_error, 1);
        assert_eq!(entry.tokens_in, 15);
        assert_eq!(entry.total_elapsed_ms, 150);
    }

    #[test]
    fn distinct_ops_do_not_collide() {
        let m = ProviderMetrics::new();
        m.record("openai", "m", "chat", 1, 1, Duration::from_millis(1), Outcome::Ok);
        m.record("openai", "m", "embed", 1, 1, Duration::from_millis(1), Outcome::Ok);
        assert_eq!(m.snapshot().len(), 2);
    }

    #[test]
    fn reset_clears_all_counters() {
        let m = ProviderMetrics::new();
        m.record("openai", "m", "chat", 1, 1, Duration::from_millis(1), Outcome::Ok);
        m.reset();
        assert!(m.snapshot().is_empty());
    }
}
