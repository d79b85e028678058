//! Success counters and latency samples for relay operations.

use std::{collections::BTreeMap, fmt::Write, time::Duration};

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Register,
    Send,
    Inbox,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Register => "Register",
            Self::Send => "Send",
            Self::Inbox => "Inbox",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub success: u64,
    pub failed: u64,
}

impl Counts {
    pub fn total(&self) -> u64 {
        self.success + self.failed
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatencySummary {
    pub samples: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// Nearest-rank style: the sample at `floor(len * q)` of the sorted set.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let at = |q: f64| {
            let idx = ((sorted.len() as f64) * q) as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        Some(Self {
            samples: sorted.len(),
            avg_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50_ms: sorted[sorted.len() / 2],
            p95_ms: at(0.95),
            p99_ms: at(0.99),
        })
    }
}

#[derive(Default)]
struct Inner {
    counts: BTreeMap<Operation, Counts>,
    latencies_ms: BTreeMap<Operation, Vec<f64>>,
}

/// Shared by every task of a harness run.
#[derive(Default)]
pub struct Metrics {
    inner: Mutex<Inner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op: Operation, ok: bool, latency: Duration) {
        let mut inner = self.inner.lock();
        let counts = inner.counts.entry(op).or_default();
        if ok {
            counts.success += 1;
        } else {
            counts.failed += 1;
        }
        inner
            .latencies_ms
            .entry(op)
            .or_default()
            .push(latency.as_secs_f64() * 1000.0);
    }

    pub fn counts(&self, op: Operation) -> Counts {
        self.inner.lock().counts.get(&op).copied().unwrap_or_default()
    }

    pub fn latency(&self, op: Operation) -> Option<LatencySummary> {
        let inner = self.inner.lock();
        inner
            .latencies_ms
            .get(&op)
            .and_then(|s| LatencySummary::from_samples(s))
    }

    /// Human-readable results table.
    pub fn render(&self) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, "Success rates:");
        for (op, c) in &inner.counts {
            let _ = writeln!(out, "   {:<10} {}/{}", format!("{}:", op.label()), c.success, c.total());
        }
        let _ = writeln!(out, "Latency (ms):");
        for (op, samples) in &inner.latencies_ms {
            if let Some(s) = LatencySummary::from_samples(samples) {
                let _ = writeln!(
                    out,
                    "   {:<10} - avg: {:6.2}ms  p50: {:6.2}ms  p95: {:6.2}ms  p99: {:6.2}ms",
                    op.label(),
                    s.avg_ms,
                    s.p50_ms,
                    s.p95_ms,
                    s.p99_ms
                );
            }
        }
        out
    }
}
