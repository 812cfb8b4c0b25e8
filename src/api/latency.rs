//! Per-page fetch latency. The fetcher records one sample for every page it
//! reads; `/stats/latency` reports the percentiles.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Upper bound of the histogram, in microseconds (10 minutes).
const MAX_US: u64 = 600_000_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

pub struct PageLatency {
    micros: Mutex<Histogram<u64>>,
}

impl PageLatency {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_US, 3).expect("valid histogram bounds");
        Self {
            micros: Mutex::new(histogram),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        let us = (elapsed.as_micros() as u64).clamp(1, MAX_US);
        if let Ok(mut h) = self.micros.lock() {
            h.saturating_record(us);
        }
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        let Ok(h) = self.micros.lock() else {
            return LatencySnapshot::default();
        };
        if h.is_empty() {
            return LatencySnapshot::default();
        }
        let at = |q: f64| Some(h.value_at_quantile(q) as f64 / 1000.0);
        LatencySnapshot {
            p50_ms: at(0.50),
            p95_ms: at(0.95),
            p99_ms: at(0.99),
            sample_count: h.len(),
        }
    }
}

impl Default for PageLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_no_percentiles() {
        assert_eq!(PageLatency::new().snapshot(), LatencySnapshot::default());
    }

    #[test]
    fn reports_milliseconds() {
        let latency = PageLatency::new();
        for ms in [20, 40, 40, 40, 900] {
            latency.record(Duration::from_millis(ms));
        }
        let snap = latency.snapshot();
        assert_eq!(snap.sample_count, 5);
        assert!((snap.p50_ms.unwrap() - 40.0).abs() < 0.1);
        assert!((snap.p99_ms.unwrap() - 900.0).abs() < 1.0);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let latency = PageLatency::new();
        latency.record(Duration::from_secs(3600));
        latency.record(Duration::ZERO);
        assert_eq!(latency.snapshot().sample_count, 2);
    }
}
