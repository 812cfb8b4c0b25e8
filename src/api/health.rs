//! Shared health state for the /health endpoint.
//! Updated by the dashboard handlers after every load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;

#[derive(Default)]
pub struct HealthState {
    loads_ok: AtomicU64,
    loads_failed: AtomicU64,
    /// Unix millis of the last successful load (0 = none).
    last_load_at_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.loads_ok.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.last_load_at_ms.store(now, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: String) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error);
        }
    }

    pub fn loads_ok(&self) -> u64 {
        self.loads_ok.load(Ordering::Relaxed)
    }

    pub fn loads_failed(&self) -> u64 {
        self.loads_failed.load(Ordering::Relaxed)
    }

    pub fn last_load_at_ms(&self) -> Option<u64> {
        Some(self.last_load_at_ms.load(Ordering::Relaxed)).filter(|ms| *ms > 0)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}
