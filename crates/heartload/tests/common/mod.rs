#![allow(dead_code)]

use heartload::metrics::MetricsSink;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// In-memory sink so tests can assert on what the engine reported.
#[derive(Default)]
pub struct RecordingSink {
    counters: Mutex<HashMap<&'static str, u64>>,
    gauges: Mutex<HashMap<&'static str, i64>>,
    labeled: Mutex<HashMap<(&'static str, String), u64>>,
    stamps: Mutex<Vec<(&'static str, Instant)>>,
}

impl RecordingSink {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn gauge(&self, name: &str) -> i64 {
        self.gauges.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn labeled(&self, name: &str, label: &str) -> u64 {
        self.labeled
            .lock()
            .unwrap()
            .iter()
            .filter(|((n, l), _)| *n == name && l == label)
            .map(|(_, v)| *v)
            .sum()
    }

    /// When each labeled increment of `name` happened, in order.
    pub fn labeled_at(&self, name: &str) -> Vec<Instant> {
        self.stamps
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn labeled_total(&self, name: &str) -> u64 {
        self.labeled
            .lock()
            .unwrap()
            .iter()
            .filter(|((n, _), _)| *n == name)
            .map(|(_, v)| *v)
            .sum()
    }
}

impl MetricsSink for RecordingSink {
    fn inc_counter(&self, name: &'static str) {
        *self.counters.lock().unwrap().entry(name).or_insert(0) += 1;
    }

    fn add_gauge(&self, name: &'static str, delta: i64) {
        *self.gauges.lock().unwrap().entry(name).or_insert(0) += delta;
    }

    fn inc_labeled(&self, name: &'static str, label: &str) {
        self.stamps.lock().unwrap().push((name, Instant::now()));
        *self
            .labeled
            .lock()
            .unwrap()
            .entry((name, label.to_string()))
            .or_insert(0) += 1;
    }
}

/// Polls `cond` every 10ms until it holds or `limit` passes.
pub async fn wait_until<F>(limit: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// True if `fut` is still pending after `wait`.
pub async fn still_pending<F: Future>(fut: F, wait: Duration) -> bool {
    tokio::time::timeout(wait, fut).await.is_err()
}
