use dashmap::DashMap;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::warn;

pub const TOTAL_CONNECTIONS: &str = "total_connections";
pub const ACTIVE_CONNECTIONS: &str = "active_connections";
pub const TOTAL_DISCONNECTIONS: &str = "total_disconnections";
pub const TOTAL_DIALS: &str = "total_dials";
pub const DIAL_FAILURES: &str = "dial_failures_total";

/// Label of a disconnect after the peer closed its side cleanly.
pub const STATUS_SUCCESS: &str = "success";

/// Label name shared by every labeled series.
const STATUS_LABEL: &str = "status";

/// Where the engine reports counters and gauges.
///
/// The engine never touches a concrete registry, only this capability.
pub trait MetricsSink: Send + Sync {
    fn inc_counter(&self, name: &'static str);
    fn add_gauge(&self, name: &'static str, delta: i64);
    fn inc_labeled(&self, name: &'static str, label: &str);
}

fn help_for(name: &str) -> &'static str {
    match name {
        TOTAL_CONNECTIONS => "Total connections count",
        ACTIVE_CONNECTIONS => "Active connections gauge",
        TOTAL_DISCONNECTIONS => "Total disconnections count",
        TOTAL_DIALS => "Total dial trials started",
        DIAL_FAILURES => "Dial trials that ended with an unexpected error",
        _ => "heartload metric",
    }
}

/// Prometheus-backed sink. Series are created and registered on first use.
#[derive(Default)]
pub struct PrometheusSink {
    registry: Registry,
    counters: DashMap<&'static str, IntCounter>,
    gauges: DashMap<&'static str, IntGauge>,
    labeled: DashMap<&'static str, IntCounterVec>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn register(&self, collector: Box<dyn prometheus::core::Collector>, name: &str) {
        if let Err(e) = self.registry.register(collector) {
            warn!(metric = name, error = %e, "Failed to register metric");
        }
    }

    fn counter(&self, name: &'static str) -> Option<IntCounter> {
        if let Some(c) = self.counters.get(name) {
            return Some(c.value().clone());
        }
        let counter = IntCounter::new(name, help_for(name)).ok()?;
        let entry = self.counters.entry(name).or_insert_with(|| {
            self.register(Box::new(counter.clone()), name);
            counter
        });
        Some(entry.value().clone())
    }

    fn gauge(&self, name: &'static str) -> Option<IntGauge> {
        if let Some(g) = self.gauges.get(name) {
            return Some(g.value().clone());
        }
        let gauge = IntGauge::new(name, help_for(name)).ok()?;
        let entry = self.gauges.entry(name).or_insert_with(|| {
            self.register(Box::new(gauge.clone()), name);
            gauge
        });
        Some(entry.value().clone())
    }

    fn labeled(&self, name: &'static str) -> Option<IntCounterVec> {
        if let Some(v) = self.labeled.get(name) {
            return Some(v.value().clone());
        }
        let vec = IntCounterVec::new(Opts::new(name, help_for(name)), &[STATUS_LABEL]).ok()?;
        let entry = self.labeled.entry(name).or_insert_with(|| {
            self.register(Box::new(vec.clone()), name);
            vec
        });
        Some(entry.value().clone())
    }

    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}", e);
        }

        String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
    }
}

impl MetricsSink for PrometheusSink {
    fn inc_counter(&self, name: &'static str) {
        if let Some(c) = self.counter(name) {
            c.inc();
        }
    }

    fn add_gauge(&self, name: &'static str, delta: i64) {
        if let Some(g) = self.gauge(name) {
            g.add(delta);
        }
    }

    fn inc_labeled(&self, name: &'static str, label: &str) {
        if let Some(v) = self.labeled(name) {
            v.with_label_values(&[label]).inc();
        }
    }
}

/// Sink that drops everything, for wiring without an exporter.
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn inc_counter(&self, _name: &'static str) {}
    fn add_gauge(&self, _name: &'static str, _delta: i64) {}
    fn inc_labeled(&self, _name: &'static str, _label: &str) {}
}
