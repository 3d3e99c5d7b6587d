//! Observability infrastructure for the exporter
//!
//! Provides:
//! - Prometheus self-metrics (cycle duration, fetch/report errors, resource counts)
//! - Structured JSON logging of lifecycle events with tracing

use crate::models::ResourceKind;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
};
use tracing::{info, warn};

/// Histogram buckets for scrape cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Exporter self-metrics, registered into the same registry as the gauges
#[derive(Clone)]
pub struct ExporterMetrics {
    scrape_duration_seconds: Histogram,
    scrape_cycles: IntCounter,
    fetch_errors: IntCounterVec,
    report_errors: IntCounterVec,
    resources: IntGaugeVec,
}

impl ExporterMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let scrape_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "inventory_exporter_scrape_duration_seconds",
                "Time spent on one full scrape cycle",
            )
            .buckets(CYCLE_BUCKETS.to_vec()),
        )?;
        let scrape_cycles = IntCounter::new(
            "inventory_exporter_scrape_cycles_total",
            "Number of completed scrape cycles",
        )?;
        let fetch_errors = IntCounterVec::new(
            Opts::new(
                "inventory_exporter_fetch_errors_total",
                "Resource list calls that failed",
            ),
            &["kind"],
        )?;
        let report_errors = IntCounterVec::new(
            Opts::new(
                "inventory_exporter_report_errors_total",
                "Metric writes rejected by the sink",
            ),
            &["metric"],
        )?;
        let resources = IntGaugeVec::new(
            Opts::new(
                "inventory_exporter_resources",
                "Number of resources returned by the last list call",
            ),
            &["kind"],
        )?;

        registry.register(Box::new(scrape_duration_seconds.clone()))?;
        registry.register(Box::new(scrape_cycles.clone()))?;
        registry.register(Box::new(fetch_errors.clone()))?;
        registry.register(Box::new(report_errors.clone()))?;
        registry.register(Box::new(resources.clone()))?;

        Ok(Self {
            scrape_duration_seconds,
            scrape_cycles,
            fetch_errors,
            report_errors,
            resources,
        })
    }

    /// Record a finished cycle
    pub fn observe_cycle(&self, duration_secs: f64) {
        self.scrape_duration_seconds.observe(duration_secs);
        self.scrape_cycles.inc();
    }

    pub fn inc_fetch_errors(&self, kind: ResourceKind) {
        self.fetch_errors.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn inc_report_errors(&self, metric: &str) {
        self.report_errors.with_label_values(&[metric]).inc();
    }

    pub fn set_resources(&self, kind: ResourceKind, count: usize) {
        self.resources
            .with_label_values(&[kind.as_str()])
            .set(count as i64);
    }
}

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    project: String,
}

impl StructuredLogger {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
        }
    }

    pub fn log_startup(&self, version: &str, fetcher: &str, sink: &str) {
        info!(
            event = "exporter_started",
            project = %self.project,
            exporter_version = %version,
            fetcher = %fetcher,
            sink = %sink,
            "Inventory exporter started"
        );
    }

    pub fn log_metrics_declared(&self, count: usize) {
        info!(
            event = "metrics_declared",
            project = %self.project,
            metrics = count,
            "Declared metrics with sink"
        );
    }

    pub fn log_cycle_complete(&self, succeeded: usize, failed: usize, elapsed_ms: u128) {
        info!(
            event = "scrape_cycle_complete",
            project = %self.project,
            succeeded = succeeded,
            failed = failed,
            elapsed_ms = elapsed_ms,
            "Scrape cycle complete"
        );
    }

    pub fn log_metric_failure(&self, kind: ResourceKind, metric: &str, error: &str) {
        warn!(
            event = "metric_failed",
            project = %self.project,
            kind = %kind,
            metric = %metric,
            error = %error,
            "Skipping metric until next cycle"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            project = %self.project,
            reason = %reason,
            "Inventory exporter shutting down"
        );
    }
}
