//! Scrape loop
//!
//! Runs one cycle over every configured metric (fetch, aggregate, report),
//! sleeps for the configured interval, and repeats until shutdown.

use crate::aggregate::aggregate;
use crate::catalog::MetricSpec;
use crate::error::ScrapeError;
use crate::fetcher::ResourceFetcher;
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::sink::Reporter;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Default time between the end of one cycle and the start of the next
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(300);

/// Where the loop currently is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    Idle,
    Fetching,
    Aggregating,
    Reporting,
    Sleeping,
}

/// Outcome of one cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleResults {
    pub succeeded: usize,
    pub failed: usize,
    pub fetch_errors: usize,
    pub report_errors: usize,
    pub observations: usize,
}

/// Sequential fetch → aggregate → report loop over a fixed set of metrics
pub struct ScrapeLoop {
    fetcher: Arc<dyn ResourceFetcher>,
    reporter: Reporter,
    project: String,
    metrics: Vec<MetricSpec>,
    interval: Duration,
    health: Option<HealthRegistry>,
    stats: Option<ExporterMetrics>,
    logger: StructuredLogger,
    state: ScrapeState,
}

impl ScrapeLoop {
    pub fn new(
        fetcher: Arc<dyn ResourceFetcher>,
        reporter: Reporter,
        project: impl Into<String>,
        metrics: Vec<MetricSpec>,
        interval: Duration,
    ) -> Self {
        let project = project.into();
        Self {
            fetcher,
            reporter,
            logger: StructuredLogger::new(project.clone()),
            project,
            metrics,
            interval,
            health: None,
            stats: None,
            state: ScrapeState::Idle,
        }
    }

    pub fn state(&self) -> ScrapeState {
        self.state
    }

    /// Run cycles until `shutdown` fires. Shutdown is only observed while
    /// sleeping between cycles.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            metrics = self.metrics.len(),
            "Starting scrape loop"
        );

        loop {
            let start = Instant::now();
            let results = self.run_cycle().await;
            let elapsed = start.elapsed();

            if let Some(stats) = &self.stats {
                stats.observe_cycle(elapsed.as_secs_f64());
            }
            self.logger
                .log_cycle_complete(results.succeeded, results.failed, elapsed.as_millis());
            self.record_health(&results).await;

            self.state = ScrapeState::Sleeping;
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down scrape loop");
                    break;
                }
            }
        }
    }

    /// Process every metric once. A failing metric is logged and skipped;
    /// it never stops the others.
    pub async fn run_cycle(&mut self) -> CycleResults {
        let mut results = CycleResults::default();

        for index in 0..self.metrics.len() {
            let spec = self.metrics[index].clone();

            match self.process_metric(&spec).await {
                Ok(sent) => {
                    results.succeeded += 1;
                    results.observations += sent;
                }
                Err(e) => {
                    results.failed += 1;
                    match &e {
                        ScrapeError::Fetch { kind, .. } => {
                            results.fetch_errors += 1;
                            if let Some(stats) = &self.stats {
                                stats.inc_fetch_errors(*kind);
                            }
                        }
                        ScrapeError::Report { metric, .. } => {
                            results.report_errors += 1;
                            if let Some(stats) = &self.stats {
                                stats.inc_report_errors(metric);
                            }
                        }
                    }
                    self.logger
                        .log_metric_failure(spec.kind, spec.name(), &e.to_string());
                }
            }
        }

        results
    }

    async fn process_metric(&mut self, spec: &MetricSpec) -> Result<usize, ScrapeError> {
        self.state = ScrapeState::Fetching;
        let records = self
            .fetcher
            .fetch(&self.project, spec.kind)
            .await
            .map_err(|source| ScrapeError::Fetch {
                kind: spec.kind,
                source,
            })?;
        debug!(kind = %spec.kind, count = records.len(), "Fetched resources");
        if let Some(stats) = &self.stats {
            stats.set_resources(spec.kind, records.len());
        }

        self.state = ScrapeState::Aggregating;
        let counts = aggregate(&records, spec.selector);

        self.state = ScrapeState::Reporting;
        self.reporter
            .report(&spec.descriptor, &counts)
            .await
            .map_err(|source| ScrapeError::Report {
                metric: spec.name().to_string(),
                source,
            })
    }

    async fn record_health(&self, results: &CycleResults) {
        let Some(health) = &self.health else {
            return;
        };
        let total = self.metrics.len();
        let fetched = total - results.fetch_errors;

        health
            .update(
                components::FETCHER,
                ComponentHealth::from_failures(results.fetch_errors, total, "fetches"),
            )
            .await;
        health
            .update(
                components::SINK,
                ComponentHealth::from_failures(results.report_errors, fetched, "reports"),
            )
            .await;
        health
            .update(
                components::SCRAPE_LOOP,
                ComponentHealth::from_failures(results.failed, total, "metrics"),
            )
            .await;
    }
}

/// Builder for creating the scrape loop
pub struct ScrapeLoopBuilder {
    fetcher: Option<Arc<dyn ResourceFetcher>>,
    reporter: Option<Reporter>,
    project: Option<String>,
    metrics: Vec<MetricSpec>,
    interval: Duration,
    health: Option<HealthRegistry>,
    stats: Option<ExporterMetrics>,
}

impl ScrapeLoopBuilder {
    pub fn new() -> Self {
        Self {
            fetcher: None,
            reporter: None,
            project: None,
            metrics: Vec::new(),
            interval: DEFAULT_SCRAPE_INTERVAL,
            health: None,
            stats: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn metrics(mut self, metrics: Vec<MetricSpec>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn stats(mut self, stats: ExporterMetrics) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn build(self) -> Result<ScrapeLoop> {
        let fetcher = self
            .fetcher
            .ok_or_else(|| anyhow::anyhow!("Fetcher is required"))?;
        let reporter = self
            .reporter
            .ok_or_else(|| anyhow::anyhow!("Reporter is required"))?;
        let project = self
            .project
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Project is required"))?;
        if self.interval.is_zero() {
            anyhow::bail!("Scrape interval must be greater than zero");
        }

        let mut scrape_loop =
            ScrapeLoop::new(fetcher, reporter, project, self.metrics, self.interval);
        scrape_loop.health = self.health;
        scrape_loop.stats = self.stats;
        Ok(scrape_loop)
    }
}

impl Default for ScrapeLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
