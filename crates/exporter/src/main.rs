//! Inventory Exporter - cloud resource inventory metrics
//!
//! Periodically lists compute resources of a project and publishes their
//! counts as gauges, either on a local scrape endpoint or as Cloud
//! Monitoring custom metrics.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    catalog_for,
    fetcher::{ComputeApiFetcher, GcloudFetcher, ResourceFetcher},
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
    scrape::ScrapeLoopBuilder,
    sink::{CloudMonitoringSink, MetricSink, PrometheusSink, Reporter},
    MetricDescriptor,
};
use prometheus::Registry;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

use config::{Cli, ExporterConfig, FetcherKind, SinkKind};

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = ExporterConfig::load(&cli)?;
    config.validate().context("Invalid configuration")?;
    info!(project = %config.project, "Exporter configured");

    let logger = StructuredLogger::new(&config.project);
    logger.log_startup(EXPORTER_VERSION, config.fetcher.as_str(), config.sink.as_str());

    // Gauges and self-metrics share one registry owned here
    let registry = Arc::new(Registry::new());
    let stats = ExporterMetrics::new(&registry).context("Failed to register exporter metrics")?;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::FETCHER).await;
    health_registry.register(components::SINK).await;
    health_registry.register(components::SCRAPE_LOOP).await;

    let fetcher: Arc<dyn ResourceFetcher> = match config.fetcher {
        FetcherKind::Gcloud => Arc::new(GcloudFetcher::new(&config.gcloud_path)),
        FetcherKind::Api => Arc::new(
            ComputeApiFetcher::new(&config.compute_endpoint, config.access_token.clone())
                .context("Failed to create Compute API client")?,
        ),
    };

    let sink: Arc<dyn MetricSink> = match config.sink {
        SinkKind::Prometheus => Arc::new(PrometheusSink::new(registry.clone())),
        SinkKind::CloudMonitoring => Arc::new(
            CloudMonitoringSink::new(
                &config.monitoring_endpoint,
                config.project.clone(),
                config.access_token.clone(),
            )
            .context("Failed to create Cloud Monitoring client")?,
        ),
    };
    let reporter = Reporter::new(sink);

    // Declaration failures are fatal; nothing can be reported without them
    let metrics = catalog_for(&config.resource_kinds);
    let descriptors: Vec<MetricDescriptor> =
        metrics.iter().map(|m| m.descriptor.clone()).collect();
    reporter
        .declare(&descriptors)
        .await
        .context("Failed to declare metrics")?;
    logger.log_metrics_declared(descriptors.len());
    health_registry.set_ready(true).await;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), registry.clone()));
    let mut api_handle = tokio::spawn(api::serve(config.port, app_state));

    let scrape_loop = ScrapeLoopBuilder::new()
        .fetcher(fetcher)
        .reporter(reporter)
        .project(config.project.clone())
        .metrics(metrics)
        .interval(config.scrape_period())
        .health(health_registry)
        .stats(stats)
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(scrape_loop.run(shutdown_rx));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for SIGINT")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {e:#}"),
                Err(e) => format!("API server task failed: {e}"),
            };
            error!(reason = %reason, "Stopping exporter");
            logger.log_shutdown(&reason);
            let _ = shutdown_tx.send(());
            anyhow::bail!(reason);
        }
    }

    let _ = shutdown_tx.send(());
    info!("Shutting down");

    Ok(())
}
