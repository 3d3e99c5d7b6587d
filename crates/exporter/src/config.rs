//! Exporter configuration
//!
//! Sources are layered: optional config file, then `EXPORTER_*` environment
//! variables, then command-line flags.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use exporter_lib::fetcher::DEFAULT_COMPUTE_ENDPOINT;
use exporter_lib::sink::DEFAULT_MONITORING_ENDPOINT;
use exporter_lib::ResourceKind;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Where resource lists come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FetcherKind {
    /// Shell out to `gcloud compute ... list`
    Gcloud,
    /// Call the Compute REST API directly
    Api,
}

impl FetcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetcherKind::Gcloud => "gcloud",
            FetcherKind::Api => "api",
        }
    }
}

/// Where gauges are published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    /// Serve gauges on the local metrics endpoint
    Prometheus,
    /// Push gauges to Cloud Monitoring as custom metrics
    CloudMonitoring,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Prometheus => "prometheus",
            SinkKind::CloudMonitoring => "cloud-monitoring",
        }
    }
}

/// Publishes cloud resource inventory counts as gauge metrics
#[derive(Debug, Default, Parser)]
#[command(name = "inventory-exporter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Name of the project whose resources are monitored
    #[arg(long)]
    pub project: Option<String>,

    /// Port for the metrics and health endpoints
    #[arg(long)]
    pub port: Option<u16>,

    /// Seconds to sleep between scrape cycles
    #[arg(long)]
    pub scrape_period_secs: Option<u64>,

    /// Metric sink
    #[arg(long, value_enum)]
    pub sink: Option<SinkKind>,

    /// Resource inventory source
    #[arg(long, value_enum)]
    pub fetcher: Option<FetcherKind>,
}

/// Configuration errors that prevent startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("empty project: a project name must be specified")]
    EmptyProject,

    #[error("scrape period must be greater than zero")]
    InvalidScrapePeriod,

    #[error("at least one resource kind must be enabled")]
    NoResourceKinds,
}

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Project to monitor
    #[serde(default)]
    pub project: String,

    /// Port for the metrics and health endpoints
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between the end of one cycle and the start of the next
    #[serde(default = "default_scrape_period")]
    pub scrape_period_secs: u64,

    #[serde(default = "default_sink")]
    pub sink: SinkKind,

    #[serde(default = "default_fetcher")]
    pub fetcher: FetcherKind,

    /// gcloud executable used by the gcloud fetcher
    #[serde(default = "default_gcloud_path")]
    pub gcloud_path: String,

    #[serde(default = "default_compute_endpoint")]
    pub compute_endpoint: String,

    #[serde(default = "default_monitoring_endpoint")]
    pub monitoring_endpoint: String,

    /// Bearer token for the REST APIs
    #[serde(default)]
    pub access_token: Option<String>,

    /// Resource kinds to publish
    #[serde(default = "default_resource_kinds")]
    pub resource_kinds: Vec<ResourceKind>,
}

fn default_port() -> u16 {
    8400
}

fn default_scrape_period() -> u64 {
    300
}

fn default_sink() -> SinkKind {
    SinkKind::Prometheus
}

fn default_fetcher() -> FetcherKind {
    FetcherKind::Gcloud
}

fn default_gcloud_path() -> String {
    "gcloud".to_string()
}

fn default_compute_endpoint() -> String {
    DEFAULT_COMPUTE_ENDPOINT.to_string()
}

fn default_monitoring_endpoint() -> String {
    DEFAULT_MONITORING_ENDPOINT.to_string()
}

fn default_resource_kinds() -> Vec<ResourceKind> {
    ResourceKind::ALL.to_vec()
}

impl ExporterConfig {
    /// Load configuration from file, environment and command line
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix("EXPORTER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("resource_kinds"),
            )
            .set_override_option("project", cli.project.clone())?
            .set_override_option("port", cli.port.map(i64::from))?
            .set_override_option("scrape_period_secs", cli.scrape_period_secs.map(|s| s as i64))?
            .set_override_option("sink", cli.sink.map(|s| s.as_str()))?
            .set_override_option("fetcher", cli.fetcher.map(|f| f.as_str()))?;

        let config = builder.build().context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Reject configurations the exporter cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::EmptyProject);
        }
        if self.scrape_period_secs == 0 {
            return Err(ConfigError::InvalidScrapePeriod);
        }
        if self.resource_kinds.is_empty() {
            return Err(ConfigError::NoResourceKinds);
        }
        Ok(())
    }

    pub fn scrape_period(&self) -> Duration {
        Duration::from_secs(self.scrape_period_secs)
    }
}
