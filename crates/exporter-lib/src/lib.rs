//! Library for the cloud inventory exporter
//!
//! This crate provides the core functionality for:
//! - Listing compute resources through `gcloud` or the Compute REST API
//! - Counting resources per label value
//! - Publishing counts as gauges to a local registry or Cloud Monitoring
//! - The periodic scrape loop tying these together
//! - Health checks and self-observability

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod models;
pub mod observability;
pub mod scrape;
pub mod sink;

pub use aggregate::{aggregate, LabelSelector};
pub use catalog::{catalog_for, default_catalog, MetricSpec};
pub use error::{FetchError, RegistrationError, ReportError, ScrapeError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
