//! Resource inventory sources
//!
//! This module provides fetchers that list compute resources for a project.
//! Two sources are supported: the `gcloud` command-line tool and the Compute
//! REST API. Both return the same [`ResourceRecord`] shape so the rest of the
//! exporter does not care where a list came from.

mod compute_api;
mod gcloud;

pub use compute_api::{ComputeApiFetcher, DEFAULT_COMPUTE_ENDPOINT};
pub use gcloud::GcloudFetcher;

use crate::error::FetchError;
use crate::models::{ResourceKind, ResourceRecord};

pub use async_trait::async_trait;

/// Trait for resource listing implementations
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// List every resource of `kind` in `project`
    async fn fetch(
        &self,
        project: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRecord>, FetchError>;
}
