//! Resource listing through the Compute Engine REST API

use super::ResourceFetcher;
use crate::error::FetchError;
use crate::models::{ResourceKind, ResourceRecord};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Aggregated-list scope holding global resources; counted by the `Global*` kinds
const GLOBAL_SCOPE: &str = "global";

/// Public Compute Engine v1 endpoint
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// One page of a `global/...` list call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ResourceRecord>,
    next_page_token: Option<String>,
}

/// One page of an `aggregated/...` list call, keyed by scope
/// (e.g. `regions/us-central1`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregatedPage {
    #[serde(default)]
    items: HashMap<String, HashMap<String, Value>>,
    next_page_token: Option<String>,
}

/// Lists resources with the Compute REST API, following pagination
pub struct ComputeApiFetcher {
    client: Client,
    base_url: Url,
    access_token: Option<String>,
}

impl ComputeApiFetcher {
    /// Create a fetcher for `endpoint`; `access_token` is sent as a bearer token
    pub fn new(endpoint: &str, access_token: Option<String>) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        // Url::join drops the last segment unless the base ends with a slash
        let mut base = endpoint.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        Ok(Self {
            client,
            base_url,
            access_token,
        })
    }

    fn list_url(&self, project: &str, kind: ResourceKind) -> Result<Url, FetchError> {
        let scope = if kind.is_aggregated() {
            "aggregated"
        } else {
            "global"
        };
        let path = format!("projects/{}/{}/{}", project, scope, kind.collection());
        Ok(self.base_url.join(&path)?)
    }

    async fn get_page(&self, url: &Url, page_token: Option<&str>) -> Result<String, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Http { status, body });
        }

        Ok(response.text().await?)
    }
}

/// Decode a response page into its records and the next page token
fn parse_page(
    kind: ResourceKind,
    body: &str,
) -> Result<(Vec<ResourceRecord>, Option<String>), FetchError> {
    if !kind.is_aggregated() {
        let page: ListPage = serde_json::from_str(body)?;
        return Ok((page.items, page.next_page_token));
    }

    let page: AggregatedPage = serde_json::from_str(body)?;
    let mut records = Vec::new();
    for (name, scope) in page.items {
        if name == GLOBAL_SCOPE {
            continue;
        }
        // Scopes without resources only carry a `warning` entry
        if let Some(list) = scope.get(kind.collection()) {
            let items: Vec<ResourceRecord> = serde_json::from_value(list.clone())?;
            records.extend(items);
        }
    }
    Ok((records, page.next_page_token))
}

#[async_trait]
impl ResourceFetcher for ComputeApiFetcher {
    async fn fetch(
        &self,
        project: &str,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceRecord>, FetchError> {
        let url = self.list_url(project, kind)?;
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            debug!(url = %url, page_token = ?page_token, "Listing resources");
            let body = self.get_page(&url, page_token.as_deref()).await?;
            let (items, next) = parse_page(kind, &body)?;
            records.extend(items);

            match next {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }
}
