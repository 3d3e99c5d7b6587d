//! Push-style sink for the Cloud Monitoring custom metric API

use super::MetricSink;
use crate::error::{RegistrationError, ReportError};
use crate::models::{GaugeObservation, MetricDescriptor, ValueType};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

/// Namespace for custom metric and label names
pub const CUSTOM_METRIC_PREFIX: &str = "custom.cloudmonitoring.googleapis.com/";

/// Public Cloud Monitoring v2beta2 endpoint
pub const DEFAULT_MONITORING_ENDPOINT: &str = "https://www.googleapis.com/cloudmonitoring/v2beta2";

/// Prefix a metric or label name with the custom metric namespace
pub fn namespaced(name: &str) -> String {
    format!("{}{}", CUSTOM_METRIC_PREFIX, name)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricDescriptorRequest<'a> {
    name: String,
    project: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<LabelDescriptor<'a>>,
    type_descriptor: TypeDescriptor,
}

#[derive(Debug, Serialize)]
struct LabelDescriptor<'a> {
    key: String,
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypeDescriptor {
    metric_type: &'static str,
    value_type: &'static str,
}

#[derive(Debug, Serialize)]
struct WriteTimeseriesRequest<'a> {
    timeseries: Vec<TimeseriesPoint<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesPoint<'a> {
    timeseries_desc: TimeseriesDescriptor<'a>,
    point: Point,
}

#[derive(Debug, Serialize)]
struct TimeseriesDescriptor<'a> {
    project: &'a str,
    metric: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    labels: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Point {
    start: String,
    end: String,
    /// int64 values travel as JSON strings
    #[serde(skip_serializing_if = "Option::is_none")]
    int64_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
}

/// Registers custom metric descriptors and writes gauge points to Cloud
/// Monitoring
pub struct CloudMonitoringSink {
    client: Client,
    base_url: Url,
    project: String,
    access_token: Option<String>,
    declared: RwLock<HashMap<String, MetricDescriptor>>,
}

impl CloudMonitoringSink {
    pub fn new(
        endpoint: &str,
        project: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, RegistrationError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let mut base = endpoint.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        Ok(Self {
            client,
            base_url,
            project: project.into(),
            access_token,
            declared: RwLock::new(HashMap::new()),
        })
    }

    fn post(&self, url: Url) -> RequestBuilder {
        let request = self.client.post(url);
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn create_descriptor(
        &self,
        descriptor: &MetricDescriptor,
    ) -> Result<(), RegistrationError> {
        let url = self
            .base_url
            .join(&format!("projects/{}/metricDescriptors", self.project))?;

        let body = MetricDescriptorRequest {
            name: namespaced(&descriptor.name),
            project: &self.project,
            description: &descriptor.description,
            labels: descriptor
                .label_keys
                .iter()
                .map(|key| LabelDescriptor {
                    key: namespaced(key),
                    description: key,
                })
                .collect(),
            type_descriptor: TypeDescriptor {
                metric_type: "gauge",
                value_type: descriptor.value_type.as_str(),
            },
        };

        let response = self.post(url).json(&body).send().await?;
        let status = response.status();

        if status == StatusCode::CONFLICT {
            debug!(metric = %descriptor.name, "Metric descriptor already exists");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrationError::Http {
                name: descriptor.name.clone(),
                status: status.as_u16(),
                body,
            });
        }

        info!(metric = %namespaced(&descriptor.name), "Created metric descriptor");
        Ok(())
    }

    fn point(&self, descriptor: &MetricDescriptor, observation: &GaugeObservation) -> Point {
        let time = observation
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let (int64_value, double_value) = match descriptor.value_type {
            ValueType::Int64 => (Some((observation.value as i64).to_string()), None),
            ValueType::Double => (None, Some(observation.value)),
        };

        Point {
            start: time.clone(),
            end: time,
            int64_value,
            double_value,
        }
    }
}

#[async_trait]
impl MetricSink for CloudMonitoringSink {
    async fn declare(&self, descriptors: &[MetricDescriptor]) -> Result<(), RegistrationError> {
        for descriptor in descriptors {
            self.create_descriptor(descriptor).await?;
            self.declared
                .write()
                .await
                .insert(descriptor.name.clone(), descriptor.clone());
        }
        Ok(())
    }

    async fn write(
        &self,
        descriptor: &MetricDescriptor,
        observations: &[GaugeObservation],
    ) -> Result<(), ReportError> {
        // The value type of a point must match what was registered
        let declared = self
            .declared
            .read()
            .await
            .get(&descriptor.name)
            .cloned()
            .ok_or_else(|| ReportError::Undeclared(descriptor.name.clone()))?;

        let mut timeseries = Vec::with_capacity(observations.len());
        for observation in observations {
            let labels = match (&observation.label, declared.label_key()) {
                (None, None) => HashMap::new(),
                (Some((key, value)), Some(declared_key)) if key == declared_key => {
                    HashMap::from([(namespaced(key), value.clone())])
                }
                _ => return Err(ReportError::LabelMismatch(descriptor.name.clone())),
            };

            timeseries.push(TimeseriesPoint {
                timeseries_desc: TimeseriesDescriptor {
                    project: &self.project,
                    metric: namespaced(&declared.name),
                    labels,
                },
                point: self.point(&declared, observation),
            });
        }

        let url = self
            .base_url
            .join(&format!("projects/{}/timeseries:write", self.project))?;
        let response = self
            .post(url)
            .json(&WriteTimeseriesRequest { timeseries })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Http { status, body });
        }

        debug!(
            metric = %descriptor.name,
            points = observations.len(),
            "Wrote timeseries"
        );
        Ok(())
    }
}
