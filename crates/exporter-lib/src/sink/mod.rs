//! Metric sinks and the reporter that feeds them
//!
//! A sink is told about every metric once at startup ([`MetricSink::declare`])
//! and then receives one batch of gauge observations per metric per scrape
//! cycle ([`MetricSink::write`]). Two sinks exist:
//! - [`PrometheusSink`] keeps gauges in an in-process registry that the HTTP
//!   listener renders on demand
//! - [`CloudMonitoringSink`] pushes descriptors and points to the Cloud
//!   Monitoring API

mod pull;
mod push;

pub use pull::PrometheusSink;
pub use push::{namespaced, CloudMonitoringSink, CUSTOM_METRIC_PREFIX, DEFAULT_MONITORING_ENDPOINT};

use crate::error::{RegistrationError, ReportError};
use crate::models::{AggregatedCount, GaugeObservation, MetricDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Destination for gauge observations
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Make the sink aware of every metric before the first write
    async fn declare(&self, descriptors: &[MetricDescriptor]) -> Result<(), RegistrationError>;

    /// Replace the current value(s) of one metric
    async fn write(
        &self,
        descriptor: &MetricDescriptor,
        observations: &[GaugeObservation],
    ) -> Result<(), ReportError>;
}

/// Turn a count into gauge observations stamped with `now`.
///
/// Observations come out sorted by label value. A labeled count with no
/// buckets yields nothing.
pub fn observations(
    descriptor: &MetricDescriptor,
    counts: &AggregatedCount,
    now: DateTime<Utc>,
) -> Result<Vec<GaugeObservation>, ReportError> {
    match (counts, descriptor.label_key()) {
        (AggregatedCount::Total(count), None) => Ok(vec![GaugeObservation {
            metric: descriptor.name.clone(),
            label: None,
            value: *count as f64,
            timestamp: now,
        }]),
        (AggregatedCount::Labeled(buckets), Some(key)) => {
            let mut observations: Vec<GaugeObservation> = buckets
                .iter()
                .map(|(value, count)| GaugeObservation {
                    metric: descriptor.name.clone(),
                    label: Some((key.to_string(), value.clone())),
                    value: *count as f64,
                    timestamp: now,
                })
                .collect();
            observations.sort_by(|a, b| a.label.cmp(&b.label));
            Ok(observations)
        }
        _ => Err(ReportError::LabelMismatch(descriptor.name.clone())),
    }
}

/// Converts aggregated counts into observations and hands them to a sink
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn MetricSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }

    /// Declare all metrics with the underlying sink
    pub async fn declare(&self, descriptors: &[MetricDescriptor]) -> Result<(), RegistrationError> {
        self.sink.declare(descriptors).await
    }

    /// Report one metric's counts, returning how many observations were sent
    pub async fn report(
        &self,
        descriptor: &MetricDescriptor,
        counts: &AggregatedCount,
    ) -> Result<usize, ReportError> {
        let observations = observations(descriptor, counts, Utc::now())?;

        if observations.is_empty() {
            debug!(metric = %descriptor.name, "No buckets to report");
            return Ok(0);
        }

        self.sink.write(descriptor, &observations).await?;
        Ok(observations.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<Vec<GaugeObservation>>>,
    }

    #[async_trait]
    impl MetricSink for RecordingSink {
        async fn declare(&self, _: &[MetricDescriptor]) -> Result<(), RegistrationError> {
            Ok(())
        }

        async fn write(
            &self,
            _: &MetricDescriptor,
            observations: &[GaugeObservation],
        ) -> Result<(), ReportError> {
            self.writes.lock().unwrap().push(observations.to_vec());
            Ok(())
        }
    }

    fn firewall_descriptor() -> MetricDescriptor {
        MetricDescriptor::new("gce_firewall_rules", "firewalls").with_label("network")
    }

    #[test]
    fn test_observations_one_per_bucket() {
        let counts = AggregatedCount::Labeled(HashMap::from([
            ("b".to_string(), 1),
            ("a".to_string(), 2),
        ]));
        let now = Utc::now();

        let obs = observations(&firewall_descriptor(), &counts, now).unwrap();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].label, Some(("network".to_string(), "a".to_string())));
        assert_eq!(obs[0].value, 2.0);
        assert_eq!(obs[1].label, Some(("network".to_string(), "b".to_string())));
        assert_eq!(obs[1].value, 1.0);
        assert!(obs.iter().all(|o| o.timestamp == now));
    }

    #[test]
    fn test_observations_unlabeled_zero() {
        let descriptor = MetricDescriptor::new("gce_routes", "routes");

        let obs = observations(&descriptor, &AggregatedCount::Total(0), Utc::now()).unwrap();

        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].label, None);
        assert_eq!(obs[0].value, 0.0);
    }

    #[test]
    fn test_observations_label_mismatch() {
        let err =
            observations(&firewall_descriptor(), &AggregatedCount::Total(3), Utc::now()).unwrap_err();
        assert!(matches!(err, ReportError::LabelMismatch(_)));
    }

    #[tokio::test]
    async fn test_reporter_skips_empty_mapping() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());

        let sent = reporter
            .report(&firewall_descriptor(), &AggregatedCount::Labeled(HashMap::new()))
            .await
            .unwrap();

        assert_eq!(sent, 0);
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reporter_writes_batch() {
        let sink = Arc::new(RecordingSink::default());
        let reporter = Reporter::new(sink.clone());
        let counts = AggregatedCount::Labeled(HashMap::from([
            ("a".to_string(), 2),
            ("b".to_string(), 1),
        ]));

        let sent = reporter.report(&firewall_descriptor(), &counts).await.unwrap();

        assert_eq!(sent, 2);
        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 2);
    }
}
