//! In-process gauges served by the local metrics endpoint

use super::MetricSink;
use crate::error::{RegistrationError, ReportError};
use crate::models::{GaugeObservation, MetricDescriptor};
use async_trait::async_trait;
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Handle to a declared gauge
enum GaugeHandle {
    Single(Gauge),
    Labeled(GaugeVec),
}

struct DeclaredGauge {
    descriptor: MetricDescriptor,
    handle: GaugeHandle,
    /// Label values set by the last write
    labels: HashSet<String>,
}

/// Pull-style sink backed by a `prometheus::Registry`.
///
/// The registry is owned by the sink rather than being the process-wide
/// default; share it with the HTTP listener through [`PrometheusSink::registry`].
pub struct PrometheusSink {
    registry: Arc<Registry>,
    gauges: RwLock<HashMap<String, DeclaredGauge>>,
}

impl PrometheusSink {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            gauges: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    fn create_handle(descriptor: &MetricDescriptor) -> Result<GaugeHandle, RegistrationError> {
        let invalid = |reason: String| RegistrationError::Invalid {
            name: descriptor.name.clone(),
            reason,
        };

        if descriptor.label_keys.len() > 1 {
            return Err(invalid("at most one label is supported".to_string()));
        }

        let opts = Opts::new(descriptor.name.as_str(), descriptor.description.as_str());
        let handle = if descriptor.label_keys.is_empty() {
            GaugeHandle::Single(Gauge::with_opts(opts).map_err(|e| invalid(e.to_string()))?)
        } else {
            let keys: Vec<&str> = descriptor.label_keys.iter().map(String::as_str).collect();
            GaugeHandle::Labeled(GaugeVec::new(opts, &keys).map_err(|e| invalid(e.to_string()))?)
        };
        Ok(handle)
    }

    fn register(&self, name: &str, handle: &GaugeHandle) -> Result<(), RegistrationError> {
        let result = match handle {
            GaugeHandle::Single(gauge) => self.registry.register(Box::new(gauge.clone())),
            GaugeHandle::Labeled(vec) => self.registry.register(Box::new(vec.clone())),
        };

        result.map_err(|e| match e {
            prometheus::Error::AlreadyReg => RegistrationError::Duplicate(name.to_string()),
            other => RegistrationError::Invalid {
                name: name.to_string(),
                reason: other.to_string(),
            },
        })
    }
}

#[async_trait]
impl MetricSink for PrometheusSink {
    async fn declare(&self, descriptors: &[MetricDescriptor]) -> Result<(), RegistrationError> {
        let mut gauges = self.gauges.write().await;

        for descriptor in descriptors {
            if let Some(existing) = gauges.get(&descriptor.name) {
                if existing.descriptor == *descriptor {
                    continue;
                }
                return Err(RegistrationError::Duplicate(descriptor.name.clone()));
            }

            let handle = Self::create_handle(descriptor)?;
            self.register(&descriptor.name, &handle)?;
            debug!(metric = %descriptor.name, "Registered gauge");

            gauges.insert(
                descriptor.name.clone(),
                DeclaredGauge {
                    descriptor: descriptor.clone(),
                    handle,
                    labels: HashSet::new(),
                },
            );
        }

        Ok(())
    }

    async fn write(
        &self,
        descriptor: &MetricDescriptor,
        observations: &[GaugeObservation],
    ) -> Result<(), ReportError> {
        let mut gauges = self.gauges.write().await;
        let declared = gauges
            .get_mut(&descriptor.name)
            .ok_or_else(|| ReportError::Undeclared(descriptor.name.clone()))?;

        match &declared.handle {
            GaugeHandle::Single(gauge) => {
                for observation in observations {
                    if observation.label.is_some() {
                        return Err(ReportError::LabelMismatch(descriptor.name.clone()));
                    }
                    gauge.set(observation.value);
                }
            }
            GaugeHandle::Labeled(vec) => {
                if observations.iter().any(|o| o.label.is_none()) {
                    return Err(ReportError::LabelMismatch(descriptor.name.clone()));
                }
                // Set current values before removing stale ones; the family
                // never goes empty mid-write
                let mut current = HashSet::with_capacity(observations.len());
                for observation in observations {
                    if let Some((_, value)) = &observation.label {
                        vec.with_label_values(&[value.as_str()]).set(observation.value);
                        current.insert(value.clone());
                    }
                }
                for stale in declared.labels.difference(&current) {
                    if let Err(e) = vec.remove_label_values(&[stale.as_str()]) {
                        debug!(
                            metric = %descriptor.name,
                            label = %stale,
                            error = %e,
                            "Stale label already removed"
                        );
                    }
                }
                declared.labels = current;
            }
        }

        Ok(())
    }
}
