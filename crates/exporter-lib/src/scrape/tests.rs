//! Scrape loop scenarios
//!
//! These tests drive whole cycles with an in-memory fetcher and either the
//! real Prometheus sink or a recording sink.

#[cfg(test)]
mod scrape_cycle_tests {
    use crate::catalog::{catalog_for, default_catalog, MetricSpec};
    use crate::error::{FetchError, RegistrationError, ReportError};
    use crate::fetcher::ResourceFetcher;
    use crate::health::{components, ComponentStatus, HealthRegistry};
    use crate::models::{GaugeObservation, MetricDescriptor, ResourceKind, ResourceRecord};
    use crate::observability::ExporterMetrics;
    use crate::scrape::{ScrapeLoop, ScrapeLoopBuilder, ScrapeState};
    use crate::sink::{MetricSink, PrometheusSink, Reporter};
    use async_trait::async_trait;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// In-memory inventory; kinds without a configured list return nothing
    #[derive(Default)]
    struct MockFetcher {
        lists: Mutex<HashMap<ResourceKind, Vec<ResourceRecord>>>,
        failing: Mutex<HashSet<ResourceKind>>,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn set(&self, kind: ResourceKind, records: Vec<ResourceRecord>) {
            self.lists.lock().unwrap().insert(kind, records);
        }

        fn fail(&self, kind: ResourceKind) {
            self.failing.lock().unwrap().insert(kind);
        }
    }

    #[async_trait]
    impl ResourceFetcher for MockFetcher {
        async fn fetch(
            &self,
            _project: &str,
            kind: ResourceKind,
        ) -> Result<Vec<ResourceRecord>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if self.failing.lock().unwrap().contains(&kind) {
                return Err(FetchError::Command {
                    status: "exit status: 1".to_string(),
                    output: "connection reset".to_string(),
                });
            }
            Ok(self
                .lists
                .lock()
                .unwrap()
                .get(&kind)
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Records every write; rejects writes for metrics listed in `reject`
    #[derive(Default)]
    struct RecordingSink {
        writes: Mutex<Vec<(String, Vec<GaugeObservation>)>>,
        reject: HashSet<String>,
    }

    #[async_trait]
    impl MetricSink for RecordingSink {
        async fn declare(&self, _: &[MetricDescriptor]) -> Result<(), RegistrationError> {
            Ok(())
        }

        async fn write(
            &self,
            descriptor: &MetricDescriptor,
            observations: &[GaugeObservation],
        ) -> Result<(), ReportError> {
            if self.reject.contains(&descriptor.name) {
                return Err(ReportError::Http {
                    status: 500,
                    body: "backend error".to_string(),
                });
            }
            self.writes
                .lock()
                .unwrap()
                .push((descriptor.name.clone(), observations.to_vec()));
            Ok(())
        }
    }

    fn networks(names: &[&str]) -> Vec<ResourceRecord> {
        names.iter().map(|n| ResourceRecord::with_network(*n)).collect()
    }

    fn render(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    async fn prometheus_loop(
        fetcher: Arc<MockFetcher>,
        metrics: Vec<MetricSpec>,
    ) -> (ScrapeLoop, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let reporter = Reporter::new(Arc::new(PrometheusSink::new(registry.clone())));
        let descriptors: Vec<MetricDescriptor> =
            metrics.iter().map(|m| m.descriptor.clone()).collect();
        reporter.declare(&descriptors).await.unwrap();

        let scrape_loop = ScrapeLoopBuilder::new()
            .fetcher(fetcher)
            .reporter(reporter)
            .project("test-project")
            .metrics(metrics)
            .build()
            .unwrap();
        (scrape_loop, registry)
    }

    #[tokio::test]
    async fn test_firewall_rules_grouped_by_network() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set(ResourceKind::FirewallRules, networks(&["a", "a", "b"]));
        let (mut scrape_loop, registry) =
            prometheus_loop(fetcher, catalog_for(&[ResourceKind::FirewallRules])).await;

        let results = scrape_loop.run_cycle().await;

        assert_eq!(results.succeeded, 1);
        assert_eq!(results.observations, 2);
        let text = render(&registry);
        assert!(text.contains("gce_firewall_rules{network=\"a\"} 2"));
        assert!(text.contains("gce_firewall_rules{network=\"b\"} 1"));
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_stop_other_metrics() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set(ResourceKind::Networks, networks(&["default", "prod"]));
        fetcher.fail(ResourceKind::Routes);
        let sink = Arc::new(RecordingSink::default());
        let mut scrape_loop = ScrapeLoopBuilder::new()
            .fetcher(fetcher)
            .reporter(Reporter::new(sink.clone()))
            .project("p")
            .metrics(default_catalog())
            .build()
            .unwrap();

        let results = scrape_loop.run_cycle().await;

        assert_eq!(results.failed, 1);
        assert_eq!(results.fetch_errors, 1);
        assert_eq!(results.succeeded, default_catalog().len() - 1);

        let writes = sink.writes.lock().unwrap();
        let written: HashSet<&str> = writes.iter().map(|(name, _)| name.as_str()).collect();
        assert!(!written.contains("gce_routes"));
        assert!(written.contains("gce_networks"));
        assert!(written.contains("gce_target_pools"));
        let networks_write = writes.iter().find(|(name, _)| name == "gce_networks").unwrap();
        assert_eq!(networks_write.1[0].value, 2.0);
    }

    #[tokio::test]
    async fn test_second_cycle_supersedes_first() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set(ResourceKind::FirewallRules, networks(&["a", "a", "a"]));
        let (mut scrape_loop, registry) = prometheus_loop(
            fetcher.clone(),
            catalog_for(&[ResourceKind::FirewallRules]),
        )
        .await;

        scrape_loop.run_cycle().await;
        fetcher.set(ResourceKind::FirewallRules, networks(&["a"]));
        scrape_loop.run_cycle().await;

        let text = render(&registry);
        assert!(text.contains("gce_firewall_rules{network=\"a\"} 1"));
        assert!(!text.contains("gce_firewall_rules{network=\"a\"} 3"));
    }

    #[tokio::test]
    async fn test_empty_labeled_list_reports_nothing() {
        let fetcher = Arc::new(MockFetcher::default());
        let sink = Arc::new(RecordingSink::default());
        let mut scrape_loop = ScrapeLoopBuilder::new()
            .fetcher(fetcher)
            .reporter(Reporter::new(sink.clone()))
            .project("p")
            .metrics(catalog_for(&[
                ResourceKind::FirewallRules,
                ResourceKind::TargetPools,
            ]))
            .build()
            .unwrap();

        let results = scrape_loop.run_cycle().await;

        assert_eq!(results.succeeded, 2);
        let writes = sink.writes.lock().unwrap();
        // Only the unlabeled target pool gauge is written, with a zero value
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "gce_target_pools");
        assert_eq!(writes[0].1.len(), 1);
        assert_eq!(writes[0].1[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_report_failure_is_contained() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.set(ResourceKind::FirewallRules, networks(&["a"]));
        let sink = Arc::new(RecordingSink {
            reject: HashSet::from(["gce_firewall_rules".to_string()]),
            ..Default::default()
        });
        let registry = Registry::new();
        let stats = ExporterMetrics::new(&registry).unwrap();
        let mut scrape_loop = ScrapeLoopBuilder::new()
            .fetcher(fetcher)
            .reporter(Reporter::new(sink.clone()))
            .project("p")
            .metrics(catalog_for(&[
                ResourceKind::FirewallRules,
                ResourceKind::Networks,
            ]))
            .stats(stats)
            .build()
            .unwrap();

        let results = scrape_loop.run_cycle().await;

        assert_eq!(results.report_errors, 1);
        assert_eq!(results.succeeded, 1);
        assert_eq!(sink.writes.lock().unwrap()[0].0, "gce_networks");
        assert!(render(&registry)
            .contains("inventory_exporter_report_errors_total{metric=\"gce_firewall_rules\"} 1"));
    }

    #[tokio::test]
    async fn test_state_moves_through_cycle() {
        let fetcher = Arc::new(MockFetcher::default());
        let (mut scrape_loop, _registry) =
            prometheus_loop(fetcher, catalog_for(&[ResourceKind::Routes])).await;

        assert_eq!(scrape_loop.state(), ScrapeState::Idle);
        scrape_loop.run_cycle().await;
        assert_eq!(scrape_loop.state(), ScrapeState::Reporting);
    }

    #[tokio::test]
    async fn test_run_repeats_until_shutdown() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.fail(ResourceKind::Routes);
        let health = HealthRegistry::new();
        let registry = Arc::new(Registry::new());
        let reporter = Reporter::new(Arc::new(PrometheusSink::new(registry.clone())));
        let metrics = catalog_for(&[ResourceKind::Networks, ResourceKind::Routes]);
        let descriptors: Vec<MetricDescriptor> =
            metrics.iter().map(|m| m.descriptor.clone()).collect();
        reporter.declare(&descriptors).await.unwrap();

        let scrape_loop = ScrapeLoopBuilder::new()
            .fetcher(fetcher.clone())
            .reporter(reporter)
            .project("p")
            .metrics(metrics)
            .interval(Duration::from_millis(10))
            .health(health.clone())
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(scrape_loop.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scrape loop did not stop")
            .unwrap();

        // Two metrics per cycle, at least two cycles
        assert!(fetcher.calls.load(Ordering::SeqCst) >= 4);

        let report = health.health().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(
            report.components[components::FETCHER].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            report.components[components::SINK].status,
            ComponentStatus::Healthy
        );
        assert!(render(&registry).contains("gce_networks 0"));
    }

    #[test]
    fn test_builder_requires_fetcher() {
        let sink = Arc::new(RecordingSink::default());
        let result = ScrapeLoopBuilder::new()
            .reporter(Reporter::new(sink))
            .project("p")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_blank_project() {
        let result = ScrapeLoopBuilder::new()
            .fetcher(Arc::new(MockFetcher::default()))
            .reporter(Reporter::new(Arc::new(RecordingSink::default())))
            .project("  ")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = ScrapeLoopBuilder::new()
            .fetcher(Arc::new(MockFetcher::default()))
            .reporter(Reporter::new(Arc::new(RecordingSink::default())))
            .project("p")
            .interval(Duration::ZERO)
            .build();

        assert!(result.is_err());
    }
}
