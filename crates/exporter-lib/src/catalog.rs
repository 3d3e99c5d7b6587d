//! The set of metrics published by the exporter

use crate::aggregate::LabelSelector;
use crate::models::{MetricDescriptor, ResourceKind};

/// One published metric: which resources to list, how to group them and
/// what to call the result
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub kind: ResourceKind,
    pub descriptor: MetricDescriptor,
    pub selector: LabelSelector,
}

impl MetricSpec {
    /// Build a spec whose descriptor label matches the selector
    pub fn new(
        kind: ResourceKind,
        name: &str,
        description: &str,
        selector: LabelSelector,
    ) -> Self {
        let mut descriptor = MetricDescriptor::new(name, description);
        if let Some(key) = selector.label_key() {
            descriptor = descriptor.with_label(key);
        }
        Self {
            kind,
            descriptor,
            selector,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Metrics for every known resource kind
pub fn default_catalog() -> Vec<MetricSpec> {
    ResourceKind::ALL.iter().map(|kind| spec_for(*kind)).collect()
}

/// Default metrics restricted to the given kinds, in catalog order
pub fn catalog_for(kinds: &[ResourceKind]) -> Vec<MetricSpec> {
    default_catalog()
        .into_iter()
        .filter(|spec| kinds.contains(&spec.kind))
        .collect()
}

fn spec_for(kind: ResourceKind) -> MetricSpec {
    match kind {
        ResourceKind::FirewallRules => MetricSpec::new(
            kind,
            "gce_firewall_rules",
            "Count of firewall rules in the project, labeled by network",
            LabelSelector::Network,
        ),
        ResourceKind::TargetPools => MetricSpec::new(
            kind,
            "gce_target_pools",
            "Count of target pools in the project",
            LabelSelector::Constant,
        ),
        ResourceKind::ForwardingRules => MetricSpec::new(
            kind,
            "gce_forwarding_rules",
            "Count of regional forwarding rules in the project",
            LabelSelector::Constant,
        ),
        ResourceKind::GlobalForwardingRules => MetricSpec::new(
            kind,
            "gce_global_forwarding_rules",
            "Count of global forwarding rules in the project",
            LabelSelector::Constant,
        ),
        ResourceKind::Addresses => MetricSpec::new(
            kind,
            "gce_ip_addresses",
            "Count of external IP addresses in the project, labeled by status",
            LabelSelector::Status,
        ),
        ResourceKind::GlobalAddresses => MetricSpec::new(
            kind,
            "gce_global_ip_addresses",
            "Count of global IP addresses in the project, labeled by status",
            LabelSelector::Status,
        ),
        ResourceKind::Networks => MetricSpec::new(
            kind,
            "gce_networks",
            "Count of networks in the project",
            LabelSelector::Constant,
        ),
        ResourceKind::Routes => MetricSpec::new(
            kind,
            "gce_routes",
            "Count of routes in the project",
            LabelSelector::Constant,
        ),
    }
}
