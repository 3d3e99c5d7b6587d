//! Core data models for the inventory exporter

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Compute resource kinds the exporter knows how to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    FirewallRules,
    TargetPools,
    ForwardingRules,
    GlobalForwardingRules,
    Addresses,
    GlobalAddresses,
    Networks,
    Routes,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::FirewallRules,
        ResourceKind::TargetPools,
        ResourceKind::ForwardingRules,
        ResourceKind::GlobalForwardingRules,
        ResourceKind::Addresses,
        ResourceKind::GlobalAddresses,
        ResourceKind::Networks,
        ResourceKind::Routes,
    ];

    /// Kebab-case name used in configuration and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::FirewallRules => "firewall-rules",
            ResourceKind::TargetPools => "target-pools",
            ResourceKind::ForwardingRules => "forwarding-rules",
            ResourceKind::GlobalForwardingRules => "global-forwarding-rules",
            ResourceKind::Addresses => "addresses",
            ResourceKind::GlobalAddresses => "global-addresses",
            ResourceKind::Networks => "networks",
            ResourceKind::Routes => "routes",
        }
    }

    /// Arguments following `gcloud compute`
    pub fn gcloud_args(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::FirewallRules => &["firewall-rules", "list"],
            ResourceKind::TargetPools => &["target-pools", "list"],
            ResourceKind::ForwardingRules => &["forwarding-rules", "list", "--filter=region:*"],
            ResourceKind::GlobalForwardingRules => &["forwarding-rules", "list", "--global"],
            ResourceKind::Addresses => &["addresses", "list", "--filter=region:*"],
            ResourceKind::GlobalAddresses => &["addresses", "list", "--global"],
            ResourceKind::Networks => &["networks", "list"],
            ResourceKind::Routes => &["routes", "list"],
        }
    }

    /// Compute REST collection name, which is also the key used inside
    /// aggregated list scopes
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::FirewallRules => "firewalls",
            ResourceKind::TargetPools => "targetPools",
            ResourceKind::ForwardingRules | ResourceKind::GlobalForwardingRules => {
                "forwardingRules"
            }
            ResourceKind::Addresses | ResourceKind::GlobalAddresses => "addresses",
            ResourceKind::Networks => "networks",
            ResourceKind::Routes => "routes",
        }
    }

    /// Whether the REST API lists this kind per region (`aggregated/...`)
    /// rather than globally (`global/...`)
    pub fn is_aggregated(&self) -> bool {
        matches!(
            self,
            ResourceKind::TargetPools | ResourceKind::ForwardingRules | ResourceKind::Addresses
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

/// A single inventory item, reduced to the fields used for grouping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ResourceRecord {
    pub fn with_network(network: impl Into<String>) -> Self {
        Self {
            network: Some(network.into()),
            ..Default::default()
        }
    }

    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }
}

/// Numeric type of a metric, fixed at declaration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int64,
    #[default]
    Double,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int64 => "int64",
            ValueType::Double => "double",
        }
    }
}

/// Static description of a published metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,
    pub description: String,
    pub label_keys: Vec<String>,
    pub value_type: ValueType,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            label_keys: Vec::new(),
            value_type: ValueType::default(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>) -> Self {
        self.label_keys.push(key.into());
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn label_key(&self) -> Option<&str> {
        self.label_keys.first().map(String::as_str)
    }
}

/// Per-cycle count of resources, either split by label value or as one total
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatedCount {
    Labeled(HashMap<String, u64>),
    Total(u64),
}

impl AggregatedCount {
    /// Number of observations this count turns into
    pub fn len(&self) -> usize {
        match self {
            AggregatedCount::Labeled(buckets) => buckets.len(),
            AggregatedCount::Total(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum over all buckets
    pub fn total(&self) -> u64 {
        match self {
            AggregatedCount::Labeled(buckets) => buckets.values().sum(),
            AggregatedCount::Total(count) => *count,
        }
    }

    /// Count for a label value; `None` reads the unlabeled total
    pub fn get(&self, label: Option<&str>) -> Option<u64> {
        match (self, label) {
            (AggregatedCount::Labeled(buckets), Some(label)) => buckets.get(label).copied(),
            (AggregatedCount::Total(count), None) => Some(*count),
            _ => None,
        }
    }
}

/// One gauge value ready to be written to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeObservation {
    pub metric: String,
    pub label: Option<(String, String)>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
