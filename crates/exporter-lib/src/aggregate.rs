//! Grouping of resource lists into per-label counts

use crate::models::{AggregatedCount, ResourceRecord};
use std::collections::HashMap;

/// Chooses the label value a record is counted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSelector {
    /// Every record lands in one implicit bucket; no label is emitted
    Constant,
    /// Group by the record's network
    Network,
    /// Group by the record's status
    Status,
}

impl LabelSelector {
    /// Label key emitted alongside the value, if any
    pub fn label_key(&self) -> Option<&'static str> {
        match self {
            LabelSelector::Constant => None,
            LabelSelector::Network => Some("network"),
            LabelSelector::Status => Some("status"),
        }
    }

    /// Bucket for a record. A missing field maps to the empty string so that
    /// every record is counted exactly once.
    pub fn select<'a>(&self, record: &'a ResourceRecord) -> &'a str {
        let field = match self {
            LabelSelector::Constant => None,
            LabelSelector::Network => record.network.as_deref(),
            LabelSelector::Status => record.status.as_deref(),
        };
        field.unwrap_or("")
    }
}

/// Count records per selected label value.
///
/// An empty list yields an empty mapping for labeled selectors but a single
/// zero total for [`LabelSelector::Constant`].
pub fn aggregate(records: &[ResourceRecord], selector: LabelSelector) -> AggregatedCount {
    if selector == LabelSelector::Constant {
        return AggregatedCount::Total(records.len() as u64);
    }

    let mut buckets: HashMap<String, u64> = HashMap::new();
    for record in records {
        *buckets.entry(selector.select(record).to_string()).or_insert(0) += 1;
    }
    AggregatedCount::Labeled(buckets)
}
