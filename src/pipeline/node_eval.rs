//! Node condition evaluation
//!
//! `Ready` is healthy when `True`; every other condition type
//! (`MemoryPressure`, `DiskPressure`, `PIDPressure`, `NetworkUnavailable`, ...)
//! is healthy when `False`. Unknown status counts as anomalous in both cases.

use crate::types::{AlertCandidate, Condition, NodeRecord};
use chrono::FixedOffset;

pub fn is_anomalous(condition: &Condition) -> bool {
    if condition.condition_type == "Ready" {
        condition.status != "True"
    } else {
        condition.status != "False"
    }
}

/// One non-suppressible candidate per anomalous condition
pub fn evaluate_node(node: &NodeRecord, offset: FixedOffset) -> Vec<AlertCandidate> {
    node.conditions
        .iter()
        .filter(|c| is_anomalous(c))
        .map(|c| AlertCandidate::from_condition(&node.name, c, offset))
        .collect()
}
