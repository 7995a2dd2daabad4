//! Persisted instance/resource/link/child state — the data the state
//! container reads and writes. The container's storage backend is an
//! external collaborator (see [`crate::state_container`]); these types are
//! the logical shape the engine agrees on with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::id::ElementId;
use crate::mapping::MappingNode;
use crate::status::{InstanceStatus, LinkPreciseStatus, LinkStatus, ResourcePreciseStatus, ResourceStatus};

/// Persisted state for one deployed blueprint instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    pub instance_id: ElementId,
    pub instance_name: String,
    pub status: InstanceStatus,
    pub resources: BTreeMap<String, ResourceState>,
    pub links: BTreeMap<String, LinkState>,
    pub children: BTreeMap<String, ChildState>,
    pub exports: BTreeMap<String, MappingNode>,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub last_status_update_at: Option<DateTime<Utc>>,
    pub durations: OperationDurations,
}

impl InstanceState {
    pub fn new(instance_id: ElementId, instance_name: impl Into<String>) -> Self {
        Self {
            instance_id,
            instance_name: instance_name.into(),
            status: InstanceStatus::Deploying,
            resources: BTreeMap::new(),
            links: BTreeMap::new(),
            children: BTreeMap::new(),
            exports: BTreeMap::new(),
            last_deployed_at: None,
            last_status_update_at: None,
            durations: OperationDurations::default(),
        }
    }

    /// Whether any resource in this instance has the given dependency name
    /// (used by the removal orderer's "has remaining dependents" check).
    pub fn dependents_of(&self, element_name: &str) -> Vec<String> {
        let mut out = Vec::new();
        for (name, res) in &self.resources {
            if res.depends_on_resources.iter().any(|d| d == element_name)
                || res.depends_on_children.iter().any(|d| d == element_name)
            {
                out.push(name.clone());
            }
        }
        for (name, child) in &self.children {
            if child.depends_on_resources.iter().any(|d| d == element_name)
                || child.depends_on_children.iter().any(|d| d == element_name)
            {
                out.push(name.clone());
            }
        }
        out
    }
}

/// Accumulated wall-clock durations for an operation, broken down by phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationDurations {
    pub total: Duration,
    pub config_complete: Option<Duration>,
    pub stabilising: Option<Duration>,
    pub attempt_durations: Vec<Duration>,
}

impl OperationDurations {
    /// Sum of every recorded retry attempt, which must equal `total` once
    /// the element reaches a terminal state (spec §3 invariant).
    pub fn attempts_total(&self) -> Duration {
        self.attempt_durations.iter().sum()
    }
}

/// Persisted state for one resource within an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_id: ElementId,
    pub resource_type: String,
    pub spec_data: MappingNode,
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub status: ResourceStatus,
    pub precise_status: ResourcePreciseStatus,
    pub last_deployed_at: Option<DateTime<Utc>>,
    pub last_status_update_at: Option<DateTime<Utc>>,
    pub durations: OperationDurations,
}

/// Persisted state for one link between two resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkState {
    pub resource_a_id: ElementId,
    pub resource_b_id: ElementId,
    pub link_data: MappingNode,
    pub status: LinkStatus,
    pub precise_status: LinkPreciseStatus,
    pub last_status_update_at: Option<DateTime<Utc>>,
    pub durations: OperationDurations,
}

/// Persisted reference to a nested child instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildState {
    pub instance_id: ElementId,
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependents_of_finds_direct_dependents() {
        let mut instance = InstanceState::new(ElementId::new(), "test");
        instance.resources.insert(
            "ordersApi".to_string(),
            ResourceState {
                resource_id: ElementId::new(),
                resource_type: "aws/lambda/function".to_string(),
                spec_data: MappingNode::Null,
                depends_on_resources: vec!["ordersDb".to_string()],
                depends_on_children: vec![],
                metadata: BTreeMap::new(),
                status: ResourceStatus::Deployed,
                precise_status: ResourcePreciseStatus::Deployed,
                last_deployed_at: None,
                last_status_update_at: None,
                durations: OperationDurations::default(),
            },
        );
        assert_eq!(instance.dependents_of("ordersDb"), vec!["ordersApi".to_string()]);
        assert!(instance.dependents_of("ordersApi").is_empty());
    }
}
