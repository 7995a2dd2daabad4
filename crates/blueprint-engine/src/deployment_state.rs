//! Ephemeral Deployment State: the thread-safe scratchpad a single
//! `Deploy`/`Destroy` call mutates while it runs (spec §2, §5). Created at
//! operation start, dropped at operation end - nothing here is persisted
//! directly; the orchestrator folds it into `InstanceState` once an element
//! reaches a terminal status.
//!
//! The lock only ever guards bookkeeping. No provider call is made while
//! holding it (spec §5's "never blocks a wave barrier" requirement).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use blueprint_core::mapping::MappingNode;
use blueprint_core::state::OperationDurations;

/// Per-operation bookkeeping, behind one short-critical-section mutex.
#[derive(Debug, Default)]
struct Inner {
    /// Logical names that reached a non-failure terminal status this
    /// operation (created, updated, or destroyed, depending on the call).
    succeeded: BTreeSet<String>,
    /// Logical names that failed, with their accumulated failure reasons.
    failed: BTreeMap<String, Vec<String>>,
    /// A link that failed but whose provider reports `LinkKind::Soft` - its
    /// reasons are still surfaced on its own event, but it doesn't flip the
    /// instance's overall status to failed (spec §6, "soft" link kind).
    soft_failed: BTreeMap<String, Vec<String>>,
    /// Per-element accumulated durations, folded into the instance total at
    /// Finish time.
    durations: BTreeMap<String, OperationDurations>,
    /// A deployed resource's computed fields, keyed by logical name, so a
    /// sibling resource still carrying `resolve_on_deploy` paths can be
    /// re-resolved against freshly available outputs once its dependency
    /// reaches this wave barrier (spec §9, "resolve-on-deploy").
    resource_outputs: BTreeMap<String, MappingNode>,
}

#[derive(Debug, Default)]
pub struct DeploymentState {
    inner: Mutex<Inner>,
}

impl DeploymentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, name: &str, durations: OperationDurations) {
        let mut inner = self.inner.lock().expect("deployment state mutex poisoned");
        inner.succeeded.insert(name.to_string());
        inner.durations.insert(name.to_string(), durations);
    }

    pub fn record_failure(&self, name: &str, reasons: Vec<String>, durations: OperationDurations) {
        let mut inner = self.inner.lock().expect("deployment state mutex poisoned");
        inner.failed.insert(name.to_string(), reasons);
        inner.durations.insert(name.to_string(), durations);
    }

    /// Marks `name` failed for a reason other than a provider call - e.g. a
    /// dependency of `name` already failed, so `name` is skipped outright.
    pub fn record_skipped(&self, name: &str, reason: String) {
        let mut inner = self.inner.lock().expect("deployment state mutex poisoned");
        inner.failed.insert(name.to_string(), vec![reason]);
    }

    /// Records a soft link's terminal failure: surfaced on its own event
    /// but excluded from `summarize`'s failed-elements/instance-status
    /// accounting.
    pub fn record_soft_failure(&self, name: &str, reasons: Vec<String>, durations: OperationDurations) {
        let mut inner = self.inner.lock().expect("deployment state mutex poisoned");
        inner.soft_failed.insert(name.to_string(), reasons);
        inner.durations.insert(name.to_string(), durations);
    }

    pub fn has_failed(&self, name: &str) -> bool {
        self.inner.lock().expect("deployment state mutex poisoned").failed.contains_key(name)
    }

    pub fn any_failures(&self) -> bool {
        !self.inner.lock().expect("deployment state mutex poisoned").failed.is_empty()
    }

    pub fn record_resource_output(&self, name: &str, output: MappingNode) {
        let mut inner = self.inner.lock().expect("deployment state mutex poisoned");
        inner.resource_outputs.insert(name.to_string(), output);
    }

    pub fn resource_outputs_snapshot(&self) -> BTreeMap<String, MappingNode> {
        self.inner.lock().expect("deployment state mutex poisoned").resource_outputs.clone()
    }

    /// Drains the accumulated results for the final `Finish` event: the
    /// failed element names, every failure reason in recording order, and
    /// the sum of every recorded element's total duration.
    pub fn summarize(&self) -> (Vec<String>, Vec<String>, OperationDurations) {
        let inner = self.inner.lock().expect("deployment state mutex poisoned");
        let failed_elements: Vec<String> = inner.failed.keys().cloned().collect();
        let failure_reasons: Vec<String> = inner.failed.values().flatten().cloned().collect();
        let mut total = OperationDurations::default();
        for d in inner.durations.values() {
            total.total += d.total;
            total.attempt_durations.extend(d.attempt_durations.iter().copied());
        }
        (failed_elements, failure_reasons, total)
    }
}
