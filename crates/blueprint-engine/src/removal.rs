//! Removal phase: the first half of `Deploy`'s two-phase body (spec §4.7).
//! Collects every element a change set is tearing down - explicit removals
//! plus the destroy side of a recreate, since a recreate is a destroy
//! immediately followed by a fresh create in the deployment phase - checks
//! the "no remaining dependents outside the removal set" invariant, and
//! destroys them in dependency order via the same per-element logic
//! `Container::destroy` uses.

use std::collections::BTreeSet;

use blueprint_core::changes::ChangeSet;
use blueprint_core::events::EventSender;
use blueprint_core::state::{InstanceState, OperationDurations};
use blueprint_core::{Error, Result};
use blueprint_deploy::removal_orderer::{order_removal, RemovalElement};

use crate::deployment_state::DeploymentState;
use crate::loader::Container;

impl Container {
    /// Runs the removal phase for one `Deploy` call. Returns once every
    /// removal wave has completed; failures are recorded into
    /// `deployment_state` rather than returned, so the deployment phase can
    /// still proceed for unrelated elements (spec §6: a failed element does
    /// not halt the rest of the operation).
    pub(crate) async fn run_removal_phase(
        &self,
        changes: &ChangeSet,
        current: &InstanceState,
        events: &EventSender,
        deployment_state: &DeploymentState,
    ) -> Result<()> {
        let to_remove = collect_removal_targets(changes);
        if to_remove.is_empty() {
            return Ok(());
        }

        let removal_set: BTreeSet<&str> = to_remove.iter().map(|e| e.name()).collect();
        for element in &to_remove {
            for dependent in current.dependents_of(element.name()) {
                if removal_set.contains(dependent.as_str()) {
                    continue;
                }
                return match element {
                    RemovalElement::Child(name) => Err(Error::RemovedChildHasDependents {
                        name: name.clone(),
                        dependents: vec![dependent],
                    }),
                    _ => Err(Error::RemovedResourceHasDependents {
                        name: element.name().to_string(),
                        dependents: vec![dependent],
                    }),
                };
            }
        }

        tracing::info!(instance_id = %current.instance_id, count = to_remove.len(), "removal phase starting");

        let waves = order_removal(&to_remove, current)?;
        for wave in waves {
            let mut handles = Vec::with_capacity(wave.len());
            for element in wave {
                let container = self.clone();
                let events = events.clone();
                let current_snapshot = current.clone();
                handles.push(tokio::spawn(async move {
                    container.destroy_element(&element, &current_snapshot, &events).await
                }));
            }
            for handle in handles {
                let outcome = handle
                    .await
                    .map_err(|join_err| Error::Internal(format!("removal task panicked: {join_err}")))?;
                match outcome {
                    Ok((name, durations)) => deployment_state.record_success(&name, durations),
                    Err((name, reasons)) => {
                        deployment_state.record_failure(&name, reasons, OperationDurations::default())
                    }
                }
            }
        }

        Ok(())
    }
}

/// A resource/link/child is in the removal phase's scope either because it
/// was staged as an outright removal, or because it's being recreated
/// (destroyed here, then redeployed fresh in the deployment phase). Shared
/// with [`crate::deploy`], which uses the same set to drop removed/recreated
/// entries out of the working instance snapshot once the removal phase
/// finishes.
pub(crate) fn collect_removal_targets(changes: &ChangeSet) -> Vec<RemovalElement> {
    let mut to_remove = Vec::new();
    for name in &changes.removed_resources {
        to_remove.push(RemovalElement::Resource(name.clone()));
    }
    for name in &changes.recreate_resources {
        to_remove.push(RemovalElement::Resource(name.clone()));
    }
    for name in &changes.removed_links {
        to_remove.push(RemovalElement::Link(name.clone()));
    }
    for name in &changes.removed_children {
        to_remove.push(RemovalElement::Child(name.clone()));
    }
    for name in &changes.recreate_children {
        to_remove.push(RemovalElement::Child(name.clone()));
    }
    to_remove
}

#[cfg(test)]
mod tests {
    use super::collect_removal_targets;
    use blueprint_core::changes::ChangeSet;
    use blueprint_deploy::removal_orderer::RemovalElement;

    #[test]
    fn recreate_entries_are_destroyed_alongside_explicit_removals() {
        let mut changes = ChangeSet::default();
        changes.removed_resources.push("oldCache".to_string());
        changes.recreate_resources.push("ordersDb".to_string());
        changes.recreate_children.push("coreInfra".to_string());

        let targets = collect_removal_targets(&changes);
        assert!(targets.contains(&RemovalElement::Resource("oldCache".to_string())));
        assert!(targets.contains(&RemovalElement::Resource("ordersDb".to_string())));
        assert!(targets.contains(&RemovalElement::Child("coreInfra".to_string())));
    }
}
