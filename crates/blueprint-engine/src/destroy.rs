//! `Container::destroy`: tears down a whole instance or a named subset of
//! its resources/links/children (spec §7, §4.10). Shares its per-element
//! teardown logic with the removal phase a `Deploy` call runs before
//! redeploying changed elements (see [`crate::removal`]).

use std::collections::BTreeSet;

use blueprint_core::events::{
    event_channel, ChildUpdateEvent, DeploymentUpdateEvent, EngineEvent, ErrEvent, EventReceiver, EventSender,
    FinishEvent, LinkUpdateEvent, ResourceUpdateEvent,
};
use blueprint_core::id::split_link_name;
use blueprint_core::state::{InstanceState, OperationDurations};
use blueprint_core::status::{ChildStatus, InstanceStatus, LinkPreciseStatus, ResourcePreciseStatus};
use blueprint_core::{Error, ElementId, Result};
use blueprint_deploy::destroyer::{destroy_link, destroy_resource, DestroyOutcome};
use blueprint_deploy::removal_orderer::{order_removal, RemovalElement};

use crate::deployment_state::DeploymentState;
use crate::loader::Container;
use crate::operation::DestroyRequest;

impl Container {
    /// Destroys a whole instance (empty name lists) or only the named
    /// resources/links/children, subject to the same "no remaining
    /// dependents outside the removal set" invariant the staged-removal
    /// path enforces.
    pub fn destroy(&self, request: DestroyRequest) -> (EventReceiver, tokio::task::JoinHandle<Result<()>>) {
        let (tx, rx) = event_channel();
        let container = self.clone();
        let handle = tokio::spawn(async move { container.destroy_inner(request, tx).await });
        (rx, handle)
    }

    async fn destroy_inner(&self, request: DestroyRequest, events: EventSender) -> Result<()> {
        let instance_id = request.instance_id;
        let mut current = self
            .state_container
            .get(instance_id)
            .await?
            .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))?;

        if current.status.is_mid_operation() {
            return Err(Error::InstanceStatusUpdateFailed {
                instance_id: instance_id.to_string(),
                message: "instance is already mid-operation".to_string(),
            });
        }

        current.status = InstanceStatus::Destroying;
        current.last_status_update_at = Some(chrono::Utc::now());
        self.state_container.save(&current).await?;
        let _ = events.send(EngineEvent::DeploymentUpdate(DeploymentUpdateEvent {
            instance_id,
            status: InstanceStatus::Destroying,
        }));

        let whole_instance = request.is_whole_instance();
        let to_remove = self.collect_destroy_targets(&request, &current)?;

        tracing::info!(instance_id = %instance_id, whole_instance, count = to_remove.len(), "destroy starting");

        let deployment_state = DeploymentState::new();
        let waves = order_removal(&to_remove, &current)?;
        let mut fatal: Option<Error> = None;

        'waves: for wave in waves {
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
                match handle.await {
                    Ok(Ok((name, durations))) => deployment_state.record_success(&name, durations),
                    Ok(Err((name, reasons))) => {
                        deployment_state.record_failure(&name, reasons, OperationDurations::default())
                    }
                    Err(join_err) => {
                        fatal = Some(Error::Internal(format!("destroy task panicked: {join_err}")));
                        break 'waves;
                    }
                }
            }
        }

        if let Some(err) = fatal {
            let _ = events.send(EngineEvent::Err(ErrEvent {
                instance_id,
                message: err.to_string(),
                reason: err.reason(),
            }));
            return Err(err);
        }

        let (failed_elements, failure_reasons, durations) = deployment_state.summarize();
        let final_status = if failed_elements.is_empty() {
            InstanceStatus::Destroyed
        } else {
            InstanceStatus::DestroyFailed
        };

        if final_status == InstanceStatus::Destroyed && whole_instance {
            self.state_container.remove(instance_id).await?;
        } else {
            for element in &to_remove {
                if deployment_state.has_failed(element.name()) {
                    continue;
                }
                match element {
                    RemovalElement::Resource(n) => {
                        current.resources.remove(n);
                    }
                    RemovalElement::Link(n) => {
                        current.links.remove(n);
                    }
                    RemovalElement::Child(n) => {
                        current.children.remove(n);
                    }
                }
            }
            current.status = final_status;
            current.last_status_update_at = Some(chrono::Utc::now());
            self.state_container.save(&current).await?;
        }

        let _ = events.send(EngineEvent::DeploymentUpdate(DeploymentUpdateEvent {
            instance_id,
            status: final_status,
        }));
        let _ = events.send(EngineEvent::Finish(FinishEvent {
            instance_id,
            status: final_status,
            failed_elements,
            failure_reasons,
            durations,
        }));

        Ok(())
    }

    fn collect_destroy_targets(&self, request: &DestroyRequest, current: &InstanceState) -> Result<Vec<RemovalElement>> {
        if request.is_whole_instance() {
            return Ok(current
                .resources
                .keys()
                .map(|n| RemovalElement::Resource(n.clone()))
                .chain(current.links.keys().map(|n| RemovalElement::Link(n.clone())))
                .chain(current.children.keys().map(|n| RemovalElement::Child(n.clone())))
                .collect());
        }

        let removal_set: BTreeSet<&str> = request
            .resource_names
            .iter()
            .map(String::as_str)
            .chain(request.link_names.iter().map(String::as_str))
            .chain(request.child_names.iter().map(String::as_str))
            .collect();

        for name in &removal_set {
            for dependent in current.dependents_of(name) {
                if !removal_set.contains(dependent.as_str()) {
                    return Err(Error::RemovedResourceHasDependents {
                        name: name.to_string(),
                        dependents: vec![dependent],
                    });
                }
            }
        }

        Ok(request
            .resource_names
            .iter()
            .map(|n| RemovalElement::Resource(n.clone()))
            .chain(request.link_names.iter().map(|n| RemovalElement::Link(n.clone())))
            .chain(request.child_names.iter().map(|n| RemovalElement::Child(n.clone())))
            .collect())
    }

    /// Destroys one element. Shared between a direct `Destroy` call and the
    /// removal phase `Deploy` runs before applying the rest of a change set
    /// (spec §4.10's "dependents destroyed before dependencies" ordering is
    /// identical in both callers; only how the removal set is collected
    /// differs).
    pub(crate) async fn destroy_element(
        &self,
        element: &RemovalElement,
        current: &InstanceState,
        events: &EventSender,
    ) -> std::result::Result<(String, OperationDurations), (String, Vec<String>)> {
        let instance_id = current.instance_id;
        let name = element.name().to_string();

        match element {
            RemovalElement::Resource(resource_name) => {
                let state = match current.resources.get(resource_name) {
                    Some(s) => s,
                    None => return Err((name, vec!["resource not found in persisted state".to_string()])),
                };
                let provider = match self.registry.resource(&state.resource_type) {
                    Some(p) => p,
                    None => {
                        return Err((
                            name,
                            vec![format!("no resource provider registered for '{}'", state.resource_type)],
                        ))
                    }
                };
                let policy = provider.get_retry_policy().unwrap_or_else(|| self.default_retry_policy());

                let _ = events.send(EngineEvent::ResourceUpdate(ResourceUpdateEvent {
                    instance_id,
                    resource_name: resource_name.clone(),
                    resource_id: Some(state.resource_id),
                    precise_status: ResourcePreciseStatus::Destroying,
                    change: None,
                    failure_reason: None,
                }));

                match destroy_resource(state.resource_id, &state.spec_data, provider.as_ref(), policy, None).await {
                    Ok(DestroyOutcome::Destroyed { durations }) => {
                        let _ = events.send(EngineEvent::ResourceUpdate(ResourceUpdateEvent {
                            instance_id,
                            resource_name: resource_name.clone(),
                            resource_id: Some(state.resource_id),
                            precise_status: ResourcePreciseStatus::Destroyed,
                            change: None,
                            failure_reason: None,
                        }));
                        Ok((name, durations))
                    }
                    Ok(DestroyOutcome::Failed { reasons, .. }) => {
                        let _ = events.send(EngineEvent::ResourceUpdate(ResourceUpdateEvent {
                            instance_id,
                            resource_name: resource_name.clone(),
                            resource_id: Some(state.resource_id),
                            precise_status: ResourcePreciseStatus::DestroyFailed,
                            change: None,
                            failure_reason: reasons.first().cloned(),
                        }));
                        Err((name, reasons))
                    }
                    Err(err) => Err((name, vec![err.to_string()])),
                }
            }
            RemovalElement::Link(link_key) => {
                let state = match current.links.get(link_key) {
                    Some(s) => s,
                    None => return Err((name, vec!["link not found in persisted state".to_string()])),
                };
                let (a_name, b_name) = match split_link_name(link_key) {
                    Some(pair) => pair,
                    None => return Err((name, vec!["malformed link name".to_string()])),
                };
                let a_type = current.resources.get(a_name).map(|r| r.resource_type.as_str());
                let b_type = current.resources.get(b_name).map(|r| r.resource_type.as_str());
                let provider = match a_type.zip(b_type).and_then(|(a, b)| self.registry.link(a, b)) {
                    Some(p) => p,
                    None => return Err((name, vec!["no link provider registered for endpoint types".to_string()])),
                };
                let policy = self.default_retry_policy();

                let _ = events.send(EngineEvent::LinkUpdate(LinkUpdateEvent {
                    instance_id,
                    link_name: link_key.clone(),
                    precise_status: LinkPreciseStatus::Destroying,
                    change: None,
                    failure_reason: None,
                }));

                match destroy_link(
                    state.resource_a_id,
                    state.resource_b_id,
                    &state.link_data,
                    provider.as_ref(),
                    policy,
                    None,
                )
                .await
                {
                    Ok(DestroyOutcome::Destroyed { durations }) => {
                        let _ = events.send(EngineEvent::LinkUpdate(LinkUpdateEvent {
                            instance_id,
                            link_name: link_key.clone(),
                            precise_status: LinkPreciseStatus::Destroyed,
                            change: None,
                            failure_reason: None,
                        }));
                        Ok((name, durations))
                    }
                    Ok(DestroyOutcome::Failed { reasons, .. }) => {
                        let _ = events.send(EngineEvent::LinkUpdate(LinkUpdateEvent {
                            instance_id,
                            link_name: link_key.clone(),
                            precise_status: LinkPreciseStatus::DestroyFailed,
                            change: None,
                            failure_reason: reasons.first().cloned(),
                        }));
                        Err((name, reasons))
                    }
                    Err(err) => Err((name, vec![err.to_string()])),
                }
            }
            RemovalElement::Child(child_name) => {
                let child_state = match current.children.get(child_name) {
                    Some(s) => s,
                    None => return Err((name, vec!["child not found in persisted state".to_string()])),
                };

                let _ = events.send(EngineEvent::ChildUpdate(ChildUpdateEvent {
                    instance_id,
                    child_name: child_name.clone(),
                    child_instance_id: Some(child_state.instance_id),
                    status: ChildStatus::Destroying,
                    change: None,
                    failure_reason: None,
                }));

                match self.destroy_child_recursive(child_state.instance_id).await {
                    Ok(durations) => {
                        let _ = events.send(EngineEvent::ChildUpdate(ChildUpdateEvent {
                            instance_id,
                            child_name: child_name.clone(),
                            child_instance_id: Some(child_state.instance_id),
                            status: ChildStatus::Destroyed,
                            change: None,
                            failure_reason: None,
                        }));
                        Ok((name, durations))
                    }
                    Err(reason) => {
                        let _ = events.send(EngineEvent::ChildUpdate(ChildUpdateEvent {
                            instance_id,
                            child_name: child_name.clone(),
                            child_instance_id: Some(child_state.instance_id),
                            status: ChildStatus::Failed,
                            change: None,
                            failure_reason: Some(reason.clone()),
                        }));
                        Err((name, vec![reason]))
                    }
                }
            }
        }
    }

    /// Recurses a child's own whole-instance destroy through this same
    /// engine. `destroy_inner` only ever reads the persisted `InstanceState`
    /// for the instance id it's given - it never consults `self.blueprint` -
    /// so the same `Container` (still bound to the parent blueprint) can
    /// safely drive a child instance's teardown directly. The child's own
    /// `ResourceUpdate`/`LinkUpdate` stream is absorbed here; the caller
    /// already emits a single `ChildUpdate` for the whole subtree rather
    /// than replaying every nested element event.
    async fn destroy_child_recursive(&self, child_instance_id: ElementId) -> std::result::Result<OperationDurations, String> {
        let (mut rx, handle) = self.destroy(DestroyRequest::whole_instance(child_instance_id));
        while rx.recv().await.is_some() {}
        match handle.await {
            Ok(Ok(())) => Ok(OperationDurations::default()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(join_err) => Err(format!("child destroy task panicked: {join_err}")),
        }
    }
}
