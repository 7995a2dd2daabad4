//! `Container::deploy`: the two-phase workhorse behind staging's change set
//! (spec §4.7). Phase one tears down everything the change set removes or
//! recreates by delegating to [`crate::removal::run_removal_phase`]; phase
//! two schedules every created/changed resource, link, and child into
//! dependency waves and drives each through its own deployer state machine.
//! `Rollback=true` runs the identical machinery over an inverted change set
//! (see [`crate::rollback`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use blueprint_core::changes::ChangeSet;
use blueprint_core::events::{
    event_channel, ChildUpdateEvent, DeploymentUpdateEvent, EngineEvent, ErrEvent, EventReceiver, EventSender,
    FinishEvent, LinkUpdateEvent, ResourceUpdateEvent,
};
use blueprint_core::graph::DependencyGraphNode;
use blueprint_core::id::ElementId;
use blueprint_core::mapping::MappingNode;
use blueprint_core::state::{ChildState, InstanceState, LinkState, OperationDurations, ResourceState};
use blueprint_core::status::{ChildStatus, InstanceStatus, LinkPreciseStatus, ResourcePreciseStatus, ResourceStatus};
use blueprint_core::substitution::SubstitutionContext;
use blueprint_core::{Error, Result};
use blueprint_deploy::link_deployer::{deploy_link, LinkDeployOutcome, LinkStageDurations};
use blueprint_deploy::removal_orderer::RemovalElement;
use blueprint_deploy::resource_deployer::{deploy_resource, ResourceDeployOutcome};

use crate::deploy_graph::build_deploy_graph;
use crate::deployment_state::DeploymentState;
use crate::loader::Container;
use crate::operation::DeployRequest;
use crate::removal::collect_removal_targets;
use crate::rollback::invert_for_rollback;

/// Aggregated outcome of one `run_deploy` pass, the same shape [`FinishEvent`]
/// carries. Surfaced directly to a recursive child deploy so its caller
/// doesn't have to re-derive it by replaying the child's own event stream.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub status: InstanceStatus,
    pub failed_elements: Vec<String>,
    pub failure_reasons: Vec<String>,
    pub durations: OperationDurations,
}

enum DeployTarget {
    New(String),
    Existing(ElementId),
}

/// Validates a `DeployRequest`'s instance addressing (spec §7, Deploy input
/// validation). Checked in a fixed order so the seeded test table's
/// "neither ID nor name" case lands on `MissingNameForNewInstance` rather
/// than `DeployMissingInstanceID`.
fn validate_deploy_request(request: &DeployRequest) -> Result<DeployTarget> {
    let has_id = request.instance_id.map(|id| !id.is_nil()).unwrap_or(false);
    let has_name = request.instance_name.as_deref().map(|s| !s.is_empty()).unwrap_or(false);

    if !has_id && !has_name {
        return Err(Error::MissingNameForNewInstance);
    }
    if has_id && has_name {
        return Err(Error::InstanceIDAndNameProvided);
    }
    if !has_id && (!request.changes.resource_changes.is_empty() || !request.changes.child_changes.is_empty()) {
        return Err(Error::DeployMissingInstanceID);
    }

    if has_id {
        Ok(DeployTarget::Existing(request.instance_id.expect("has_id implies Some")))
    } else {
        Ok(DeployTarget::New(
            request.instance_name.clone().expect("has_name implies Some"),
        ))
    }
}

enum DeployElementOutcome {
    Resource {
        state: ResourceState,
        durations: OperationDurations,
        computed: MappingNode,
    },
    Link {
        state: LinkState,
        durations: OperationDurations,
    },
    Child {
        state: ChildState,
        durations: OperationDurations,
    },
}

enum DeployElementError {
    /// A normal element-level failure; doesn't abort the rest of the wave.
    Failed {
        reasons: Vec<String>,
        soft: bool,
        durations: OperationDurations,
    },
    /// Unclassified error; the whole operation is aborted (spec §6, "other
    /// errors are fatal and terminate the whole operation").
    Fatal(Error),
}

impl Container {
    /// Deploys a new instance or applies a staged change set to an existing
    /// one. Fails fast with a `Finish` event (not a propagated error) if the
    /// target instance is already mid-operation, matching the spec's literal
    /// wording for that case - in deliberate contrast to `destroy`, whose
    /// analogous guard returns `Err` directly with no event at all.
    pub fn deploy(&self, request: DeployRequest) -> (EventReceiver, tokio::task::JoinHandle<Result<()>>) {
        let (tx, rx) = event_channel();
        let container = self.clone();
        let handle = tokio::spawn(async move { container.deploy_inner(request, tx).await });
        (rx, handle)
    }

    async fn deploy_inner(&self, request: DeployRequest, events: EventSender) -> Result<()> {
        let target = validate_deploy_request(&request)?;

        match &target {
            DeployTarget::Existing(id) => {
                let current = self
                    .state_container
                    .get(*id)
                    .await?
                    .ok_or_else(|| Error::InstanceNotFound(id.to_string()))?;

                if !request.rollback && current.status.is_mid_operation() {
                    let _ = events.send(EngineEvent::Finish(FinishEvent {
                        instance_id: *id,
                        status: InstanceStatus::InstanceStatusUpdateFailed,
                        failed_elements: Vec::new(),
                        failure_reasons: vec![format!("instance '{id}' is already being deployed")],
                        durations: OperationDurations::default(),
                    }));
                    return Ok(());
                }

                if request.rollback && !current.status.is_mid_operation() {
                    let err = Error::Internal(format!(
                        "rollback requested for instance '{id}' which is not mid-operation"
                    ));
                    let _ = events.send(EngineEvent::Err(ErrEvent {
                        instance_id: *id,
                        message: err.to_string(),
                        reason: err.reason(),
                    }));
                    return Err(err);
                }

                if !request.rollback && current.status == InstanceStatus::Deployed {
                    if let Some(checker) = &self.drift_checker {
                        let snapshot = instance_state_snapshot(&current);
                        let drift = checker.check(*id, &snapshot).await?;
                        if drift.has_drifted {
                            let err = Error::DriftDetected(drift.drifted_resources.len());
                            let _ = events.send(EngineEvent::Err(ErrEvent {
                                instance_id: *id,
                                message: err.to_string(),
                                reason: err.reason(),
                            }));
                            return Err(err);
                        }
                    }
                }
            }
            DeployTarget::New(_) if request.rollback => {
                let err = Error::Internal("rollback requested for a brand-new instance".to_string());
                let _ = events.send(EngineEvent::Err(ErrEvent {
                    instance_id: ElementId::nil(),
                    message: err.to_string(),
                    reason: err.reason(),
                }));
                return Err(err);
            }
            DeployTarget::New(_) => {}
        }

        let (instance_id, is_new, instance_name) = match target {
            DeployTarget::Existing(id) => (id, false, None),
            DeployTarget::New(name) => (ElementId::new(), true, Some(name)),
        };

        self.run_deploy(
            instance_id,
            is_new,
            instance_name.as_deref(),
            request.changes,
            request.rollback,
            &events,
        )
        .await
        .map(|_| ())
    }

    /// Runs one full deploy pass - removal phase, then dependency-ordered
    /// deployment waves - for either a root `Deploy` call or a recursive
    /// child include encountered while deploying its parent.
    async fn run_deploy(
        &self,
        instance_id: ElementId,
        is_new: bool,
        instance_name: Option<&str>,
        changes: ChangeSet,
        rollback: bool,
        events: &EventSender,
    ) -> Result<DeployOutcome> {
        let mut working = if is_new {
            InstanceState::new(instance_id, instance_name.unwrap_or_default())
        } else {
            self.state_container
                .get(instance_id)
                .await?
                .ok_or_else(|| Error::InstanceNotFound(instance_id.to_string()))?
        };

        let start_status = if rollback { InstanceStatus::RollingBack } else { InstanceStatus::Deploying };
        working.status = start_status;
        working.last_status_update_at = Some(chrono::Utc::now());
        self.state_container.save(&working).await?;
        let _ = events.send(EngineEvent::DeploymentUpdate(DeploymentUpdateEvent {
            instance_id,
            status: start_status,
        }));

        let effective_changes = if rollback { invert_for_rollback(&changes) } else { changes };

        tracing::info!(instance_id = %instance_id, rollback, "deploy starting");

        let deployment_state = DeploymentState::new();

        if let Err(err) = self.run_removal_phase(&effective_changes, &working, events, &deployment_state).await {
            let _ = events.send(EngineEvent::Err(ErrEvent {
                instance_id,
                message: err.to_string(),
                reason: err.reason(),
            }));
            return Err(err);
        }
        apply_removals(&mut working, &effective_changes, &deployment_state);

        let graph = match build_deploy_graph(&effective_changes, Some(&working), &self.registry).await {
            Ok(g) => g,
            Err(err) => {
                let _ = events.send(EngineEvent::Err(ErrEvent {
                    instance_id,
                    message: err.to_string(),
                    reason: err.reason(),
                }));
                return Err(err);
            }
        };

        let waves = match graph.topological_waves() {
            Ok(w) => w,
            Err(unplaced) => {
                let names = graph.names(&unplaced);
                let involves_link = unplaced.iter().any(|&i| matches!(graph.node(i), DependencyGraphNode::Link(_)));
                let err = if involves_link { Error::CircularLinks(names) } else { Error::ReferenceCycle(names) };
                let _ = events.send(EngineEvent::Err(ErrEvent {
                    instance_id,
                    message: err.to_string(),
                    reason: err.reason(),
                }));
                return Err(err);
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.wave_concurrency_cap.max(1) as usize));

        for wave in waves {
            let mut handles = Vec::with_capacity(wave.len());
            for idx in &wave {
                let node = graph.node(*idx).clone();
                let name = node.name().to_string();

                let blocked_on = graph
                    .dependencies_of(*idx)
                    .iter()
                    .map(|&d| graph.node(d).name().to_string())
                    .find(|dep| deployment_state.has_failed(dep));
                if let Some(dep) = blocked_on {
                    deployment_state.record_skipped(&name, format!("dependency '{dep}' failed to deploy"));
                    continue;
                }

                let container = self.clone();
                let events = events.clone();
                let changes = effective_changes.clone();
                let snapshot = working.clone();
                let resource_outputs = deployment_state.resource_outputs_snapshot();
                let permit = semaphore.clone();

                handles.push((
                    name,
                    tokio::spawn(async move {
                        let _permit = permit.acquire_owned().await.expect("wave semaphore never closes");
                        container
                            .deploy_element(&node, &changes, &snapshot, &resource_outputs, rollback, &events)
                            .await
                    }),
                ));
            }

            for (name, handle) in handles {
                match handle.await {
                    Ok(Ok(DeployElementOutcome::Resource { state, durations, computed })) => {
                        deployment_state.record_success(&name, durations);
                        deployment_state.record_resource_output(&name, computed);
                        working.resources.insert(name, state);
                    }
                    Ok(Ok(DeployElementOutcome::Link { state, durations })) => {
                        deployment_state.record_success(&name, durations);
                        working.links.insert(name, state);
                    }
                    Ok(Ok(DeployElementOutcome::Child { state, durations })) => {
                        deployment_state.record_success(&name, durations);
                        working.children.insert(name, state);
                    }
                    Ok(Err(DeployElementError::Failed { reasons, soft, durations })) => {
                        if soft {
                            deployment_state.record_soft_failure(&name, reasons, durations);
                        } else {
                            deployment_state.record_failure(&name, reasons, durations);
                        }
                    }
                    Ok(Err(DeployElementError::Fatal(err))) => {
                        let _ = events.send(EngineEvent::Err(ErrEvent {
                            instance_id,
                            message: err.to_string(),
                            reason: err.reason(),
                        }));
                        return Err(err);
                    }
                    Err(join_err) => {
                        let err = Error::Internal(format!("deploy task panicked: {join_err}"));
                        let _ = events.send(EngineEvent::Err(ErrEvent {
                            instance_id,
                            message: err.to_string(),
                            reason: err.reason(),
                        }));
                        return Err(err);
                    }
                }
            }

            self.state_container.save(&working).await?;
        }

        let (failed_elements, failure_reasons, durations) = deployment_state.summarize();
        let final_status = match (rollback, failed_elements.is_empty()) {
            (false, true) => InstanceStatus::Deployed,
            (false, false) => InstanceStatus::DeployFailed,
            (true, true) => InstanceStatus::RolledBack,
            (true, false) => InstanceStatus::RollbackFailed,
        };

        working.status = final_status;
        working.last_status_update_at = Some(chrono::Utc::now());
        if matches!(final_status, InstanceStatus::Deployed | InstanceStatus::RolledBack) {
            working.last_deployed_at = Some(chrono::Utc::now());
        }
        working.durations = durations.clone();
        self.state_container.save(&working).await?;

        let _ = events.send(EngineEvent::DeploymentUpdate(DeploymentUpdateEvent {
            instance_id,
            status: final_status,
        }));
        let _ = events.send(EngineEvent::Finish(FinishEvent {
            instance_id,
            status: final_status,
            failed_elements: failed_elements.clone(),
            failure_reasons: failure_reasons.clone(),
            durations: durations.clone(),
        }));

        Ok(DeployOutcome {
            status: final_status,
            failed_elements,
            failure_reasons,
            durations,
        })
    }

    /// Deploys one node from the wave graph. `current` is the working
    /// instance snapshot *after* the removal phase has already dropped
    /// removed/recreated entries, so a missing `current.resources[name]`
    /// reliably means "this is a create", never "this was just removed".
    #[allow(clippy::too_many_arguments)]
    async fn deploy_element(
        &self,
        node: &DependencyGraphNode,
        changes: &ChangeSet,
        current: &InstanceState,
        resource_outputs: &BTreeMap<String, MappingNode>,
        rollback: bool,
        events: &EventSender,
    ) -> std::result::Result<DeployElementOutcome, DeployElementError> {
        match node {
            DependencyGraphNode::Resource(name) => self.deploy_resource_node(name, changes, current, resource_outputs, events).await,
            DependencyGraphNode::Link(name) => self.deploy_link_node(name, changes, current, events).await,
            DependencyGraphNode::Child(name) => self.deploy_child_node(name, changes, current, rollback, events).await,
        }
    }

    async fn deploy_resource_node(
        &self,
        name: &str,
        changes: &ChangeSet,
        current: &InstanceState,
        resource_outputs: &BTreeMap<String, MappingNode>,
        events: &EventSender,
    ) -> std::result::Result<DeployElementOutcome, DeployElementError> {
        let change = changes
            .new_resources
            .get(name)
            .or_else(|| changes.resource_changes.get(name))
            .ok_or_else(|| DeployElementError::Fatal(Error::DeployMissingResourceChanges))?;

        let resource_id = current.resources.get(name).map(|r| r.resource_id);

        let resolved_spec = if change.partially_resolved {
            let context = SubstitutionContext {
                variables: BTreeMap::new(),
                resolved_resources: resource_outputs.clone(),
                each_item: None,
            };
            let resolved = self
                .resolver
                .resolve_tree(&change.resolved_spec, &context)
                .await
                .map_err(DeployElementError::Fatal)?;
            if !resolved.resolve_on_deploy.is_empty() {
                return Err(DeployElementError::Fatal(Error::DeployMissingPartiallyResolvedResource(
                    name.to_string(),
                )));
            }
            resolved.value
        } else {
            change.resolved_spec.clone()
        };

        let provider = match self.registry.resource(&change.resource_type) {
            Some(p) => p,
            None => {
                return Err(DeployElementError::Failed {
                    reasons: vec![format!("no resource provider registered for '{}'", change.resource_type)],
                    soft: false,
                    durations: OperationDurations::default(),
                })
            }
        };
        let policy = provider.get_retry_policy().unwrap_or_else(|| self.default_retry_policy());
        let stabilisation = self.default_stabilisation();

        let _ = events.send(EngineEvent::ResourceUpdate(ResourceUpdateEvent {
            instance_id: current.instance_id,
            resource_name: name.to_string(),
            resource_id,
            precise_status: ResourcePreciseStatus::Deploying,
            change: Some(change.clone()),
            failure_reason: None,
        }));

        match deploy_resource(resource_id, &resolved_spec, provider.as_ref(), policy, stabilisation, None).await {
            Ok(ResourceDeployOutcome::Deployed { resource_id, computed_fields, durations }) => {
                let merged = merge_computed_fields(&resolved_spec, &computed_fields);
                let _ = events.send(EngineEvent::ResourceUpdate(ResourceUpdateEvent {
                    instance_id: current.instance_id,
                    resource_name: name.to_string(),
                    resource_id: Some(resource_id),
                    precise_status: ResourcePreciseStatus::Deployed,
                    change: None,
                    failure_reason: None,
                }));
                Ok(DeployElementOutcome::Resource {
                    state: ResourceState {
                        resource_id,
                        resource_type: change.resource_type.clone(),
                        spec_data: merged.clone(),
                        depends_on_resources: change.depends_on_resources.clone(),
                        depends_on_children: change.depends_on_children.clone(),
                        metadata: BTreeMap::new(),
                        status: ResourceStatus::Deployed,
                        precise_status: ResourcePreciseStatus::Deployed,
                        last_deployed_at: Some(chrono::Utc::now()),
                        last_status_update_at: Some(chrono::Utc::now()),
                        durations: durations.clone(),
                    },
                    durations,
                    computed: merged,
                })
            }
            Ok(ResourceDeployOutcome::Failed { reasons, durations }) => {
                let _ = events.send(EngineEvent::ResourceUpdate(ResourceUpdateEvent {
                    instance_id: current.instance_id,
                    resource_name: name.to_string(),
                    resource_id,
                    precise_status: ResourcePreciseStatus::DeployFailed,
                    change: None,
                    failure_reason: reasons.first().cloned(),
                }));
                Err(DeployElementError::Failed { reasons, soft: false, durations })
            }
            Err(err) => Err(DeployElementError::Fatal(err)),
        }
    }

    async fn deploy_link_node(
        &self,
        name: &str,
        changes: &ChangeSet,
        current: &InstanceState,
        events: &EventSender,
    ) -> std::result::Result<DeployElementOutcome, DeployElementError> {
        let change = changes
            .new_links
            .get(name)
            .or_else(|| changes.link_changes.get(name))
            .ok_or_else(|| DeployElementError::Fatal(Error::Internal(format!("link '{name}' has no staged change"))))?;

        let resource_a_id = current.resources.get(&change.resource_a_name).map(|r| r.resource_id);
        let resource_b_id = current.resources.get(&change.resource_b_name).map(|r| r.resource_id);
        let (Some(resource_a_id), Some(resource_b_id)) = (resource_a_id, resource_b_id) else {
            return Err(DeployElementError::Failed {
                reasons: vec!["link endpoint resource not yet deployed".to_string()],
                soft: false,
                durations: OperationDurations::default(),
            });
        };

        let a_type = current.resources.get(&change.resource_a_name).map(|r| r.resource_type.as_str());
        let b_type = current.resources.get(&change.resource_b_name).map(|r| r.resource_type.as_str());
        let provider = match a_type.zip(b_type).and_then(|(a, b)| self.registry.link(a, b)) {
            Some(p) => p,
            None => {
                return Err(DeployElementError::Failed {
                    reasons: vec!["no link provider registered for endpoint types".to_string()],
                    soft: false,
                    durations: OperationDurations::default(),
                })
            }
        };
        let soft = provider.get_kind() == blueprint_core::provider::LinkKind::Soft;
        let policy = self.default_retry_policy();

        let _ = events.send(EngineEvent::LinkUpdate(LinkUpdateEvent {
            instance_id: current.instance_id,
            link_name: name.to_string(),
            precise_status: LinkPreciseStatus::UpdatingResourceA,
            change: Some(change.clone()),
            failure_reason: None,
        }));

        match deploy_link(resource_a_id, resource_b_id, &change.resolved_link_data, provider.as_ref(), policy, None).await {
            Ok(LinkDeployOutcome::Deployed { durations }) => {
                let combined = combine_link_durations(&durations);
                let _ = events.send(EngineEvent::LinkUpdate(LinkUpdateEvent {
                    instance_id: current.instance_id,
                    link_name: name.to_string(),
                    precise_status: LinkPreciseStatus::Deployed,
                    change: None,
                    failure_reason: None,
                }));
                Ok(DeployElementOutcome::Link {
                    state: LinkState {
                        resource_a_id,
                        resource_b_id,
                        link_data: change.resolved_link_data.clone(),
                        status: blueprint_core::status::LinkStatus::Deployed,
                        precise_status: LinkPreciseStatus::Deployed,
                        last_status_update_at: Some(chrono::Utc::now()),
                        durations: combined.clone(),
                    },
                    durations: combined,
                })
            }
            Ok(LinkDeployOutcome::Failed { stage: _, reasons, durations }) => {
                let combined = combine_link_durations(&durations);
                let _ = events.send(EngineEvent::LinkUpdate(LinkUpdateEvent {
                    instance_id: current.instance_id,
                    link_name: name.to_string(),
                    precise_status: LinkPreciseStatus::DeployFailed,
                    change: None,
                    failure_reason: reasons.first().cloned(),
                }));
                Err(DeployElementError::Failed { reasons, soft, durations: combined })
            }
            Err(err) => Err(DeployElementError::Fatal(err)),
        }
    }

    async fn deploy_child_node(
        &self,
        name: &str,
        changes: &ChangeSet,
        current: &InstanceState,
        rollback: bool,
        events: &EventSender,
    ) -> std::result::Result<DeployElementOutcome, DeployElementError> {
        let change = changes
            .new_children
            .get(name)
            .or_else(|| changes.child_changes.get(name))
            .ok_or_else(|| DeployElementError::Fatal(Error::Internal(format!("child '{name}' has no staged change"))))?;

        let existing = current.children.get(name);
        let child_instance_id = existing.map(|c| c.instance_id).unwrap_or_else(ElementId::new);
        let is_new_child = existing.is_none();

        let _ = events.send(EngineEvent::ChildUpdate(ChildUpdateEvent {
            instance_id: current.instance_id,
            child_name: name.to_string(),
            child_instance_id: Some(child_instance_id),
            status: ChildStatus::Deploying,
            change: Some(change.clone()),
            failure_reason: None,
        }));

        let child_name = if is_new_child { Some(name) } else { None };
        let outcome = self
            .run_deploy(
                child_instance_id,
                is_new_child,
                child_name,
                (*change.changes).clone(),
                rollback,
                events,
            )
            .await;

        match outcome {
            Ok(result) if result.failed_elements.is_empty() => {
                let _ = events.send(EngineEvent::ChildUpdate(ChildUpdateEvent {
                    instance_id: current.instance_id,
                    child_name: name.to_string(),
                    child_instance_id: Some(child_instance_id),
                    status: ChildStatus::Deployed,
                    change: None,
                    failure_reason: None,
                }));
                Ok(DeployElementOutcome::Child {
                    state: ChildState {
                        instance_id: child_instance_id,
                        depends_on_resources: change.depends_on_resources.clone(),
                        depends_on_children: change.depends_on_children.clone(),
                    },
                    durations: result.durations,
                })
            }
            Ok(result) => {
                let _ = events.send(EngineEvent::ChildUpdate(ChildUpdateEvent {
                    instance_id: current.instance_id,
                    child_name: name.to_string(),
                    child_instance_id: Some(child_instance_id),
                    status: ChildStatus::Failed,
                    change: None,
                    failure_reason: result.failure_reasons.first().cloned(),
                }));
                Err(DeployElementError::Failed {
                    reasons: result.failure_reasons,
                    soft: false,
                    durations: result.durations,
                })
            }
            Err(err) => Err(DeployElementError::Fatal(err.wrap_child_path(change.tree_path.clone()))),
        }
    }
}

/// Drops every removed/recreated resource, link, and child out of the
/// working snapshot once the removal phase has destroyed it, so the
/// deployment phase sees a plain "not present yet" for anything being
/// recreated rather than having to special-case it.
fn apply_removals(working: &mut InstanceState, changes: &ChangeSet, deployment_state: &DeploymentState) {
    for element in collect_removal_targets(changes) {
        if deployment_state.has_failed(element.name()) {
            continue;
        }
        match element {
            RemovalElement::Resource(n) => {
                working.resources.remove(&n);
            }
            RemovalElement::Link(n) => {
                working.links.remove(&n);
            }
            RemovalElement::Child(n) => {
                working.children.remove(&n);
            }
        }
    }
}

/// Folds a resource's provider-computed fields into its resolved spec for
/// persistence. `computed` is typically a sparse object of just the
/// provider-assigned fields (e.g. a generated ARN); anything else is taken
/// as a full override of `base`.
fn merge_computed_fields(base: &MappingNode, computed: &MappingNode) -> MappingNode {
    match (base, computed) {
        (MappingNode::Object(base_fields), MappingNode::Object(computed_fields)) => {
            let mut merged = base_fields.clone();
            for (key, value) in computed_fields {
                merged.insert(key.clone(), value.clone());
            }
            MappingNode::Object(merged)
        }
        (_, MappingNode::Null) => base.clone(),
        _ => computed.clone(),
    }
}

/// Collapses a link's three independently-timed stages into the single
/// [`OperationDurations`] `LinkState` persists.
fn combine_link_durations(stages: &LinkStageDurations) -> OperationDurations {
    let mut combined = OperationDurations::default();
    for stage in [&stages.resource_a, &stages.resource_b, &stages.intermediaries] {
        combined.total += stage.total;
        combined.attempt_durations.extend(stage.attempt_durations.iter().copied());
    }
    combined
}

/// A minimal representation of an instance's current resource specs for
/// drift checking - a provider-agnostic concern the engine only needs to
/// hand to a [`blueprint_core::provider::DriftChecker`] as an opaque
/// snapshot, not interpret itself.
fn instance_state_snapshot(state: &InstanceState) -> MappingNode {
    let mut resources = BTreeMap::new();
    for (name, resource) in &state.resources {
        resources.insert(name.clone(), resource.spec_data.clone());
    }
    MappingNode::Object(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deploy_request(instance_id: Option<ElementId>, instance_name: Option<&str>) -> DeployRequest {
        DeployRequest {
            instance_id,
            instance_name: instance_name.map(String::from),
            changes: ChangeSet::default(),
            rollback: false,
        }
    }

    #[test]
    fn neither_id_nor_name_is_missing_name_for_new_instance() {
        let err = validate_deploy_request(&deploy_request(None, None)).unwrap_err();
        assert!(matches!(err, Error::MissingNameForNewInstance));
    }

    #[test]
    fn both_id_and_name_is_rejected() {
        let err = validate_deploy_request(&deploy_request(Some(ElementId::new()), Some("ordersStack"))).unwrap_err();
        assert!(matches!(err, Error::InstanceIDAndNameProvided));
    }

    #[test]
    fn name_only_resolves_to_a_new_target() {
        let target = validate_deploy_request(&deploy_request(None, Some("ordersStack"))).unwrap();
        assert!(matches!(target, DeployTarget::New(name) if name == "ordersStack"));
    }

    #[test]
    fn id_only_resolves_to_an_existing_target() {
        let id = ElementId::new();
        let target = validate_deploy_request(&deploy_request(Some(id), None)).unwrap();
        assert!(matches!(target, DeployTarget::Existing(got) if got == id));
    }

    #[test]
    fn resource_or_child_changes_without_an_id_are_rejected() {
        let mut request = deploy_request(None, None);
        request.changes.resource_changes.insert(
            "ordersApi".to_string(),
            blueprint_core::changes::ResourceChange {
                resource_id: None,
                resource_type: "test/api".to_string(),
                resolved_spec: MappingNode::Null,
                field_changes: vec![],
                depends_on_resources: vec![],
                depends_on_children: vec![],
                partially_resolved: false,
            },
        );
        let err = validate_deploy_request(&request).unwrap_err();
        assert!(matches!(err, Error::DeployMissingInstanceID));
    }

    #[test]
    fn merge_computed_fields_overlays_onto_the_base_object() {
        let base = MappingNode::Object(BTreeMap::from([
            ("name".to_string(), MappingNode::String("ordersQueue".to_string())),
        ]));
        let computed = MappingNode::Object(BTreeMap::from([("arn".to_string(), MappingNode::String("arn:aws:sqs:...".to_string()))]));
        let merged = merge_computed_fields(&base, &computed);
        assert_eq!(merged.get_path("name"), Some(&MappingNode::String("ordersQueue".to_string())));
        assert_eq!(merged.get_path("arn"), Some(&MappingNode::String("arn:aws:sqs:...".to_string())));
    }

    #[test]
    fn merge_computed_fields_with_null_keeps_the_base() {
        let base = MappingNode::Object(BTreeMap::from([("name".to_string(), MappingNode::String("x".to_string()))]));
        let merged = merge_computed_fields(&base, &MappingNode::Null);
        assert_eq!(merged.get_path("name"), Some(&MappingNode::String("x".to_string())));
    }

    #[test]
    fn combine_link_durations_sums_all_three_stages() {
        let mut stages = LinkStageDurations::default();
        stages.resource_a.total = std::time::Duration::from_secs(1);
        stages.resource_b.total = std::time::Duration::from_secs(2);
        stages.intermediaries.total = std::time::Duration::from_secs(3);
        let combined = combine_link_durations(&stages);
        assert_eq!(combined.total, std::time::Duration::from_secs(6));
    }

    #[test]
    fn apply_removals_drops_recreated_resources_but_keeps_failed_ones() {
        let mut working = InstanceState::new(ElementId::new(), "test");
        working.resources.insert(
            "ordersDb".to_string(),
            ResourceState {
                resource_id: ElementId::new(),
                resource_type: "test/db".to_string(),
                spec_data: MappingNode::Null,
                depends_on_resources: vec![],
                depends_on_children: vec![],
                metadata: BTreeMap::new(),
                status: ResourceStatus::Deployed,
                precise_status: ResourcePreciseStatus::Deployed,
                last_deployed_at: None,
                last_status_update_at: None,
                durations: OperationDurations::default(),
            },
        );
        let mut changes = ChangeSet::default();
        changes.recreate_resources.push("ordersDb".to_string());

        let deployment_state = DeploymentState::new();
        apply_removals(&mut working, &changes, &deployment_state);
        assert!(!working.resources.contains_key("ordersDb"));
    }
}
