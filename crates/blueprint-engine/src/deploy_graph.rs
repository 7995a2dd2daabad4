//! Builds the deployment-phase dependency graph from a staged `ChangeSet`
//! (spec §4.2), reusing the dependency analyser `blueprint-stage` already
//! implements for staging's own graph validation - the deployment scheduler
//! needs the same shape of graph, just over a different node set (only the
//! elements actually being created or changed this call, rather than every
//! resource in the expanded blueprint).

use std::collections::BTreeMap;

use blueprint_core::changes::ChangeSet;
use blueprint_core::graph::DependencyGraph;
use blueprint_core::id::split_link_name;
use blueprint_core::provider::ProviderRegistry;
use blueprint_core::state::InstanceState;
use blueprint_core::{Error, Result};
use blueprint_stage::dependency_analyser::{
    build_dependency_graph, ChildDependencyInput, DependencyInput, LinkDependencyInput, ResourceDependencyInput,
};

/// Resolves the effective resource type for `name`: from the staged change
/// if it's being created or updated this call, otherwise from persisted
/// state for an untouched endpoint a new link is being attached to.
fn resource_type_of<'a>(name: &str, changes: &'a ChangeSet, current: Option<&'a InstanceState>) -> Option<&'a str> {
    changes
        .new_resources
        .get(name)
        .or_else(|| changes.resource_changes.get(name))
        .map(|c| c.resource_type.as_str())
        .or_else(|| current.and_then(|c| c.resources.get(name)).map(|r| r.resource_type.as_str()))
}

/// Builds the wave-scheduler's dependency graph over every resource, link,
/// and child this `Deploy` call is creating or changing.
pub async fn build_deploy_graph(
    changes: &ChangeSet,
    current: Option<&InstanceState>,
    registry: &ProviderRegistry,
) -> Result<DependencyGraph> {
    let mut resources: BTreeMap<String, ResourceDependencyInput> = BTreeMap::new();
    for (name, change) in changes.new_resources.iter().chain(changes.resource_changes.iter()) {
        resources.insert(
            name.clone(),
            ResourceDependencyInput {
                depends_on_resources: change.depends_on_resources.clone(),
                depends_on_children: change.depends_on_children.clone(),
            },
        );
    }

    let mut children: BTreeMap<String, ChildDependencyInput> = BTreeMap::new();
    for (name, change) in changes.new_children.iter().chain(changes.child_changes.iter()) {
        children.insert(
            name.clone(),
            ChildDependencyInput {
                depends_on_resources: change.depends_on_resources.clone(),
                depends_on_children: change.depends_on_children.clone(),
            },
        );
    }

    let mut links = Vec::with_capacity(changes.new_links.len() + changes.link_changes.len());
    for key in changes.new_links.keys().chain(changes.link_changes.keys()) {
        let (a_name, b_name) = split_link_name(key).ok_or_else(|| Error::Internal(format!("malformed link name '{key}'")))?;
        let a_type = resource_type_of(a_name, changes, current)
            .ok_or_else(|| Error::Internal(format!("link '{key}' endpoint '{a_name}' has no known resource type")))?;
        let b_type = resource_type_of(b_name, changes, current)
            .ok_or_else(|| Error::Internal(format!("link '{key}' endpoint '{b_name}' has no known resource type")))?;
        let provider = registry
            .link(a_type, b_type)
            .ok_or_else(|| Error::Internal(format!("no link provider registered for '{a_type}' <-> '{b_type}'")))?;
        links.push(LinkDependencyInput {
            resource_a_name: a_name.to_string(),
            resource_b_name: b_name.to_string(),
            priority: provider.get_priority_resource().await,
        });
    }

    build_dependency_graph(&DependencyInput { resources, children, links })
}
