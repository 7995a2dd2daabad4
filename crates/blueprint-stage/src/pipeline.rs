//! Ties the Template Expander, Dependency Analyser, and Resource/Link/Child
//! Change Stagers together into the `StageChanges` phase sequence (spec
//! §4.6): expand templates, validate the dependency graph is acyclic, stage
//! every resource and link in the expanded blueprint, recurse into every
//! child include, then assemble the full [`ChangeSet`].

use std::collections::{BTreeMap, BTreeSet};

use async_recursion::async_recursion;

use blueprint_core::blueprint::BlueprintSpec;
use blueprint_core::changes::{ChangeSet, ChildChange};
use blueprint_core::child_resolver::ChildBlueprintResolver;
use blueprint_core::id::link_name;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::ProviderRegistry;
use blueprint_core::reference_scan::collect_references;
use blueprint_core::state::InstanceState;
use blueprint_core::state_container::StateContainer;
use blueprint_core::substitution::SubstitutionContext;
use blueprint_core::substitution::SubstitutionResolver;
use blueprint_core::{ElementId, Result};

use crate::child_stager::resolve_child;
use crate::dependency_analyser::{
    build_dependency_graph, ChildDependencyInput, DependencyInput, LinkDependencyInput, ResourceDependencyInput,
};
use crate::export_diff::diff_exports;
use crate::link_stager::{discover_link_pairs, stage_link, StagedLink};
use crate::resource_stager::{stage_resource, StagedResource};
use crate::staging_events::{StagingEvent, StagingEventSender};
use crate::template_expander::expand_templates;

/// Everything one `StageChanges` call (at any nesting depth) needs.
pub struct StageChangesInput<'a> {
    pub blueprint: &'a BlueprintSpec,
    pub current: Option<&'a InstanceState>,
    pub registry: &'a ProviderRegistry,
    pub resolver: &'a dyn SubstitutionResolver,
    pub child_resolver: &'a dyn ChildBlueprintResolver,
    pub state_container: Option<&'a dyn StateContainer>,
    pub context: SubstitutionContext,
    /// Instance tree path of the container this call is staging, e.g.
    /// `"blueprint-instance-2"` at the root or
    /// `"blueprint-instance-2/coreInfra"` for a nested child.
    pub tree_path: String,
    /// Instance IDs from the root down to (and including) `current`'s,
    /// used for child cycle detection.
    pub ancestor_instance_ids: Vec<ElementId>,
    pub max_depth: u32,
    pub current_depth: u32,
}

/// Runs the full staging pipeline for one container, recursing into every
/// child include (spec §4.6). `events`, if provided, receives a progress
/// message per staged resource/link/child plus a final `Complete`.
#[async_recursion]
pub async fn stage_changes<'a>(input: StageChangesInput<'a>, events: Option<&'a StagingEventSender>) -> Result<ChangeSet> {
    let expansion = expand_templates(input.blueprint, input.resolver, &input.context).await?;
    let blueprint = &expansion.blueprint;

    let mut change_set = ChangeSet::default();

    let resource_deps: BTreeMap<String, ResourceDependencyInput> = blueprint
        .resources
        .iter()
        .map(|(name, resource)| {
            let chain = collect_references(&resource.spec);
            let mut depends_on_resources = resource.depends_on.clone();
            depends_on_resources.extend(chain.resources.into_iter().filter(|r| r != name));
            depends_on_resources.sort();
            depends_on_resources.dedup();
            let mut depends_on_children: Vec<String> = chain.children.into_iter().collect();
            depends_on_children.sort();
            depends_on_children.dedup();
            (
                name.clone(),
                ResourceDependencyInput {
                    depends_on_resources,
                    depends_on_children,
                },
            )
        })
        .collect();

    let link_pairs = discover_link_pairs(&blueprint.resources);
    let mut link_deps = Vec::with_capacity(link_pairs.len());
    for (a_name, b_name) in &link_pairs {
        let a = &blueprint.resources[a_name];
        let b = &blueprint.resources[b_name];
        if let Some(provider) = input.registry.link(&a.resource_type, &b.resource_type) {
            link_deps.push(LinkDependencyInput {
                resource_a_name: a_name.clone(),
                resource_b_name: b_name.clone(),
                priority: provider.get_priority_resource().await,
            });
        }
    }

    let child_deps: BTreeMap<String, ChildDependencyInput> = blueprint
        .includes
        .iter()
        .map(|(name, include)| {
            let mut chain = collect_references(&include.path);
            for variable in include.variables.values() {
                let var_chain = collect_references(variable);
                chain.resources.extend(var_chain.resources);
                chain.children.extend(var_chain.children);
            }
            let mut depends_on_resources: Vec<String> = chain.resources.into_iter().collect();
            depends_on_resources.sort();
            let mut depends_on_children: Vec<String> =
                chain.children.into_iter().filter(|c| c != name).collect();
            depends_on_children.sort();
            (
                name.clone(),
                ChildDependencyInput {
                    depends_on_resources,
                    depends_on_children,
                },
            )
        })
        .collect();

    build_dependency_graph(&DependencyInput {
        resources: resource_deps,
        children: child_deps,
        links: link_deps,
    })?;

    // Resource Change Stager (spec §4.3).
    for (name, resource) in &blueprint.resources {
        let current_resource = input.current.and_then(|c| c.resources.get(name));
        let staged = stage_resource(name, resource, current_resource, input.resolver, &input.context, input.registry).await?;

        let emitted_change = match staged {
            StagedResource::Excluded => {
                if current_resource.is_some() {
                    change_set.removed_resources.push(name.clone());
                }
                None
            }
            StagedResource::New(change) => {
                if change.partially_resolved {
                    change_set.resolve_on_deploy.push(name.clone());
                }
                change_set.new_resources.insert(name.clone(), change.clone());
                Some(change)
            }
            StagedResource::Changed(change) => {
                if change.partially_resolved {
                    change_set.resolve_on_deploy.push(name.clone());
                }
                change_set.resource_changes.insert(name.clone(), change.clone());
                Some(change)
            }
            StagedResource::Recreate(change) => {
                if change.partially_resolved {
                    change_set.resolve_on_deploy.push(name.clone());
                }
                change_set.recreate_resources.push(name.clone());
                change_set.resource_changes.insert(name.clone(), change.clone());
                Some(change)
            }
            StagedResource::Unchanged(change) => Some(change),
        };

        if let Some(sender) = events {
            let _ = sender.send(StagingEvent::ResourceStaged {
                name: name.clone(),
                change: emitted_change,
            });
        }
    }

    // Link Change Stager (spec §4.4).
    let mut staged_link_keys = BTreeSet::new();
    for (a_name, b_name) in &link_pairs {
        let a = &blueprint.resources[a_name];
        let b = &blueprint.resources[b_name];
        let key = link_name(a_name, b_name);
        let current_link = input.current.and_then(|c| c.links.get(&key));
        // The link data body itself is provider-defined; this engine only
        // knows that a selector match occurred, so it hands the provider an
        // empty mapping to diff against rather than inventing a schema.
        let link_data = MappingNode::Object(BTreeMap::new());

        let staged = stage_link(
            a_name,
            a,
            b_name,
            b,
            &link_data,
            current_link,
            input.resolver,
            &input.context,
            input.registry,
        )
        .await?;
        staged_link_keys.insert(key.clone());

        let emitted_change = match staged {
            StagedLink::New(change) => {
                change_set.new_links.insert(key.clone(), change.clone());
                Some(change)
            }
            StagedLink::Changed(change) => {
                change_set.link_changes.insert(key.clone(), change.clone());
                Some(change)
            }
            StagedLink::Unchanged(_) => None,
        };

        if let Some(sender) = events {
            let _ = sender.send(StagingEvent::LinkStaged {
                name: key,
                change: emitted_change,
            });
        }
    }
    if let Some(current) = input.current {
        for key in current.links.keys() {
            if !staged_link_keys.contains(key) {
                change_set.removed_links.push(key.clone());
            }
        }
    }

    // Child Change Stager (spec §4.5) — recurses into each include.
    let mut ancestors = input.ancestor_instance_ids.clone();
    if let Some(current) = input.current {
        ancestors.push(current.instance_id);
    }
    for (name, include) in &blueprint.includes {
        let existing_child = input.current.and_then(|c| c.children.get(name));
        let resolved = resolve_child(
            name,
            include,
            &input.tree_path,
            existing_child,
            &ancestors,
            input.max_depth,
            input.current_depth + 1,
            input.resolver,
            &input.context,
            input.child_resolver,
        )
        .await?;

        let mut child_current = None;
        if let (Some(container), Some(instance_id)) = (input.state_container, resolved.existing_instance_id) {
            child_current = container.get(instance_id).await?;
        }

        let mut child_context = input.context.clone();
        child_context.variables.extend(resolved.variables.clone());

        let child_changes = stage_changes(
            StageChangesInput {
                blueprint: &resolved.child_blueprint,
                current: child_current.as_ref(),
                registry: input.registry,
                resolver: input.resolver,
                child_resolver: input.child_resolver,
                state_container: input.state_container,
                context: child_context,
                tree_path: resolved.child_tree_path.clone(),
                ancestor_instance_ids: ancestors.clone(),
                max_depth: input.max_depth,
                current_depth: input.current_depth + 1,
            },
            None,
        )
        .await?;

        let deps = child_deps.get(name).cloned().unwrap_or_default();
        let change = ChildChange {
            resolved_path: resolved.resolved_path.clone(),
            tree_path: resolved.child_tree_path.clone(),
            variables: resolved.variables,
            depends_on_resources: deps.depends_on_resources,
            depends_on_children: deps.depends_on_children,
            changes: Box::new(child_changes.clone()),
        };

        if child_changes.is_empty() {
            // still a structural child; record it as unchanged by omission
        } else if child_current.is_none() {
            change_set.new_children.insert(name.clone(), change.clone());
        } else {
            change_set.child_changes.insert(name.clone(), change.clone());
        }

        if let Some(sender) = events {
            let _ = sender.send(StagingEvent::ChildStaged {
                name: name.clone(),
                change,
            });
        }
    }
    if let Some(current) = input.current {
        for name in current.children.keys() {
            if !blueprint.includes.contains_key(name) {
                change_set.removed_children.push(name.clone());
            }
        }
    }

    // Recreate propagation: one level only (design decision, see DESIGN.md).
    if let Some(current) = input.current {
        for (child_name, child_state) in &current.children {
            let depends_on_recreated = child_state
                .depends_on_resources
                .iter()
                .any(|dep| change_set.recreate_resources.contains(dep));
            if depends_on_recreated {
                change_set.recreate_children.push(child_name.clone());
            }
        }
    }

    // Export + drift hooks (spec §4.11).
    let current_exports = input.current.map(|c| c.exports.clone()).unwrap_or_default();
    let export_diff = diff_exports(&blueprint.exports, &current_exports, input.resolver, &input.context).await?;
    change_set.resolve_on_deploy.extend(export_diff.resolve_on_deploy);

    if let Some(sender) = events {
        let _ = sender.send(StagingEvent::Complete(change_set.clone()));
    }

    Ok(change_set)
}

/// The pure-removal change set a `Destroy=true` `StageChangesInput` asks
/// for (spec §6): every resource, link, and child the instance currently
/// holds becomes a removal, with no new or changed elements and no
/// expand/resolve/diff pipeline run at all, since there is nothing left to
/// diff the current state against. Emits only the terminal `Complete`
/// message - no per-element messages precede it.
pub fn destroy_change_set(current: Option<&InstanceState>, events: Option<&StagingEventSender>) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    if let Some(current) = current {
        change_set.removed_resources = current.resources.keys().cloned().collect();
        change_set.removed_links = current.links.keys().cloned().collect();
        change_set.removed_children = current.children.keys().cloned().collect();
    }
    if let Some(sender) = events {
        let _ = sender.send(StagingEvent::Complete(change_set.clone()));
    }
    change_set
}

#[cfg(test)]
mod destroy_change_set_tests {
    use super::*;
    use blueprint_core::state::{ChildState, LinkState, ResourceState};
    use blueprint_core::status::{
        LinkPreciseStatus, LinkStatus, ResourcePreciseStatus, ResourceStatus,
    };
    use std::collections::BTreeMap;

    fn resource_state() -> ResourceState {
        ResourceState {
            resource_id: ElementId::new(),
            resource_type: "aws/lambda/function".to_string(),
            spec_data: MappingNode::Null,
            depends_on_resources: vec![],
            depends_on_children: vec![],
            metadata: BTreeMap::new(),
            status: ResourceStatus::Deployed,
            precise_status: ResourcePreciseStatus::Deployed,
            last_deployed_at: None,
            last_status_update_at: None,
            durations: Default::default(),
        }
    }

    #[test]
    fn no_current_state_yields_an_empty_change_set() {
        let changes = destroy_change_set(None, None);
        assert!(changes.is_empty());
    }

    #[test]
    fn every_persisted_element_becomes_a_removal() {
        let mut current = InstanceState::new(ElementId::new(), "ordersStack");
        current.resources.insert("ordersApi".to_string(), resource_state());
        current.resources.insert("ordersDb".to_string(), resource_state());
        current.links.insert(
            "ordersApi::ordersDb".to_string(),
            LinkState {
                resource_a_id: ElementId::new(),
                resource_b_id: ElementId::new(),
                link_data: MappingNode::Null,
                status: LinkStatus::Deployed,
                precise_status: LinkPreciseStatus::Deployed,
                last_status_update_at: None,
                durations: Default::default(),
            },
        );
        current.children.insert(
            "coreInfra".to_string(),
            ChildState {
                instance_id: ElementId::new(),
                depends_on_resources: vec![],
                depends_on_children: vec![],
            },
        );

        let changes = destroy_change_set(Some(&current), None);

        assert_eq!(changes.removed_resources, vec!["ordersApi", "ordersDb"]);
        assert_eq!(changes.removed_links, vec!["ordersApi::ordersDb"]);
        assert_eq!(changes.removed_children, vec!["coreInfra"]);
        assert!(changes.new_resources.is_empty());
        assert!(changes.resource_changes.is_empty());
    }
}
