//! Removal Orderer: orders a set of resources/links/children slated for
//! removal so that every element is destroyed only once everything that
//! depends on it has already been destroyed (dependents drain before their
//! dependencies — "leaves first") (spec §4.10), then groups the order into
//! parallel waves.

use blueprint_core::graph::{DependencyGraph, DependencyGraphNode};
use blueprint_core::id::split_link_name;
use blueprint_core::state::InstanceState;
use blueprint_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalElement {
    Resource(String),
    Link(String),
    Child(String),
}

impl RemovalElement {
    pub fn name(&self) -> &str {
        match self {
            RemovalElement::Resource(n) | RemovalElement::Link(n) | RemovalElement::Child(n) => n,
        }
    }

    fn graph_node(&self) -> DependencyGraphNode {
        match self {
            RemovalElement::Resource(n) => DependencyGraphNode::Resource(n.clone()),
            RemovalElement::Link(n) => DependencyGraphNode::Link(n.clone()),
            RemovalElement::Child(n) => DependencyGraphNode::Child(n.clone()),
        }
    }
}

/// Orders `to_remove` into parallel waves using each element's transitive
/// dependency closure from `current`'s persisted `depends_on_resources` /
/// `depends_on_children`, plus a link's synthetic dependency on its two
/// endpoint resources. Dependencies outside the removal set don't block
/// anything (they aren't being touched).
pub fn order_removal(to_remove: &[RemovalElement], current: &InstanceState) -> Result<Vec<Vec<RemovalElement>>> {
    let mut graph = DependencyGraph::new();
    let indices: Vec<usize> = to_remove.iter().map(|e| graph.add_node(e.graph_node())).collect();

    for (element, &idx) in to_remove.iter().zip(&indices) {
        for dep_name in real_dependencies(element, current) {
            if let Some(dep_idx) = indices
                .iter()
                .zip(to_remove)
                .find(|(_, e)| e.name() == dep_name)
                .map(|(&i, _)| i)
            {
                // Invert the real dependency edge: the removal orderer must
                // place the dependent (`element`) before its dependency, the
                // opposite of deploy-time scheduling.
                graph.add_edge(dep_idx, idx);
            }
        }
    }

    let waves = graph.topological_waves().map_err(|unplaced| {
        Error::Internal(format!(
            "removal orderer found a cycle among: {:?}",
            graph.names(&unplaced)
        ))
    })?;

    Ok(waves
        .into_iter()
        .map(|wave| wave.into_iter().map(|idx| to_remove[idx].clone()).collect())
        .collect())
}

/// The element's own direct dependency names, without regard to whether
/// they're also in the removal set — the caller filters that.
fn real_dependencies(element: &RemovalElement, current: &InstanceState) -> Vec<String> {
    match element {
        RemovalElement::Resource(name) => current
            .resources
            .get(name)
            .map(|r| {
                r.depends_on_resources
                    .iter()
                    .chain(r.depends_on_children.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
        RemovalElement::Child(name) => current
            .children
            .get(name)
            .map(|c| {
                c.depends_on_resources
                    .iter()
                    .chain(c.depends_on_children.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
        RemovalElement::Link(name) => split_link_name(name)
            .map(|(a, b)| vec![a.to_string(), b.to_string()])
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_core::id::{link_name, ElementId};
    use blueprint_core::mapping::MappingNode;
    use blueprint_core::state::{ChildState, InstanceState, LinkState, OperationDurations, ResourceState};
    use blueprint_core::status::{LinkPreciseStatus, LinkStatus, ResourcePreciseStatus, ResourceStatus};
    use std::collections::BTreeMap;

    fn resource_state(depends_on: Vec<&str>) -> ResourceState {
        ResourceState {
            resource_id: ElementId::new(),
            resource_type: "test/thing".to_string(),
            spec_data: MappingNode::Null,
            depends_on_resources: depends_on.into_iter().map(String::from).collect(),
            depends_on_children: vec![],
            metadata: BTreeMap::new(),
            status: ResourceStatus::Deployed,
            precise_status: ResourcePreciseStatus::Deployed,
            last_deployed_at: None,
            last_status_update_at: None,
            durations: OperationDurations::default(),
        }
    }

    #[test]
    fn dependents_are_removed_before_their_dependencies() {
        let mut instance = InstanceState::new(ElementId::new(), "test");
        instance.resources.insert("ordersDb".to_string(), resource_state(vec![]));
        instance
            .resources
            .insert("ordersApi".to_string(), resource_state(vec!["ordersDb"]));

        let to_remove = vec![
            RemovalElement::Resource("ordersDb".to_string()),
            RemovalElement::Resource("ordersApi".to_string()),
        ];
        let waves = order_removal(&to_remove, &instance).unwrap();

        let api_wave = waves
            .iter()
            .position(|w| w.contains(&RemovalElement::Resource("ordersApi".to_string())))
            .unwrap();
        let db_wave = waves
            .iter()
            .position(|w| w.contains(&RemovalElement::Resource("ordersDb".to_string())))
            .unwrap();
        assert!(api_wave < db_wave);
    }

    #[test]
    fn independent_elements_share_a_wave() {
        let mut instance = InstanceState::new(ElementId::new(), "test");
        instance.resources.insert("a".to_string(), resource_state(vec![]));
        instance.resources.insert("b".to_string(), resource_state(vec![]));

        let to_remove = vec![
            RemovalElement::Resource("a".to_string()),
            RemovalElement::Resource("b".to_string()),
        ];
        let waves = order_removal(&to_remove, &instance).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 2);
    }

    #[test]
    fn link_depends_on_both_endpoints() {
        let mut instance = InstanceState::new(ElementId::new(), "test");
        instance.resources.insert("ordersApi".to_string(), resource_state(vec![]));
        instance.resources.insert("ordersDb".to_string(), resource_state(vec![]));
        let key = link_name("ordersApi", "ordersDb");
        instance.links.insert(
            key.clone(),
            LinkState {
                resource_a_id: ElementId::new(),
                resource_b_id: ElementId::new(),
                link_data: MappingNode::Null,
                status: LinkStatus::Deployed,
                precise_status: LinkPreciseStatus::Deployed,
                last_status_update_at: None,
                durations: OperationDurations::default(),
            },
        );

        let to_remove = vec![
            RemovalElement::Link(key.clone()),
            RemovalElement::Resource("ordersApi".to_string()),
            RemovalElement::Resource("ordersDb".to_string()),
        ];
        let waves = order_removal(&to_remove, &instance).unwrap();

        let link_wave = waves.iter().position(|w| w.contains(&RemovalElement::Link(key))).unwrap();
        let api_wave = waves
            .iter()
            .position(|w| w.contains(&RemovalElement::Resource("ordersApi".to_string())))
            .unwrap();
        assert!(link_wave < api_wave);
    }

    #[test]
    fn child_is_removed_before_a_resource_it_depends_on() {
        let mut instance = InstanceState::new(ElementId::new(), "test");
        instance.resources.insert("sharedVpc".to_string(), resource_state(vec![]));
        instance.children.insert(
            "coreInfra".to_string(),
            ChildState {
                instance_id: ElementId::new(),
                depends_on_resources: vec!["sharedVpc".to_string()],
                depends_on_children: vec![],
            },
        );

        let to_remove = vec![
            RemovalElement::Resource("sharedVpc".to_string()),
            RemovalElement::Child("coreInfra".to_string()),
        ];
        let waves = order_removal(&to_remove, &instance).unwrap();

        let child_wave = waves
            .iter()
            .position(|w| w.contains(&RemovalElement::Child("coreInfra".to_string())))
            .unwrap();
        let vpc_wave = waves
            .iter()
            .position(|w| w.contains(&RemovalElement::Resource("sharedVpc".to_string())))
            .unwrap();
        assert!(child_wave < vpc_wave);
    }
}
