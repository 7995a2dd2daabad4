//! Builds the dependency graph consumed by the deployment scheduler's wave
//! partitioning (spec §4.2). A resource depends on another resource when the
//! link between them names the other as the *priority resource* (the
//! endpoint that must exist first), or when its spec's reference chain
//! mentions `resources.<other>` / `children.<other>`. Links themselves
//! are scheduled as nodes that depend on both of their endpoint resources,
//! since the link deployer requires both endpoints to have reached a
//! terminal-success state before it may run (spec §5).

use std::collections::BTreeMap;

use blueprint_core::graph::{DependencyGraph, DependencyGraphNode};
use blueprint_core::id::link_name;
use blueprint_core::provider::PriorityResource;
use blueprint_core::{Error, Result};

/// One resource's dependency inputs: the explicit `dependsOn` list plus
/// whatever resource/child names its spec's reference chain mentions (spec
/// §4.2), merged by the caller via
/// [`blueprint_core::reference_scan::collect_references`] before this
/// struct is built.
#[derive(Debug, Clone, Default)]
pub struct ResourceDependencyInput {
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChildDependencyInput {
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LinkDependencyInput {
    pub resource_a_name: String,
    pub resource_b_name: String,
    pub priority: PriorityResource,
}

/// Full set of inputs the dependency analyser needs to build a graph over
/// every deployment node in one operation.
#[derive(Debug, Clone, Default)]
pub struct DependencyInput {
    pub resources: BTreeMap<String, ResourceDependencyInput>,
    pub children: BTreeMap<String, ChildDependencyInput>,
    pub links: Vec<LinkDependencyInput>,
}

/// Builds the dependency graph and eagerly fails on any cycle, since a
/// cyclic dependency is unschedulable by definition (spec §4.2: "Cycles
/// found at this stage are a fatal error").
pub fn build_dependency_graph(input: &DependencyInput) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    let mut resource_idx = BTreeMap::new();
    let mut child_idx = BTreeMap::new();

    for name in input.resources.keys() {
        resource_idx.insert(name.clone(), graph.add_node(DependencyGraphNode::Resource(name.clone())));
    }
    for name in input.children.keys() {
        child_idx.insert(name.clone(), graph.add_node(DependencyGraphNode::Child(name.clone())));
    }

    for (name, deps) in &input.resources {
        let idx = resource_idx[name];
        for dep in &deps.depends_on_resources {
            if let Some(&dep_idx) = resource_idx.get(dep) {
                graph.add_edge(idx, dep_idx);
            }
        }
        for dep in &deps.depends_on_children {
            if let Some(&dep_idx) = child_idx.get(dep) {
                graph.add_edge(idx, dep_idx);
            }
        }
    }
    for (name, deps) in &input.children {
        let idx = child_idx[name];
        for dep in &deps.depends_on_resources {
            if let Some(&dep_idx) = resource_idx.get(dep) {
                graph.add_edge(idx, dep_idx);
            }
        }
        for dep in &deps.depends_on_children {
            if let Some(&dep_idx) = child_idx.get(dep) {
                graph.add_edge(idx, dep_idx);
            }
        }
    }

    for link in &input.links {
        let link_idx = graph.add_node(DependencyGraphNode::Link(link_name(
            &link.resource_a_name,
            &link.resource_b_name,
        )));
        if let Some(&a_idx) = resource_idx.get(&link.resource_a_name) {
            graph.add_edge(link_idx, a_idx);
        }
        if let Some(&b_idx) = resource_idx.get(&link.resource_b_name) {
            graph.add_edge(link_idx, b_idx);
        }
        // The priority endpoint must exist before the other; encode that as
        // a direct dependency between the two resources too, independent of
        // the link node itself being scheduled.
        match link.priority {
            PriorityResource::ResourceA => {
                if let (Some(&b_idx), Some(&a_idx)) =
                    (resource_idx.get(&link.resource_b_name), resource_idx.get(&link.resource_a_name))
                {
                    graph.add_edge(b_idx, a_idx);
                }
            }
            PriorityResource::ResourceB => {
                if let (Some(&a_idx), Some(&b_idx)) =
                    (resource_idx.get(&link.resource_a_name), resource_idx.get(&link.resource_b_name))
                {
                    graph.add_edge(a_idx, b_idx);
                }
            }
        }
    }

    if let Err(unplaced) = graph.topological_waves() {
        let names = graph.names(&unplaced);
        let involves_link = unplaced
            .iter()
            .any(|&i| matches!(graph.node(i), DependencyGraphNode::Link(_)));
        return Err(if involves_link {
            Error::CircularLinks(names)
        } else {
            Error::ReferenceCycle(names)
        });
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_resource_b_makes_a_depend_on_b() {
        let mut input = DependencyInput::default();
        input.resources.insert("ordersApi".into(), ResourceDependencyInput::default());
        input.resources.insert("ordersDb".into(), ResourceDependencyInput::default());
        input.links.push(LinkDependencyInput {
            resource_a_name: "ordersApi".into(),
            resource_b_name: "ordersDb".into(),
            priority: PriorityResource::ResourceB,
        });

        let graph = build_dependency_graph(&input).unwrap();
        let waves = graph.topological_waves().unwrap();
        // ordersDb (priority) and the link's resource endpoints all land
        // before ordersApi, which depends on ordersDb.
        let db_wave = waves
            .iter()
            .position(|w| w.iter().any(|&i| matches!(graph.node(i), DependencyGraphNode::Resource(n) if n == "ordersDb")))
            .unwrap();
        let api_wave = waves
            .iter()
            .position(|w| w.iter().any(|&i| matches!(graph.node(i), DependencyGraphNode::Resource(n) if n == "ordersApi")))
            .unwrap();
        assert!(db_wave < api_wave);
    }

    #[test]
    fn detects_reference_cycle() {
        let mut input = DependencyInput::default();
        input.resources.insert(
            "a".into(),
            ResourceDependencyInput {
                depends_on_resources: vec!["b".into()],
                depends_on_children: vec![],
            },
        );
        input.resources.insert(
            "b".into(),
            ResourceDependencyInput {
                depends_on_resources: vec!["a".into()],
                depends_on_children: vec![],
            },
        );
        let err = build_dependency_graph(&input).unwrap_err();
        assert!(matches!(err, Error::ReferenceCycle(_)));
    }
}
