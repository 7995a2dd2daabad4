//! Resolves one `includes.*` entry into a loaded child blueprint, enforcing
//! cycle and depth limits before the caller recurses into staging the child
//! (spec §4.5). Does not itself recurse — the staging pipeline owns that, so
//! this module stays a leaf the pipeline can call once per include.

use std::collections::BTreeMap;

use blueprint_core::blueprint::Include;
use blueprint_core::child_resolver::ChildBlueprintResolver;
use blueprint_core::mapping::MappingNode;
use blueprint_core::state::ChildState;
use blueprint_core::substitution::{ResolutionOutcome, SubstitutionContext, SubstitutionResolver};
use blueprint_core::{ElementId, Error, Result};

/// A loaded child blueprint plus the context the caller needs to stage it.
#[derive(Debug, Clone)]
pub struct ResolvedChild {
    pub child_blueprint: blueprint_core::blueprint::BlueprintSpec,
    pub variables: BTreeMap<String, MappingNode>,
    pub child_tree_path: String,
    /// The include's resolved source path (e.g. `"./children/core-infra.blueprint"`),
    /// as handed to the child blueprint resolver. Kept alongside the tree
    /// path so a deploy call can report where a child actually came from.
    pub resolved_path: String,
    /// `None` for a fresh child with no persisted instance yet.
    pub existing_instance_id: Option<ElementId>,
}

/// Resolves and loads the child referenced by `include` (spec §4.5).
/// `ancestor_instance_ids` is the chain of instance IDs from the root down
/// to (and including) the current instance; used for cycle detection.
#[allow(clippy::too_many_arguments)]
pub async fn resolve_child(
    include_name: &str,
    include: &Include,
    parent_tree_path: &str,
    existing_child: Option<&ChildState>,
    ancestor_instance_ids: &[ElementId],
    max_depth: u32,
    current_depth: u32,
    resolver: &dyn SubstitutionResolver,
    context: &SubstitutionContext,
    child_resolver: &dyn ChildBlueprintResolver,
) -> Result<ResolvedChild> {
    if current_depth > max_depth {
        return Err(Error::MaxBlueprintDepthExceeded { max_depth });
    }

    let path = match resolver.resolve(&include.path, context).await? {
        ResolutionOutcome::Resolved(MappingNode::String(s)) if !s.is_empty() => s,
        ResolutionOutcome::Resolved(MappingNode::String(_)) => {
            return Err(Error::EmptyChildBlueprintPath);
        }
        ResolutionOutcome::Resolved(MappingNode::Null) => {
            return Err(Error::MissingChildBlueprintPath);
        }
        ResolutionOutcome::Resolved(_) => return Err(Error::MissingChildBlueprintPath),
        ResolutionOutcome::DeferredUntilDeploy => {
            return Err(Error::Internal(format!(
                "include '{include_name}' has a path that cannot be resolved at staging time"
            )));
        }
    };

    if let Some(existing) = existing_child {
        if ancestor_instance_ids.contains(&existing.instance_id) {
            return Err(Error::BlueprintCycleDetected(path));
        }
    }

    let mut variables = BTreeMap::new();
    for (name, expr) in &include.variables {
        let resolved = resolver.resolve_tree(expr, context).await?;
        variables.insert(name.clone(), resolved.value);
    }

    let child_blueprint = child_resolver.resolve(&path, include.source_format.as_deref()).await?;

    Ok(ResolvedChild {
        child_blueprint,
        variables,
        child_tree_path: format!("{parent_tree_path}/{include_name}"),
        resolved_path: path,
        existing_instance_id: existing_child.map(|c| c.instance_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoResolver;
    #[async_trait]
    impl SubstitutionResolver for EchoResolver {
        async fn resolve(&self, expr: &MappingNode, _ctx: &SubstitutionContext) -> Result<ResolutionOutcome> {
            Ok(ResolutionOutcome::Resolved(expr.clone()))
        }
    }

    struct StaticChildResolver;
    #[async_trait]
    impl ChildBlueprintResolver for StaticChildResolver {
        async fn resolve(&self, _path: &str, _source_format: Option<&str>) -> Result<blueprint_core::blueprint::BlueprintSpec> {
            Ok(blueprint_core::blueprint::BlueprintSpec::default())
        }
    }

    fn include(path: &str) -> Include {
        Include {
            path: MappingNode::String(path.to_string()),
            source_format: None,
            variables: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn loads_fresh_child_with_no_prior_state() {
        let resolved = resolve_child(
            "coreInfra",
            &include("./children/core-infra.blueprint"),
            "blueprint-instance-2",
            None,
            &[],
            5,
            1,
            &EchoResolver,
            &SubstitutionContext::default(),
            &StaticChildResolver,
        )
        .await
        .unwrap();
        assert_eq!(resolved.child_tree_path, "blueprint-instance-2/coreInfra");
        assert!(resolved.existing_instance_id.is_none());
    }

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let err = resolve_child(
            "coreInfra",
            &include(""),
            "blueprint-instance-2",
            None,
            &[],
            5,
            1,
            &EchoResolver,
            &SubstitutionContext::default(),
            &StaticChildResolver,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::EmptyChildBlueprintPath));
    }

    #[tokio::test]
    async fn depth_exceeded_rejected_before_loading() {
        let err = resolve_child(
            "coreInfra",
            &include("./children/core-infra.blueprint"),
            "blueprint-instance-2",
            None,
            &[],
            2,
            3,
            &EchoResolver,
            &SubstitutionContext::default(),
            &StaticChildResolver,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MaxBlueprintDepthExceeded { max_depth: 2 }));
    }

    #[tokio::test]
    async fn ancestor_instance_id_triggers_cycle_error() {
        let ancestor = ElementId::new();
        let existing = ChildState {
            instance_id: ancestor,
            depends_on_resources: vec![],
            depends_on_children: vec![],
        };
        let err = resolve_child(
            "coreInfra",
            &include("./children/core-infra.blueprint"),
            "blueprint-instance-3",
            Some(&existing),
            &[ancestor],
            5,
            1,
            &EchoResolver,
            &SubstitutionContext::default(),
            &StaticChildResolver,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::BlueprintCycleDetected(_)));
    }
}
