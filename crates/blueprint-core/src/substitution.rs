//! Substitution resolution is interface-only: the engine asks a resolver to
//! turn an unresolved expression (an `each`, `condition`, variable
//! reference, or spec field) into a concrete [`MappingNode`], but never
//! interprets the expression language itself (spec §9).

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::mapping::MappingNode;
use crate::Result;

/// The values a substitution expression may reference while resolving: the
/// blueprint's declared variables, the values already computed for
/// resources earlier in the same wave, and (for `each`-expanded resources)
/// the current iteration item.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    pub variables: BTreeMap<String, MappingNode>,
    pub resolved_resources: BTreeMap<String, MappingNode>,
    pub each_item: Option<MappingNode>,
}

/// Outcome of resolving one expression.
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// Fully resolved to a concrete value.
    Resolved(MappingNode),
    /// Depends on a resource's output that is not yet known (e.g. an ID
    /// generated at deploy time); the field must be marked
    /// `partially_resolved` and re-resolved once that dependency deploys.
    DeferredUntilDeploy,
}

/// A resolved spec tree alongside the field paths within it that could not
/// be fully resolved (spec §3, "Resolved Resource").
#[derive(Debug, Clone, Default)]
pub struct ResolvedTree {
    pub value: MappingNode,
    pub resolve_on_deploy: Vec<String>,
}

#[async_trait]
pub trait SubstitutionResolver: Send + Sync {
    /// Resolves a single unresolved [`MappingNode`] expression tree against
    /// `context` — used for whole-value expressions like `each` and
    /// `condition` that either fully resolve or must wait for deploy.
    async fn resolve(&self, expr: &MappingNode, context: &SubstitutionContext) -> Result<ResolutionOutcome>;

    /// Resolves a multi-field spec tree, returning a best-effort resolved
    /// value plus the dotted paths within it that remain symbolic and must
    /// be re-resolved once their dependencies deploy (spec §3, §4.3). The
    /// default implementation delegates to [`SubstitutionResolver::resolve`]
    /// and treats a `DeferredUntilDeploy` outcome as the entire tree being
    /// unresolved — plugins with field-level granularity should override
    /// this directly.
    async fn resolve_tree(&self, tree: &MappingNode, context: &SubstitutionContext) -> Result<ResolvedTree> {
        match self.resolve(tree, context).await? {
            ResolutionOutcome::Resolved(value) => {
                let resolve_on_deploy = Vec::new();
                Ok(ResolvedTree { value, resolve_on_deploy })
            }
            ResolutionOutcome::DeferredUntilDeploy => Ok(ResolvedTree {
                value: tree.clone(),
                resolve_on_deploy: tree.field_paths(""),
            }),
        }
    }
}
