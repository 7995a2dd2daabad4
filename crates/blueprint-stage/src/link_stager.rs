//! Diffs a single link's resolved data against its persisted state,
//! delegating the field-level diff to the link's provider plugin (spec
//! §4.4). Mirrors [`crate::resource_stager::stage_resource`] but a link has
//! no `condition`/`each` of its own — those apply only to its endpoints.

use blueprint_core::blueprint::ResourceSpec;
use blueprint_core::changes::LinkChange;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::ProviderRegistry;
use blueprint_core::state::LinkState;
use blueprint_core::substitution::{SubstitutionContext, SubstitutionResolver};
use blueprint_core::{Error, Result};

/// How a single link was classified by staging.
#[derive(Debug, Clone)]
pub enum StagedLink {
    New(LinkChange),
    Changed(LinkChange),
    Unchanged(LinkChange),
}

/// Stages one link between `resource_a_name` and `resource_b_name` (spec
/// §4.4). `link_data` is the resolved mapping produced from the pair's
/// matching link selectors; `current` is the persisted link state, if any.
pub async fn stage_link(
    resource_a_name: &str,
    resource_a: &ResourceSpec,
    resource_b_name: &str,
    resource_b: &ResourceSpec,
    link_data: &MappingNode,
    current: Option<&LinkState>,
    resolver: &dyn SubstitutionResolver,
    context: &SubstitutionContext,
    registry: &ProviderRegistry,
) -> Result<StagedLink> {
    let resolved = resolver.resolve_tree(link_data, context).await?;

    let provider = registry
        .link(&resource_a.resource_type, &resource_b.resource_type)
        .ok_or_else(|| {
            Error::Internal(format!(
                "no link provider registered for '{}' <-> '{}' (link '{resource_a_name}::{resource_b_name}')",
                resource_a.resource_type, resource_b.resource_type
            ))
        })?;
    let provider_changes = provider
        .stage_changes(current.map(|s| &s.link_data), &resolved.value)
        .await?;

    let mut field_changes = provider_changes.fields.modified;
    field_changes.extend(provider_changes.fields.new_fields);
    field_changes.extend(provider_changes.fields.removed);

    let change = LinkChange {
        resource_a_name: resource_a_name.to_string(),
        resource_b_name: resource_b_name.to_string(),
        resolved_link_data: resolved.value,
        field_changes,
    };

    if current.is_none() {
        return Ok(StagedLink::New(change));
    }
    if change.field_changes.is_empty() {
        return Ok(StagedLink::Unchanged(change));
    }
    Ok(StagedLink::Changed(change))
}

/// Finds every pair of resources whose link selectors mutually match (spec
/// §3, "Link Selector"): `a` selects `b` when every `by_label` entry `a`
/// declares is present on `b`'s metadata labels, and links are symmetric —
/// only one direction needs to match for the pair to be linked.
pub fn discover_link_pairs(resources: &std::collections::BTreeMap<String, ResourceSpec>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let names: Vec<&String> = resources.keys().collect();
    for (i, a_name) in names.iter().enumerate() {
        for b_name in &names[i + 1..] {
            let a = &resources[*a_name];
            let b = &resources[*b_name];
            let a_selects_b = !a.link_selector.by_label.is_empty()
                && a.link_selector.by_label.iter().all(|(k, v)| b.metadata.labels.get(k) == Some(v));
            let b_selects_a = !b.link_selector.by_label.is_empty()
                && b.link_selector.by_label.iter().all(|(k, v)| a.metadata.labels.get(k) == Some(v));
            if a_selects_b || b_selects_a {
                pairs.push(((*a_name).clone(), (*b_name).clone()));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blueprint_core::blueprint::{LinkSelector, ResourceMetadata};
    use blueprint_core::provider::{
        DataSourceProvider, DeployOutput, LinkKind, LinkProvider, PriorityResource, Provider, ResourceProvider,
        ResourceProviderChanges, StabiliseOutcome,
    };
    use blueprint_core::substitution::ResolutionOutcome;
    use blueprint_core::ElementId;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct EchoResolver;
    #[async_trait]
    impl SubstitutionResolver for EchoResolver {
        async fn resolve(&self, expr: &MappingNode, _ctx: &SubstitutionContext) -> Result<ResolutionOutcome> {
            Ok(ResolutionOutcome::Resolved(expr.clone()))
        }
    }

    struct FakeLink;
    #[async_trait]
    impl LinkProvider for FakeLink {
        async fn stage_changes(&self, current: Option<&MappingNode>, resolved: &MappingNode) -> Result<ResourceProviderChanges> {
            Ok(ResourceProviderChanges {
                fields: blueprint_core::mapping::diff_fields(current, Some(resolved)),
                computed_fields: vec![],
                must_recreate: false,
            })
        }
        async fn get_priority_resource(&self) -> PriorityResource {
            PriorityResource::ResourceB
        }
        fn get_type(&self) -> &str {
            "aws/lambda/event-source-mapping"
        }
        fn get_kind(&self) -> LinkKind {
            LinkKind::Hard
        }
        async fn update_resource_a(&self, _id: ElementId, _d: &MappingNode) -> Result<()> {
            unimplemented!()
        }
        async fn update_intermediaries(&self, _d: &MappingNode) -> Result<()> {
            unimplemented!()
        }
        async fn update_resource_b(&self, _id: ElementId, _d: &MappingNode) -> Result<()> {
            unimplemented!()
        }
        async fn destroy(&self, _a: ElementId, _b: ElementId, _d: &MappingNode) -> Result<()> {
            unimplemented!()
        }
    }

    struct FakeProviderFor(&'static str, &'static str);
    #[async_trait]
    impl ResourceProvider for FakeProviderFor {
        fn resource_type(&self) -> &str {
            self.0
        }
        async fn stage_changes(&self, _c: Option<&MappingNode>, _r: &MappingNode) -> Result<ResourceProviderChanges> {
            unimplemented!()
        }
        async fn deploy(&self, _id: Option<ElementId>, _spec: &MappingNode) -> Result<DeployOutput> {
            unimplemented!()
        }
        async fn stabilise(&self, _id: ElementId, _spec: &MappingNode) -> Result<StabiliseOutcome> {
            unimplemented!()
        }
        async fn destroy(&self, _id: ElementId, _spec: &MappingNode) -> Result<()> {
            unimplemented!()
        }
    }

    struct FakeProvider;
    impl Provider for FakeProvider {
        fn namespace(&self) -> &str {
            "aws"
        }
        fn resource(&self, _resource_type: &str) -> Option<Arc<dyn ResourceProvider>> {
            None
        }
        fn link(&self, type_a: &str, type_b: &str) -> Option<Arc<dyn LinkProvider>> {
            if type_a == "aws/lambda/function" && type_b == "aws/sqs/queue" {
                Some(Arc::new(FakeLink))
            } else {
                None
            }
        }
        fn data_source(&self, _t: &str) -> Option<Arc<dyn DataSourceProvider>> {
            None
        }
    }

    fn resource(resource_type: &str, labels: &[(&str, &str)], selector: &[(&str, &str)]) -> ResourceSpec {
        ResourceSpec {
            resource_type: resource_type.to_string(),
            each: None,
            condition: None,
            depends_on: vec![],
            link_selector: LinkSelector {
                by_label: selector.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            },
            metadata: ResourceMetadata {
                labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            },
            spec: MappingNode::Object(BTreeMap::new()),
        }
    }

    #[tokio::test]
    async fn new_link_has_no_prior_state() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeProvider));

        let worker = resource("aws/lambda/function", &[], &[("role", "consumer")]);
        let queue = resource("aws/sqs/queue", &[("role", "consumer")], &[]);

        let staged = stage_link(
            "worker",
            &worker,
            "queue",
            &queue,
            &MappingNode::Object(BTreeMap::new()),
            None,
            &EchoResolver,
            &SubstitutionContext::default(),
            &registry,
        )
        .await
        .unwrap();
        assert!(matches!(staged, StagedLink::New(_)));
    }

    #[test]
    fn discover_link_pairs_finds_matching_selector() {
        let mut resources = BTreeMap::new();
        resources.insert("worker".to_string(), resource("aws/lambda/function", &[], &[("role", "consumer")]));
        resources.insert("queue".to_string(), resource("aws/sqs/queue", &[("role", "consumer")], &[]));
        resources.insert("bucket".to_string(), resource("aws/s3/bucket", &[], &[]));

        let pairs = discover_link_pairs(&resources);
        assert_eq!(pairs, vec![("queue".to_string(), "worker".to_string())]);
    }
}
