//! Diffs a single resource's resolved spec against its persisted state,
//! delegating the field-level diff to the resource's provider plugin and
//! post-processing for fields whose substitutions remain unresolved until
//! deploy time (spec §4.3).

use blueprint_core::blueprint::ResourceSpec;
use blueprint_core::changes::ResourceChange;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::ProviderRegistry;
use blueprint_core::reference_scan::collect_references;
use blueprint_core::state::ResourceState;
use blueprint_core::substitution::{ResolutionOutcome, SubstitutionContext, SubstitutionResolver};
use blueprint_core::{Error, Result};

/// How a single resource was classified by staging.
#[derive(Debug, Clone)]
pub enum StagedResource {
    /// `condition` resolved to `false`; this resource is not part of the
    /// proposed blueprint at all.
    Excluded,
    New(ResourceChange),
    Changed(ResourceChange),
    Unchanged(ResourceChange),
    /// The provider reported a change that cannot be applied in place
    /// (spec §3 invariant: `MustRecreate` implies `RecreateResources`).
    Recreate(ResourceChange),
}

/// Stages one resource (spec §4.3). `current` is the persisted state for
/// this logical name, if the instance already has one.
pub async fn stage_resource(
    name: &str,
    resource: &ResourceSpec,
    current: Option<&ResourceState>,
    resolver: &dyn SubstitutionResolver,
    context: &SubstitutionContext,
    registry: &ProviderRegistry,
) -> Result<StagedResource> {
    if let Some(condition) = &resource.condition {
        match resolver.resolve(condition, context).await? {
            ResolutionOutcome::Resolved(MappingNode::Bool(false)) => return Ok(StagedResource::Excluded),
            _ => {}
        }
    }
    let condition_known_on_deploy = match &resource.condition {
        Some(condition) => matches!(
            resolver.resolve(condition, context).await?,
            ResolutionOutcome::DeferredUntilDeploy
        ),
        None => false,
    };

    let resolved = resolver.resolve_tree(&resource.spec, context).await?;

    let provider = registry.resource(&resource.resource_type).ok_or_else(|| {
        Error::Internal(format!(
            "no provider registered for resource type '{}' (resource '{name}')",
            resource.resource_type
        ))
    })?;
    let provider_changes = provider
        .stage_changes(current.map(|s| &s.spec_data), &resolved.value)
        .await?;

    let partially_resolved = !resolved.resolve_on_deploy.is_empty() || condition_known_on_deploy;

    let mut field_changes = provider_changes.fields.modified;
    field_changes.extend(provider_changes.fields.new_fields);
    field_changes.extend(provider_changes.fields.removed);

    // The explicit `dependsOn` list and the resource's reference chain
    // (`${resources.S}` / `${children.C}` tokens in its own unresolved spec)
    // are both sources of a dependency edge (spec §4.2).
    let reference_chain = collect_references(&resource.spec);
    let mut depends_on_resources = resource.depends_on.clone();
    depends_on_resources.extend(reference_chain.resources.into_iter().filter(|r| r != name));
    depends_on_resources.sort();
    depends_on_resources.dedup();
    let mut depends_on_children: Vec<String> = reference_chain.children.into_iter().collect();
    depends_on_children.sort();
    depends_on_children.dedup();

    let change = ResourceChange {
        resource_id: current.map(|s| s.resource_id),
        resource_type: resource.resource_type.clone(),
        resolved_spec: resolved.value,
        field_changes,
        depends_on_resources,
        depends_on_children,
        partially_resolved,
    };

    if provider_changes.must_recreate {
        return Ok(StagedResource::Recreate(change));
    }
    if current.is_none() {
        return Ok(StagedResource::New(change));
    }
    if change.field_changes.is_empty() && !partially_resolved {
        return Ok(StagedResource::Unchanged(change));
    }
    Ok(StagedResource::Changed(change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blueprint_core::blueprint::{LinkSelector, ResourceMetadata};
    use blueprint_core::provider::{DeployOutput, LinkProvider, ResourceProvider, ResourceProviderChanges, StabiliseOutcome};
    use blueprint_core::ElementId;
    use std::collections::BTreeMap;

    struct EchoResolver;

    #[async_trait]
    impl SubstitutionResolver for EchoResolver {
        async fn resolve(&self, expr: &MappingNode, _ctx: &SubstitutionContext) -> Result<ResolutionOutcome> {
            Ok(ResolutionOutcome::Resolved(expr.clone()))
        }
    }

    struct FakeProvider {
        must_recreate: bool,
    }

    #[async_trait]
    impl ResourceProvider for FakeProvider {
        fn resource_type(&self) -> &str {
            "aws/lambda/function"
        }

        async fn stage_changes(
            &self,
            current: Option<&MappingNode>,
            resolved: &MappingNode,
        ) -> Result<ResourceProviderChanges> {
            let fields = blueprint_core::mapping::diff_fields(current, Some(resolved));
            Ok(ResourceProviderChanges {
                fields,
                computed_fields: vec![],
                must_recreate: self.must_recreate,
            })
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

    struct FakeRegistry {
        must_recreate: bool,
    }
    impl FakeRegistry {
        fn build(&self) -> ProviderRegistry {
            struct Wrapper(bool);
            impl blueprint_core::provider::Provider for Wrapper {
                fn namespace(&self) -> &str {
                    "aws"
                }
                fn resource(&self, resource_type: &str) -> Option<std::sync::Arc<dyn ResourceProvider>> {
                    if resource_type == "aws/lambda/function" {
                        Some(std::sync::Arc::new(FakeProvider { must_recreate: self.0 }))
                    } else {
                        None
                    }
                }
                fn link(&self, _a: &str, _b: &str) -> Option<std::sync::Arc<dyn LinkProvider>> {
                    None
                }
                fn data_source(
                    &self,
                    _t: &str,
                ) -> Option<std::sync::Arc<dyn blueprint_core::provider::DataSourceProvider>> {
                    None
                }
            }
            let mut registry = ProviderRegistry::new();
            registry.register(std::sync::Arc::new(Wrapper(self.must_recreate)));
            registry
        }
    }

    fn resource(spec_value: MappingNode) -> ResourceSpec {
        ResourceSpec {
            resource_type: "aws/lambda/function".to_string(),
            each: None,
            condition: None,
            depends_on: vec![],
            link_selector: LinkSelector::default(),
            metadata: ResourceMetadata::default(),
            spec: spec_value,
        }
    }

    #[tokio::test]
    async fn new_resource_with_no_prior_state() {
        let registry = FakeRegistry { must_recreate: false }.build();
        let spec = resource(MappingNode::Object(BTreeMap::from([(
            "runtime".to_string(),
            MappingNode::String("nodejs20.x".into()),
        )])));
        let staged = stage_resource(
            "ordersApi",
            &spec,
            None,
            &EchoResolver,
            &SubstitutionContext::default(),
            &registry,
        )
        .await
        .unwrap();
        assert!(matches!(staged, StagedResource::New(_)));
    }

    #[tokio::test]
    async fn excluded_when_condition_resolves_false() {
        let registry = FakeRegistry { must_recreate: false }.build();
        let mut spec = resource(MappingNode::Object(BTreeMap::new()));
        spec.condition = Some(MappingNode::Bool(false));
        let staged = stage_resource(
            "optionalQueue",
            &spec,
            None,
            &EchoResolver,
            &SubstitutionContext::default(),
            &registry,
        )
        .await
        .unwrap();
        assert!(matches!(staged, StagedResource::Excluded));
    }

    #[tokio::test]
    async fn removed_field_alone_is_classified_changed() {
        let registry = FakeRegistry { must_recreate: false }.build();
        let spec = resource(MappingNode::Object(BTreeMap::new()));
        let current = ResourceState {
            resource_id: ElementId::new(),
            resource_type: "aws/lambda/function".to_string(),
            spec_data: MappingNode::Object(BTreeMap::from([(
                "timeout".to_string(),
                MappingNode::Int(30),
            )])),
            depends_on_resources: vec![],
            depends_on_children: vec![],
            metadata: BTreeMap::new(),
            status: blueprint_core::status::ResourceStatus::Deployed,
            precise_status: blueprint_core::status::ResourcePreciseStatus::Deployed,
            last_deployed_at: None,
            last_status_update_at: None,
            durations: Default::default(),
        };
        let staged = stage_resource(
            "ordersApi",
            &spec,
            Some(&current),
            &EchoResolver,
            &SubstitutionContext::default(),
            &registry,
        )
        .await
        .unwrap();
        match staged {
            StagedResource::Changed(change) => {
                assert_eq!(change.field_changes.len(), 1);
                assert_eq!(change.field_changes[0].path, "timeout");
                assert!(change.field_changes[0].new.is_none());
            }
            other => panic!("expected Changed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn must_recreate_overrides_changed_classification() {
        let registry = FakeRegistry { must_recreate: true }.build();
        let spec = resource(MappingNode::Object(BTreeMap::from([(
            "runtime".to_string(),
            MappingNode::String("nodejs20.x".into()),
        )])));
        let current = ResourceState {
            resource_id: ElementId::new(),
            resource_type: "aws/lambda/function".to_string(),
            spec_data: MappingNode::Object(BTreeMap::from([(
                "runtime".to_string(),
                MappingNode::String("nodejs18.x".into()),
            )])),
            depends_on_resources: vec![],
            depends_on_children: vec![],
            metadata: BTreeMap::new(),
            status: blueprint_core::status::ResourceStatus::Deployed,
            precise_status: blueprint_core::status::ResourcePreciseStatus::Deployed,
            last_deployed_at: None,
            last_status_update_at: None,
            durations: Default::default(),
        };
        let staged = stage_resource(
            "ordersApi",
            &spec,
            Some(&current),
            &EchoResolver,
            &SubstitutionContext::default(),
            &registry,
        )
        .await
        .unwrap();
        assert!(matches!(staged, StagedResource::Recreate(_)));
    }
}
