//! An echo provider: accepts any resource type and any link between two
//! resource types, deploys instantly, stabilises on the first poll, and
//! destroys without complaint. Exists purely so the CLI can drive the
//! engine's wave scheduler and deployer state machines end-to-end without
//! a real cloud backend wired in.

use std::sync::Arc;

use async_trait::async_trait;

use blueprint_core::id::ElementId;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::{
    DataSourceProvider, DeployOutput, LinkProvider, Provider, PriorityResource, ResourceProvider,
    ResourceProviderChanges, StabiliseOutcome,
};
use blueprint_core::Result;

pub struct EchoProvider;

impl Provider for EchoProvider {
    fn namespace(&self) -> &str {
        "echo"
    }

    fn resource(&self, resource_type: &str) -> Option<Arc<dyn ResourceProvider>> {
        Some(Arc::new(EchoResourceProvider {
            resource_type: resource_type.to_string(),
        }))
    }

    fn link(&self, type_a: &str, type_b: &str) -> Option<Arc<dyn LinkProvider>> {
        Some(Arc::new(EchoLinkProvider {
            link_type: format!("{type_a}<->{type_b}"),
        }))
    }

    fn data_source(&self, _data_source_type: &str) -> Option<Arc<dyn DataSourceProvider>> {
        None
    }
}

struct EchoResourceProvider {
    resource_type: String,
}

#[async_trait]
impl ResourceProvider for EchoResourceProvider {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn stage_changes(&self, _current: Option<&MappingNode>, _resolved: &MappingNode) -> Result<ResourceProviderChanges> {
        Ok(ResourceProviderChanges::default())
    }

    async fn deploy(&self, resource_id: Option<ElementId>, _resolved_spec: &MappingNode) -> Result<DeployOutput> {
        Ok(DeployOutput {
            resource_id: resource_id.unwrap_or_else(ElementId::new),
            computed_fields: MappingNode::Null,
        })
    }

    async fn stabilise(&self, _resource_id: ElementId, _resolved_spec: &MappingNode) -> Result<StabiliseOutcome> {
        Ok(StabiliseOutcome::Stable)
    }

    async fn destroy(&self, _resource_id: ElementId, _resolved_spec: &MappingNode) -> Result<()> {
        Ok(())
    }
}

struct EchoLinkProvider {
    link_type: String,
}

#[async_trait]
impl LinkProvider for EchoLinkProvider {
    async fn stage_changes(&self, _current: Option<&MappingNode>, _resolved: &MappingNode) -> Result<ResourceProviderChanges> {
        Ok(ResourceProviderChanges::default())
    }

    async fn get_priority_resource(&self) -> PriorityResource {
        PriorityResource::ResourceA
    }

    fn get_type(&self) -> &str {
        &self.link_type
    }

    async fn update_resource_a(&self, _resource_a_id: ElementId, _link_data: &MappingNode) -> Result<()> {
        Ok(())
    }

    async fn update_resource_b(&self, _resource_b_id: ElementId, _link_data: &MappingNode) -> Result<()> {
        Ok(())
    }

    async fn update_intermediaries(&self, _link_data: &MappingNode) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self, _resource_a_id: ElementId, _resource_b_id: ElementId, _link_data: &MappingNode) -> Result<()> {
        Ok(())
    }
}
