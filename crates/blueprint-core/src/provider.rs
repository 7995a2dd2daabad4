//! Provider plugin contract — the pluggable backend that actually deploys,
//! stabilises, and destroys resources and links. The engine itself never
//! talks to a cloud API directly; it only calls through these traits
//! (spec §6, "Provider plugin contract").

use async_trait::async_trait;
use std::sync::Arc;

use crate::id::ElementId;
use crate::mapping::{FieldDiffSet, MappingNode};
use crate::retry::RetryPolicy;
use crate::Result;

/// Outcome of a single deploy call against a resource provider. Providers
/// may return partial output even on failure (e.g. a partially created
/// cloud resource) so the engine can still persist an ID for later cleanup.
#[derive(Debug, Clone)]
pub struct DeployOutput {
    pub resource_id: ElementId,
    /// Provider-computed fields merged back into persisted state (e.g. an
    /// ARN or generated hostname unavailable until after creation).
    pub computed_fields: MappingNode,
}

/// Outcome of a stabilisation poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabiliseOutcome {
    /// The resource has reached a stable, ready state.
    Stable,
    /// Still converging; the engine should poll again after its configured
    /// interval.
    InProgress,
}

/// The field-level diff a resource plugin's `StageChanges` reports,
/// distinct from [`crate::mapping::diff_fields`]'s generic structural diff
/// in that a provider may mark fields as must-recreate or provider-computed
/// (spec §4.3, §3 Change Set).
#[derive(Debug, Clone, Default)]
pub struct ResourceProviderChanges {
    pub fields: FieldDiffSet,
    /// Field paths the provider computes itself (e.g. generated ARNs) and
    /// which should never be treated as a user-driven change.
    pub computed_fields: Vec<String>,
    /// `true` when this diff cannot be applied in place and implies
    /// destroy+recreate (spec §3 invariant: implies `RecreateResources`).
    pub must_recreate: bool,
}

/// A pluggable backend for one resource type (e.g. `"aws/lambda/function"`).
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// The resource type identifier this provider handles.
    fn resource_type(&self) -> &str;

    /// Diffs `current` (the persisted spec, absent for a new resource)
    /// against `resolved` (the staged resolved spec) (spec §4.3).
    async fn stage_changes(
        &self,
        current: Option<&MappingNode>,
        resolved: &MappingNode,
    ) -> Result<ResourceProviderChanges>;

    /// Begin creating or updating a resource. Returns as soon as the
    /// provider has accepted the change; does not wait for convergence.
    async fn deploy(
        &self,
        resource_id: Option<ElementId>,
        resolved_spec: &MappingNode,
    ) -> Result<DeployOutput>;

    /// Poll whether a previously-started deploy has converged.
    async fn stabilise(&self, resource_id: ElementId, resolved_spec: &MappingNode) -> Result<StabiliseOutcome>;

    /// Destroy a previously deployed resource. Idempotent: destroying an
    /// already-absent resource is not an error.
    async fn destroy(&self, resource_id: ElementId, resolved_spec: &MappingNode) -> Result<()>;

    /// A provider-specific retry policy overriding the loader default, if
    /// any (spec §4.8).
    fn get_retry_policy(&self) -> Option<RetryPolicy> {
        None
    }
}

/// Which endpoint of a link must exist before the other can be deployed
/// (spec glossary, "priority resource").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityResource {
    ResourceA,
    ResourceB,
}

/// Whether a link's absence blocks deployment of its endpoints. A `Soft`
/// link failing to deploy does not fail the overall operation; a `Hard`
/// link does (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Hard,
    Soft,
}

/// A pluggable backend for one link type between two resource types.
#[async_trait]
pub trait LinkProvider: Send + Sync {
    /// Diffs the link's current vs. proposed resolved form (spec §4.4).
    async fn stage_changes(
        &self,
        current: Option<&MappingNode>,
        resolved: &MappingNode,
    ) -> Result<ResourceProviderChanges>;

    /// Which endpoint must be deployed first (spec §4.2).
    async fn get_priority_resource(&self) -> PriorityResource;

    fn get_type(&self) -> &str;

    fn get_kind(&self) -> LinkKind {
        LinkKind::Hard
    }

    /// Update resource A's side of the link (spec §4.9, stage one).
    async fn update_resource_a(&self, resource_a_id: ElementId, link_data: &MappingNode) -> Result<()>;

    /// Update resource B's side of the link (stage two).
    async fn update_resource_b(&self, resource_b_id: ElementId, link_data: &MappingNode) -> Result<()>;

    /// Create/update any intermediary resources the link introduces
    /// (stage three).
    async fn update_intermediaries(&self, link_data: &MappingNode) -> Result<()>;

    /// Tear down the link, inverse of the three update stages.
    async fn destroy(
        &self,
        resource_a_id: ElementId,
        resource_b_id: ElementId,
        link_data: &MappingNode,
    ) -> Result<()>;

    /// Called when resource A's side update fails terminally, giving the
    /// link plugin a chance to translate the failure (e.g. into a more
    /// specific reason) before the engine marks the link failed.
    fn handle_resource_type_a_error(&self, error: &crate::Error) -> String {
        error.to_string()
    }

    /// Symmetric to [`LinkProvider::handle_resource_type_a_error`] for
    /// resource B's side.
    fn handle_resource_type_b_error(&self, error: &crate::Error) -> String {
        error.to_string()
    }
}

/// A pluggable backend that resolves a data source's filter into exported
/// values (spec §3, Data Source Spec).
#[async_trait]
pub trait DataSourceProvider: Send + Sync {
    fn data_source_type(&self) -> &str;

    async fn query(&self, filter: &MappingNode) -> Result<MappingNode>;
}

/// Whole-instance drift detection, checked synchronously against a single
/// snapshot of current provider-side state (design decision recorded for the
/// "how does drift checking interact with staging" open question).
#[async_trait]
pub trait DriftChecker: Send + Sync {
    async fn check(&self, instance_id: ElementId, current_state: &MappingNode) -> Result<DriftResult>;
}

#[derive(Debug, Clone, Default)]
pub struct DriftResult {
    pub has_drifted: bool,
    pub drifted_resources: Vec<String>,
}

/// A loaded provider plugin: a namespace exposing zero or more resource,
/// link, and data-source implementations. Custom variable types and
/// functions are part of the same real-world contract (spec §6) but are
/// consumed entirely by the substitution resolver, which this engine treats
/// as an external collaborator, so they are not surfaced here.
pub trait Provider: Send + Sync {
    fn namespace(&self) -> &str;

    fn resource(&self, resource_type: &str) -> Option<Arc<dyn ResourceProvider>>;

    fn link(&self, type_a: &str, type_b: &str) -> Option<Arc<dyn LinkProvider>>;

    fn data_source(&self, data_source_type: &str) -> Option<Arc<dyn DataSourceProvider>>;
}

/// Aggregates every loaded [`Provider`] so the engine can resolve a resource
/// or link type without knowing which plugin owns it.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn resource(&self, resource_type: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.providers.iter().find_map(|p| p.resource(resource_type))
    }

    pub fn link(&self, type_a: &str, type_b: &str) -> Option<Arc<dyn LinkProvider>> {
        self.providers.iter().find_map(|p| p.link(type_a, type_b))
    }

    pub fn data_source(&self, data_source_type: &str) -> Option<Arc<dyn DataSourceProvider>> {
        self.providers.iter().find_map(|p| p.data_source(data_source_type))
    }
}
