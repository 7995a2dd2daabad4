//! Top-level request shapes for the three operations a host drives against a
//! `Container` (spec §6, "External Interfaces").

use std::collections::BTreeMap;

use blueprint_core::changes::ChangeSet;
use blueprint_core::mapping::MappingNode;
use blueprint_core::ElementId;

/// Input to `Container::stage_changes`. An absent `instance_id` (or one
/// equal to [`ElementId::nil`]) stages against an empty prior state, i.e. a
/// brand-new instance.
#[derive(Debug, Clone, Default)]
pub struct StageChangesRequest {
    pub instance_id: Option<ElementId>,
    /// Top-level variable overrides the host supplies for this blueprint.
    pub variables: BTreeMap<String, MappingNode>,
    /// `true` asks staging to skip the expand/resolve/diff pipeline
    /// entirely and instead compute the pure-removal change set implied by
    /// the instance's current persisted state - every resource, link, and
    /// child it holds becomes a removal, with no new or changed elements
    /// (spec §6, `StageChangesInput { InstanceID, Destroy }`). The result is
    /// suitable as the `Changes` a host then hands to `Destroy`.
    pub destroy: bool,
}

/// Input to `Container::deploy`.
///
/// Exactly one of `instance_id` or `instance_name` must be set for a new
/// instance (name, no ID); an existing instance must set `instance_id` and
/// leave `instance_name` empty (spec §7, Deploy input validation).
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub instance_id: Option<ElementId>,
    pub instance_name: Option<String>,
    pub changes: ChangeSet,
    /// `true` requests the engine run in rollback mode, inverting the
    /// change set's intent. Valid only against an instance that is
    /// currently mid-operation (see the rollback decision in DESIGN.md).
    pub rollback: bool,
}

/// Input to `Container::destroy`. Empty name lists mean "destroy the whole
/// instance"; non-empty lists destroy only the named elements, subject to
/// the same "no remaining dependents" invariant as a removal staged through
/// `Deploy`.
#[derive(Debug, Clone, Default)]
pub struct DestroyRequest {
    pub instance_id: ElementId,
    pub resource_names: Vec<String>,
    pub link_names: Vec<String>,
    pub child_names: Vec<String>,
}

impl DestroyRequest {
    pub fn whole_instance(instance_id: ElementId) -> Self {
        Self {
            instance_id,
            resource_names: Vec::new(),
            link_names: Vec::new(),
            child_names: Vec::new(),
        }
    }

    pub fn is_whole_instance(&self) -> bool {
        self.resource_names.is_empty() && self.link_names.is_empty() && self.child_names.is_empty()
    }
}
