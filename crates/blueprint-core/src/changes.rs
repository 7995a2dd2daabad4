//! The change set produced by staging — the diff between a blueprint's
//! desired resolved state and an instance's persisted state, before any
//! deploy call is made against a provider.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::ElementId;
use crate::mapping::{FieldDiff, MappingNode};

/// The full output of the Template Expander → Dependency Analyser →
/// Resource/Link/Child Change Stager pipeline (spec §4.1-§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub new_resources: BTreeMap<String, ResourceChange>,
    pub resource_changes: BTreeMap<String, ResourceChange>,
    pub removed_resources: Vec<String>,
    /// Resources whose deploy requires full destroy+recreate rather than an
    /// in-place update (e.g. an immutable field changed).
    pub recreate_resources: Vec<String>,
    /// Children that must be recreated because a resource they directly
    /// `dependsOn` is itself being recreated. Propagates exactly one level;
    /// see the recreate-propagation decision in the design notes.
    pub recreate_children: Vec<String>,

    pub new_links: BTreeMap<String, LinkChange>,
    pub link_changes: BTreeMap<String, LinkChange>,
    pub removed_links: Vec<String>,

    pub new_children: BTreeMap<String, ChildChange>,
    pub child_changes: BTreeMap<String, ChildChange>,
    pub removed_children: Vec<String>,

    pub resolve_on_deploy: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_resources.is_empty()
            && self.resource_changes.is_empty()
            && self.removed_resources.is_empty()
            && self.new_links.is_empty()
            && self.link_changes.is_empty()
            && self.removed_links.is_empty()
            && self.new_children.is_empty()
            && self.child_changes.is_empty()
            && self.removed_children.is_empty()
    }
}

/// A staged change to a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub resource_id: Option<ElementId>,
    pub resource_type: String,
    pub resolved_spec: MappingNode,
    pub field_changes: Vec<FieldDiff>,
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
    /// `true` if one or more fields in `resolved_spec` could not be fully
    /// resolved ahead of deploy (e.g. they reference another resource's
    /// output) and must be resolved again once dependencies are deployed.
    pub partially_resolved: bool,
}

/// A staged change to a single link between two resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkChange {
    pub resource_a_name: String,
    pub resource_b_name: String,
    pub resolved_link_data: MappingNode,
    pub field_changes: Vec<FieldDiff>,
}

/// A staged change to a nested child blueprint instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildChange {
    /// The include's resolved source path, e.g. `"./children/core-infra.blueprint"`.
    pub resolved_path: String,
    /// Instance tree path the nested instance is (or will be) persisted
    /// under, e.g. `"blueprint-instance-2/coreInfra"`.
    pub tree_path: String,
    pub variables: BTreeMap<String, MappingNode>,
    pub depends_on_resources: Vec<String>,
    pub depends_on_children: Vec<String>,
    /// The child's own staged change set, computed recursively while
    /// staging its parent. Deploy drives the child's creation/update
    /// directly from this rather than re-running staging for it.
    pub changes: Box<ChangeSet>,
}
