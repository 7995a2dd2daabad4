//! Rollback support: `Deploy(Rollback=true)` inverts a change set's intent
//! so the same wave-scheduled deployment machinery tears down what a failed
//! forward operation created and restores what it changed, as far as the
//! change set's own data allows (spec §4.7, §9 Open Questions).
//!
//! A forward change set only carries enough information to revert an
//! in-place update (the field diffs record each changed field's prior
//! value) or to tear down a freshly created element. It does NOT carry the
//! resolved spec of something it destroyed, so rollback cannot resurrect a
//! removed/recreated element - the engine surfaces what it dropped via
//! `tracing::warn!` rather than silently pretending to restore it.

use std::collections::BTreeMap;

use blueprint_core::changes::{ChangeSet, LinkChange, ResourceChange};
use blueprint_core::mapping::{FieldDiff, MappingNode};

/// Inverts `changes`' intent for a rollback pass.
pub fn invert_for_rollback(changes: &ChangeSet) -> ChangeSet {
    let mut inverted = ChangeSet::default();

    // Freshly created elements are torn down.
    inverted.removed_resources.extend(changes.new_resources.keys().cloned());
    inverted.removed_links.extend(changes.new_links.keys().cloned());
    inverted.removed_children.extend(changes.new_children.keys().cloned());

    // In-place updates revert to their pre-change field values, as far as
    // the recorded field diffs allow.
    for (name, change) in &changes.resource_changes {
        inverted.resource_changes.insert(name.clone(), revert_resource_change(change));
    }
    for (key, change) in &changes.link_changes {
        inverted.link_changes.insert(key.clone(), revert_link_change(change));
    }

    // Destroyed/recreated elements can't be resurrected without their
    // original resolved spec, which a forward change set never carried.
    for name in changes.removed_resources.iter().chain(changes.recreate_resources.iter()) {
        tracing::warn!(resource = %name, "rollback cannot resurrect a destroyed resource without its prior resolved spec");
    }
    for name in &changes.removed_links {
        tracing::warn!(link = %name, "rollback cannot resurrect a destroyed link without its prior resolved data");
    }
    for name in changes.removed_children.iter().chain(changes.recreate_children.iter()) {
        tracing::warn!(child = %name, "rollback cannot resurrect a destroyed child instance");
    }
    // A child's own variable changes aren't tracked as field diffs, so a
    // `ChildChange` carries nothing for rollback to revert; it's dropped
    // rather than reapplied as-is.
    for name in changes.child_changes.keys() {
        tracing::warn!(child = %name, "rollback cannot revert a child's variable changes, only its creation/removal");
    }

    inverted
}

fn revert_resource_change(change: &ResourceChange) -> ResourceChange {
    ResourceChange {
        resource_id: change.resource_id,
        resource_type: change.resource_type.clone(),
        resolved_spec: apply_field_priors(&change.resolved_spec, &change.field_changes),
        field_changes: change
            .field_changes
            .iter()
            .map(|d| FieldDiff {
                path: d.path.clone(),
                prior: d.new.clone(),
                new: d.prior.clone(),
            })
            .collect(),
        depends_on_resources: change.depends_on_resources.clone(),
        depends_on_children: change.depends_on_children.clone(),
        partially_resolved: false,
    }
}

fn revert_link_change(change: &LinkChange) -> LinkChange {
    LinkChange {
        resource_a_name: change.resource_a_name.clone(),
        resource_b_name: change.resource_b_name.clone(),
        resolved_link_data: apply_field_priors(&change.resolved_link_data, &change.field_changes),
        field_changes: change
            .field_changes
            .iter()
            .map(|d| FieldDiff {
                path: d.path.clone(),
                prior: d.new.clone(),
                new: d.prior.clone(),
            })
            .collect(),
    }
}

/// Applies each diff's `prior` value back onto `resolved` at its dotted
/// path, or removes the field entirely if it didn't exist before the
/// forward change (`prior: None`). Only object-nested paths are supported -
/// array-indexed paths are left at their forward value, a known limitation
/// for rollback of templated (`each`) resources.
fn apply_field_priors(resolved: &MappingNode, diffs: &[FieldDiff]) -> MappingNode {
    let mut value = resolved.clone();
    for diff in diffs {
        match &diff.prior {
            Some(prior) => set_path(&mut value, &diff.path, prior.clone()),
            None => remove_path(&mut value, &diff.path),
        }
    }
    value
}

fn set_path(node: &mut MappingNode, path: &str, value: MappingNode) {
    let mut segments = path.split('.').peekable();
    let mut current = node;
    while let Some(segment) = segments.next() {
        let MappingNode::Object(map) = current else { return };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map.entry(segment.to_string()).or_insert_with(|| MappingNode::Object(BTreeMap::new()));
    }
}

fn remove_path(node: &mut MappingNode, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else { return };
    let mut current = node;
    for segment in segments {
        let MappingNode::Object(map) = current else { return };
        let Some(next) = map.get_mut(segment) else { return };
        current = next;
    }
    if let MappingNode::Object(map) = current {
        map.remove(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, MappingNode)]) -> MappingNode {
        MappingNode::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn reverts_new_resource_to_a_removal() {
        let mut changes = ChangeSet::default();
        changes.new_resources.insert(
            "ordersCache".to_string(),
            ResourceChange {
                resource_id: None,
                resource_type: "test/cache".to_string(),
                resolved_spec: MappingNode::Null,
                field_changes: vec![],
                depends_on_resources: vec![],
                depends_on_children: vec![],
                partially_resolved: false,
            },
        );
        let inverted = invert_for_rollback(&changes);
        assert_eq!(inverted.removed_resources, vec!["ordersCache".to_string()]);
    }

    #[test]
    fn reverts_modified_field_back_to_prior_value() {
        let mut changes = ChangeSet::default();
        changes.resource_changes.insert(
            "ordersApi".to_string(),
            ResourceChange {
                resource_id: None,
                resource_type: "test/api".to_string(),
                resolved_spec: obj(&[("memory", MappingNode::Int(256))]),
                field_changes: vec![FieldDiff {
                    path: "memory".to_string(),
                    prior: Some(MappingNode::Int(128)),
                    new: Some(MappingNode::Int(256)),
                }],
                depends_on_resources: vec![],
                depends_on_children: vec![],
                partially_resolved: false,
            },
        );
        let inverted = invert_for_rollback(&changes);
        let reverted = &inverted.resource_changes["ordersApi"];
        assert_eq!(reverted.resolved_spec.get_path("memory"), Some(&MappingNode::Int(128)));
    }

    #[test]
    fn field_added_by_forward_change_is_removed_on_rollback() {
        let mut changes = ChangeSet::default();
        changes.resource_changes.insert(
            "ordersApi".to_string(),
            ResourceChange {
                resource_id: None,
                resource_type: "test/api".to_string(),
                resolved_spec: obj(&[("timeout", MappingNode::Int(30))]),
                field_changes: vec![FieldDiff {
                    path: "timeout".to_string(),
                    prior: None,
                    new: Some(MappingNode::Int(30)),
                }],
                depends_on_resources: vec![],
                depends_on_children: vec![],
                partially_resolved: false,
            },
        );
        let inverted = invert_for_rollback(&changes);
        let reverted = &inverted.resource_changes["ordersApi"];
        assert_eq!(reverted.resolved_spec.get_path("timeout"), None);
    }
}
