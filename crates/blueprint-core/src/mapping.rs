//! The recursive mapping-node value type shared by resource specs, exports,
//! and variable values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A structurally-comparable tree value: object, array, or scalar.
///
/// `Null` is an explicit, present `null`; the *absence* of a field is
/// represented by it simply not appearing in an `Object`'s map — the two are
/// only distinguished from each other by schema-level nullability, which is
/// outside this engine's concern (see spec §3, Mapping Node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MappingNode {
    Object(BTreeMap<String, MappingNode>),
    Array(Vec<MappingNode>),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl MappingNode {
    pub fn as_object(&self) -> Option<&BTreeMap<String, MappingNode>> {
        match self {
            MappingNode::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[MappingNode]> {
        match self {
            MappingNode::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MappingNode::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MappingNode::Null)
    }

    /// Looks up a dotted field path (e.g. `"spec.handler.runtime"`) within
    /// this node, descending through objects and numeric array indices.
    pub fn get_path(&self, path: &str) -> Option<&MappingNode> {
        let mut current = self;
        for segment in path.split('.') {
            if segment.is_empty() {
                continue;
            }
            current = match current {
                MappingNode::Object(m) => m.get(segment)?,
                MappingNode::Array(a) => a.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Collects every leaf field path present in this node, in depth-first
    /// insertion order, prefixed by `prefix` (empty for the root call).
    pub fn field_paths(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_field_paths(prefix, &mut out);
        out
    }

    fn collect_field_paths(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            MappingNode::Object(m) => {
                if m.is_empty() && !prefix.is_empty() {
                    out.push(prefix.to_string());
                }
                for (k, v) in m {
                    let next = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    v.collect_field_paths(&next, out);
                }
            }
            MappingNode::Array(a) => {
                if a.is_empty() && !prefix.is_empty() {
                    out.push(prefix.to_string());
                }
                for (i, v) in a.iter().enumerate() {
                    let next = format!("{prefix}.{i}");
                    v.collect_field_paths(&next, out);
                }
            }
            _ => {
                if !prefix.is_empty() {
                    out.push(prefix.to_string());
                }
            }
        }
    }
}

/// Diff of one field path between a prior and new [`MappingNode`], used by
/// the resource/link change stagers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub path: String,
    pub prior: Option<MappingNode>,
    pub new: Option<MappingNode>,
}

/// Computes field-level differences between two resolved mapping nodes,
/// classifying every leaf path present in either tree into modified, new,
/// removed, or unchanged — mirroring the per-field buckets staging produces
/// for [`crate::changes::ResourceChange`].
pub fn diff_fields(prior: Option<&MappingNode>, new: Option<&MappingNode>) -> FieldDiffSet {
    let mut set = FieldDiffSet::default();
    let prior_paths: BTreeMap<String, &MappingNode> = prior
        .map(|p| p.field_paths("").into_iter().filter_map(|p2| p.get_path(&p2).map(|v| (p2, v))).collect())
        .unwrap_or_default();
    let new_paths: BTreeMap<String, &MappingNode> = new
        .map(|n| n.field_paths("").into_iter().filter_map(|p2| n.get_path(&p2).map(|v| (p2, v))).collect())
        .unwrap_or_default();

    for (path, new_val) in &new_paths {
        match prior_paths.get(path) {
            Some(prior_val) if *prior_val == *new_val => set.unchanged.push(path.clone()),
            Some(prior_val) => set.modified.push(FieldDiff {
                path: path.clone(),
                prior: Some((*prior_val).clone()),
                new: Some((*new_val).clone()),
            }),
            None => set.new_fields.push(FieldDiff {
                path: path.clone(),
                prior: None,
                new: Some((*new_val).clone()),
            }),
        }
    }
    for (path, prior_val) in &prior_paths {
        if !new_paths.contains_key(path) {
            set.removed.push(FieldDiff {
                path: path.clone(),
                prior: Some((*prior_val).clone()),
                new: None,
            });
        }
    }
    set
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiffSet {
    pub modified: Vec<FieldDiff>,
    pub new_fields: Vec<FieldDiff>,
    pub removed: Vec<FieldDiff>,
    pub unchanged: Vec<String>,
}

impl FieldDiffSet {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.new_fields.is_empty() && self.removed.is_empty()
    }
}
