//! The validated blueprint schema tree — the engine's read-only input.
//!
//! Producing this tree (parsing, schema validation) is out of scope for the
//! engine; it is handed a [`BlueprintSpec`] already built by an external
//! loader.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::mapping::MappingNode;

/// A validated blueprint definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueprintSpec {
    pub variables: BTreeMap<String, Variable>,
    pub values: BTreeMap<String, MappingNode>,
    pub includes: BTreeMap<String, Include>,
    pub resources: BTreeMap<String, ResourceSpec>,
    pub data_sources: BTreeMap<String, DataSourceSpec>,
    pub exports: BTreeMap<String, ExportSpec>,
    pub metadata: BTreeMap<String, MappingNode>,
    pub transforms: Vec<String>,
}

/// A blueprint variable declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub var_type: String,
    pub default: Option<MappingNode>,
}

/// An `includes.*` child-blueprint reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Include {
    /// Substitution expression (unresolved) producing the child's path.
    pub path: MappingNode,
    /// `"absolute"` or a source + declared format, left opaque to this engine.
    pub source_format: Option<String>,
    /// Parameter overrides passed into the child blueprint.
    pub variables: BTreeMap<String, MappingNode>,
}

/// A single resource entry in the blueprint (possibly templated via `each`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Provider type identifier, e.g. `"aws/lambda/function"`.
    pub resource_type: String,
    /// Unresolved `each` substitution; presence marks this as a template.
    pub each: Option<MappingNode>,
    /// Unresolved condition substitution.
    pub condition: Option<MappingNode>,
    pub depends_on: Vec<String>,
    pub link_selector: LinkSelector,
    pub metadata: ResourceMetadata,
    pub spec: MappingNode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkSelector {
    pub by_label: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub data_source_type: String,
    pub filter: MappingNode,
    pub exports: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSpec {
    /// Unresolved substitution producing the exported value.
    pub field: MappingNode,
    pub description: Option<String>,
}

impl BlueprintSpec {
    /// All resource logical names that carry an `each` (i.e. are templates).
    pub fn template_names(&self) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| r.each.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
