//! Substitution and child-blueprint resolution for the smoke-test CLI. The
//! CLI's input blueprints are already fully concrete JSON - no expression
//! language to evaluate - so the substitution resolver is a passthrough and
//! the child resolver just reads another JSON file off disk.

use async_trait::async_trait;

use blueprint_core::blueprint::BlueprintSpec;
use blueprint_core::mapping::MappingNode;
use blueprint_core::substitution::{ResolutionOutcome, SubstitutionContext, SubstitutionResolver};
use blueprint_core::{Error, Result};

pub struct PassthroughResolver;

#[async_trait]
impl SubstitutionResolver for PassthroughResolver {
    async fn resolve(&self, expr: &MappingNode, _context: &SubstitutionContext) -> Result<ResolutionOutcome> {
        Ok(ResolutionOutcome::Resolved(expr.clone()))
    }
}

pub struct FileChildResolver;

#[async_trait]
impl blueprint_core::child_resolver::ChildBlueprintResolver for FileChildResolver {
    async fn resolve(&self, path: &str, _source_format: Option<&str>) -> Result<BlueprintSpec> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| Error::Internal(format!("reading child blueprint '{path}': {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| Error::Internal(format!("parsing child blueprint '{path}': {err}")))
    }
}
