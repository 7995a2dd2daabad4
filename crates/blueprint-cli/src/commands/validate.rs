//! Parses a blueprint JSON file and prints a structural summary, without
//! driving any engine phase against it.

use anyhow::{Context, Result};
use blueprint_core::blueprint::BlueprintSpec;

pub fn validate(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading blueprint file: {path}"))?;
    let blueprint: BlueprintSpec =
        serde_json::from_str(&content).with_context(|| format!("parsing blueprint file: {path}"))?;

    println!("Blueprint is valid");
    println!("  variables: {}", blueprint.variables.len());
    println!("  resources: {}", blueprint.resources.len());
    println!("  includes: {}", blueprint.includes.len());
    println!("  data sources: {}", blueprint.data_sources.len());
    println!("  exports: {}", blueprint.exports.len());

    let templates = blueprint.template_names();
    if !templates.is_empty() {
        println!("  templated resources: {}", templates.join(", "));
    }

    Ok(())
}
