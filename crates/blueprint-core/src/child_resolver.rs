//! Child-blueprint resolution is interface-only: given an `includes.*`
//! entry's resolved path, the engine asks a resolver to load and parse the
//! referenced blueprint, but never touches a filesystem or network itself
//! (spec §4.5).

use async_trait::async_trait;

use crate::blueprint::BlueprintSpec;
use crate::Result;

#[async_trait]
pub trait ChildBlueprintResolver: Send + Sync {
    /// Loads and parses the blueprint at `path`. `source_format` mirrors the
    /// include's declared format (e.g. `"absolute"`, `"git"`), left opaque
    /// to the engine.
    async fn resolve(&self, path: &str, source_format: Option<&str>) -> Result<BlueprintSpec>;
}
