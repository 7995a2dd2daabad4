//! State container contract — persistence for instance state, decoupled
//! from the engine so hosts can back it with whatever store they like
//! (spec §6, "State container contract").

use async_trait::async_trait;

use crate::id::ElementId;
use crate::state::InstanceState;
use crate::Result;

/// Reads and writes persisted [`InstanceState`]. Implementations must
/// guarantee that a single instance's state is never concurrently
/// overwritten by two in-flight deploys (the engine itself only ever holds
/// one in-flight deploy per instance, but a container shared across
/// engines should still serialize writes per instance ID).
#[async_trait]
pub trait StateContainer: Send + Sync {
    async fn get(&self, instance_id: ElementId) -> Result<Option<InstanceState>>;

    async fn get_by_name(&self, instance_name: &str) -> Result<Option<InstanceState>>;

    async fn save(&self, state: &InstanceState) -> Result<()>;

    async fn remove(&self, instance_id: ElementId) -> Result<()>;

    async fn list(&self) -> Result<Vec<InstanceState>>;
}
