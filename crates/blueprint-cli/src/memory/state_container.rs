//! A state container backed by an in-process `Mutex<HashMap>`. Good enough
//! for driving the engine end-to-end within one CLI invocation; nothing here
//! survives the process exiting, which is the point - the host is expected
//! to bring its own durable backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use blueprint_core::id::ElementId;
use blueprint_core::state::InstanceState;
use blueprint_core::Result;
use blueprint_core::state_container::StateContainer;

#[derive(Default)]
pub struct InMemoryStateContainer {
    instances: Mutex<HashMap<ElementId, InstanceState>>,
}

impl InMemoryStateContainer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateContainer for InMemoryStateContainer {
    async fn get(&self, instance_id: ElementId) -> Result<Option<InstanceState>> {
        Ok(self.instances.lock().expect("state container mutex poisoned").get(&instance_id).cloned())
    }

    async fn get_by_name(&self, instance_name: &str) -> Result<Option<InstanceState>> {
        Ok(self
            .instances
            .lock()
            .expect("state container mutex poisoned")
            .values()
            .find(|s| s.instance_name == instance_name)
            .cloned())
    }

    async fn save(&self, state: &InstanceState) -> Result<()> {
        self.instances
            .lock()
            .expect("state container mutex poisoned")
            .insert(state.instance_id, state.clone());
        Ok(())
    }

    async fn remove(&self, instance_id: ElementId) -> Result<()> {
        self.instances.lock().expect("state container mutex poisoned").remove(&instance_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<InstanceState>> {
        Ok(self.instances.lock().expect("state container mutex poisoned").values().cloned().collect())
    }
}
