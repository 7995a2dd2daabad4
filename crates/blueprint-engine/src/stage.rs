//! `Container::stage_changes`: the host-facing entry point for the
//! Orchestrator's StageChanges phase sequence (spec §4.6). Snapshots
//! persisted state, then delegates the actual expand/analyse/stage/recurse
//! work to `blueprint_stage::stage_changes`.

use blueprint_core::changes::ChangeSet;
use blueprint_core::substitution::SubstitutionContext;
use blueprint_core::Result;
use blueprint_stage::{destroy_change_set, staging_event_channel, StageChangesInput, StagingEventReceiver, StagingEventSender};

use crate::loader::Container;
use crate::operation::StageChangesRequest;

impl Container {
    /// Stages changes for this container's blueprint, returning a channel of
    /// per-element progress messages plus a handle resolving to the
    /// assembled change set (spec §6: "each call is event-streaming").
    pub fn stage_changes(
        &self,
        request: StageChangesRequest,
    ) -> (StagingEventReceiver, tokio::task::JoinHandle<Result<ChangeSet>>) {
        let (tx, rx) = staging_event_channel();
        let container = self.clone();
        let handle = tokio::spawn(async move { container.stage_changes_inner(request, tx).await });
        (rx, handle)
    }

    async fn stage_changes_inner(&self, request: StageChangesRequest, tx: StagingEventSender) -> Result<ChangeSet> {
        let instance_id = request.instance_id.filter(|id| !id.is_nil());
        let current = match instance_id {
            Some(id) => self.state_container.get(id).await?,
            None => None,
        };

        let tree_path = current
            .as_ref()
            .map(|c| c.instance_name.clone())
            .or_else(|| instance_id.map(|id| id.to_string()))
            .unwrap_or_else(|| "new-instance".to_string());

        if request.destroy {
            tracing::info!(tree_path = %tree_path, "staging destroy change set");
            return Ok(destroy_change_set(current.as_ref(), Some(&tx)));
        }

        let context = SubstitutionContext {
            variables: request.variables,
            resolved_resources: Default::default(),
            each_item: None,
        };

        tracing::info!(tree_path = %tree_path, "staging changes");

        let result = blueprint_stage::stage_changes(
            StageChangesInput {
                blueprint: &self.blueprint,
                current: current.as_ref(),
                registry: &self.registry,
                resolver: self.resolver.as_ref(),
                child_resolver: self.child_resolver.as_ref(),
                state_container: Some(self.state_container.as_ref()),
                context,
                tree_path: tree_path.clone(),
                ancestor_instance_ids: Vec::new(),
                max_depth: self.config.max_blueprint_depth,
                current_depth: 0,
            },
            Some(&tx),
        )
        .await;

        match &result {
            Ok(changes) => tracing::info!(tree_path = %tree_path, empty = changes.is_empty(), "staging complete"),
            Err(err) => tracing::warn!(tree_path = %tree_path, error = %err, "staging failed"),
        }

        result
    }
}
