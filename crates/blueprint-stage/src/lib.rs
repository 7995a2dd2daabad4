//! Change-staging pipeline: template expansion, dependency analysis, and
//! the resource/link/child change stagers that together produce a
//! [`blueprint_core::changes::ChangeSet`] from a blueprint spec and an
//! instance's persisted state, without calling any provider's `Deploy`.

pub mod child_stager;
pub mod dependency_analyser;
pub mod export_diff;
pub mod link_stager;
pub mod pipeline;
pub mod resource_stager;
pub mod staging_events;
pub mod template_expander;

pub use pipeline::{destroy_change_set, stage_changes, StageChangesInput};
pub use staging_events::{staging_event_channel, StagingEvent, StagingEventReceiver, StagingEventSender};
