//! Staging's own event stream. Deploy/Destroy multiplex onto the six
//! logical channels of [`blueprint_core::events`]; staging is a narrower,
//! single-call operation so its progress messages are modelled as one
//! channel of [`StagingEvent`] rather than the full Deploy/Destroy set
//! (spec §4.6 emits "per-element messages" during the parallel staging
//! phase, then a single `Complete` message).

use blueprint_core::changes::{ChangeSet, ChildChange, LinkChange, ResourceChange};

#[derive(Debug, Clone)]
pub enum StagingEvent {
    ResourceStaged { name: String, change: Option<ResourceChange> },
    LinkStaged { name: String, change: Option<LinkChange> },
    ChildStaged { name: String, change: ChildChange },
    /// Terminal message carrying the full, assembled change set.
    Complete(ChangeSet),
}

pub type StagingEventSender = tokio::sync::mpsc::UnboundedSender<StagingEvent>;
pub type StagingEventReceiver = tokio::sync::mpsc::UnboundedReceiver<StagingEvent>;

pub fn staging_event_channel() -> (StagingEventSender, StagingEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
