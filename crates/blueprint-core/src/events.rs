//! The event stream emitted by `Deploy`/`Destroy` over six logical channels,
//! multiplexed onto one [`tokio::sync::mpsc`] channel per call (spec §6).

use serde::{Deserialize, Serialize};

use crate::changes::{ChildChange, LinkChange, ResourceChange};
use crate::id::ElementId;
use crate::state::OperationDurations;
use crate::status::{ChildStatus, InstanceStatus, LinkPreciseStatus, ResourcePreciseStatus};

/// One message on the engine's event stream. A single `Deploy`/`Destroy`
/// call yields a sequence of these, terminated by exactly one of
/// [`EngineEvent::Finish`] or [`EngineEvent::Err`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    ResourceUpdate(ResourceUpdateEvent),
    ChildUpdate(ChildUpdateEvent),
    LinkUpdate(LinkUpdateEvent),
    DeploymentUpdate(DeploymentUpdateEvent),
    Finish(FinishEvent),
    Err(ErrEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdateEvent {
    pub instance_id: ElementId,
    pub resource_name: String,
    pub resource_id: Option<ElementId>,
    pub precise_status: ResourcePreciseStatus,
    pub change: Option<ResourceChange>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildUpdateEvent {
    pub instance_id: ElementId,
    pub child_name: String,
    pub child_instance_id: Option<ElementId>,
    pub status: ChildStatus,
    pub change: Option<ChildChange>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkUpdateEvent {
    pub instance_id: ElementId,
    pub link_name: String,
    pub precise_status: LinkPreciseStatus,
    pub change: Option<LinkChange>,
    pub failure_reason: Option<String>,
}

/// Instance-level status transition, emitted at the start and end of a
/// deploy/destroy call and on any rollback transition in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentUpdateEvent {
    pub instance_id: ElementId,
    pub status: InstanceStatus,
}

/// Terminal event closing out a `Deploy`/`Destroy` call; no further events
/// follow on this stream. Carries the aggregated outcome so a host doesn't
/// have to replay every prior `*Update` message to answer "what failed and
/// how long did it take" (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishEvent {
    pub instance_id: ElementId,
    pub status: InstanceStatus,
    /// Logical names of the elements (resources, links, children) that did
    /// not reach a successful terminal status. Empty on full success.
    pub failed_elements: Vec<String>,
    /// Failure reasons collected from every failed element, in the order
    /// they were recorded.
    pub failure_reasons: Vec<String>,
    pub durations: OperationDurations,
}

/// Terminal failure event; no further events follow on this stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrEvent {
    pub instance_id: ElementId,
    pub message: String,
    pub reason: crate::error::ReasonCode,
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineEvent>;

/// Creates a fresh event channel for one `Deploy`/`Destroy` call.
pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
