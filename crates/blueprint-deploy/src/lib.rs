//! Per-element deployers and the removal orderer: the resource and link
//! state machines that drive a single element through a provider plugin
//! (spec §4.8, §4.9), the destroy-side equivalents, and the dependents-first
//! ordering used to tear down removed or recreated elements (spec §4.10).
//!
//! Nothing in this crate schedules waves or tracks an instance's overall
//! deployment state - that's `blueprint-engine`'s job. Each function here
//! only ever drives one resource or one link to completion.

pub mod destroyer;
pub mod jitter;
pub mod link_deployer;
pub mod removal_orderer;
pub mod resource_deployer;

pub use destroyer::{destroy_link, destroy_resource, DestroyOutcome, DestroyProgress};
pub use jitter::next_jitter_seed;
pub use link_deployer::{deploy_link, LinkDeployOutcome, LinkDeployProgress, LinkStageDurations};
pub use removal_orderer::{order_removal, RemovalElement};
pub use resource_deployer::{deploy_resource, ResourceDeployOutcome, ResourceDeployProgress, StabilisationPolicy};
