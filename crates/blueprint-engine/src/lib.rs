//! The top-level `Container` orchestrator: `StageChanges`, `Deploy`, and
//! `Destroy` over a blueprint bound by the `Loader`. Wires together the
//! staging pipeline (`blueprint-stage`) and the per-element deployers,
//! removal orderer, and destroyers (`blueprint-deploy`) into the wave-scheduled,
//! event-streamed state machine described by the engine's external interface.
//!
//! Everything this crate depends on - provider plugins, the state container,
//! the substitution resolver, the child blueprint resolver - is an external
//! collaborator reached only through the trait contracts in `blueprint-core`.

pub mod deploy;
pub mod deployment_state;
pub mod deploy_graph;
pub mod destroy;
pub mod loader;
pub mod operation;
pub mod removal;
pub mod rollback;
pub mod stage;

pub use loader::{Container, Loader};
pub use operation::{DeployRequest, DestroyRequest, StageChangesRequest};
