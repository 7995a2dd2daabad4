//! KDL configuration loading for the blueprint orchestration engine.
//!
//! This crate owns exactly one concern: turning KDL text into an
//! [`EngineConfig`] of engine-level tunables (max blueprint depth, default
//! retry policy, stabilisation polling, wave concurrency). It does not parse
//! blueprint specs themselves — that schema is produced by an external
//! loader the engine treats as out of scope (spec §1).

pub mod engine_config;
pub mod error;

pub use engine_config::{parse_engine_config, EngineConfig, RetryPolicyConfig, StabilisationConfig};
pub use error::{ConfigError, ConfigResult};
