//! The `Loader` binds a host's collaborators - provider registry,
//! substitution resolver, child blueprint resolver, state container, and an
//! optional drift checker - to engine-level configuration, then hands out a
//! `Container` for each blueprint the host loads.

use std::sync::Arc;

use blueprint_config::EngineConfig;
use blueprint_core::blueprint::BlueprintSpec;
use blueprint_core::child_resolver::ChildBlueprintResolver;
use blueprint_core::provider::{DriftChecker, ProviderRegistry};
use blueprint_core::state_container::StateContainer;
use blueprint_core::substitution::SubstitutionResolver;

/// Everything a `Container` needs to act on a blueprint, shared across
/// however many containers the host loads over the process lifetime.
#[derive(Clone)]
pub struct Loader {
    pub registry: Arc<ProviderRegistry>,
    pub resolver: Arc<dyn SubstitutionResolver>,
    pub child_resolver: Arc<dyn ChildBlueprintResolver>,
    pub state_container: Arc<dyn StateContainer>,
    pub drift_checker: Option<Arc<dyn DriftChecker>>,
    pub config: EngineConfig,
}

impl Loader {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        resolver: Arc<dyn SubstitutionResolver>,
        child_resolver: Arc<dyn ChildBlueprintResolver>,
        state_container: Arc<dyn StateContainer>,
    ) -> Self {
        Self {
            registry,
            resolver,
            child_resolver,
            state_container,
            drift_checker: None,
            config: EngineConfig::default(),
        }
    }

    pub fn with_drift_checker(mut self, checker: Arc<dyn DriftChecker>) -> Self {
        self.drift_checker = Some(checker);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds `blueprint` to this loader's collaborators, producing the
    /// `Container` the host drives `StageChanges`/`Deploy`/`Destroy` against.
    pub fn load(&self, blueprint: BlueprintSpec) -> Container {
        Container {
            blueprint,
            registry: self.registry.clone(),
            resolver: self.resolver.clone(),
            child_resolver: self.child_resolver.clone(),
            state_container: self.state_container.clone(),
            drift_checker: self.drift_checker.clone(),
            config: self.config,
        }
    }
}

/// The orchestrator bound to one blueprint. Cheap to clone - every field is
/// either an `Arc` or a `Copy` config struct - so recursing into a child
/// blueprint is just constructing a new `Container` over the same
/// collaborators (see [`crate::stage`], [`crate::deploy_graph`]).
#[derive(Clone)]
pub struct Container {
    pub(crate) blueprint: BlueprintSpec,
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) resolver: Arc<dyn SubstitutionResolver>,
    pub(crate) child_resolver: Arc<dyn ChildBlueprintResolver>,
    pub(crate) state_container: Arc<dyn StateContainer>,
    pub(crate) drift_checker: Option<Arc<dyn DriftChecker>>,
    pub(crate) config: EngineConfig,
}

impl Container {
    pub fn blueprint(&self) -> &BlueprintSpec {
        &self.blueprint
    }

    /// The loader-configured retry policy, used whenever a provider doesn't
    /// supply its own via `get_retry_policy` (spec §4.8).
    pub(crate) fn default_retry_policy(&self) -> blueprint_core::retry::RetryPolicy {
        let cfg = self.config.default_retry_policy;
        blueprint_core::retry::RetryPolicy {
            max_attempts: cfg.max_attempts,
            initial_backoff: cfg.initial_backoff,
            max_backoff: cfg.max_backoff,
            backoff_factor: cfg.backoff_factor,
            jitter_fraction: cfg.jitter_fraction,
        }
    }

    pub(crate) fn default_stabilisation(&self) -> blueprint_deploy::resource_deployer::StabilisationPolicy {
        blueprint_deploy::resource_deployer::StabilisationPolicy {
            polling_interval: self.config.stabilisation.polling_interval,
            polling_timeout: self.config.stabilisation.polling_timeout,
        }
    }
}
