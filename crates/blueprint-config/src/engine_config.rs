//! Engine-level tunables: how deep child blueprints may nest, the default
//! retry policy for resource/link deployers, stabilisation polling
//! parameters, and the per-wave concurrency cap. The engine itself does not
//! mandate a file format for these (spec §1, Non-goals); this is the
//! convenience KDL loader a host typically reaches for, mirroring the
//! system-configuration loader's shape in the corpus this crate is modelled
//! on.

use std::time::Duration;

use kdl::KdlDocument;

use crate::{ConfigError, ConfigResult};

/// Retry/backoff parameters shared by the resource and link deployers,
/// unless a provider supplies its own via `get_retry_policy`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_factor: f64,
    pub jitter_fraction: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_fraction: 0.1,
        }
    }
}

/// Stabilisation polling parameters for the Resource Deployer's
/// `Stabilising` state (spec §4.8).
#[derive(Debug, Clone, Copy)]
pub struct StabilisationConfig {
    pub polling_interval: Duration,
    pub polling_timeout: Duration,
}

impl Default for StabilisationConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(2),
            polling_timeout: Duration::from_secs(120),
        }
    }
}

/// Top-level engine configuration, loaded once by the host and threaded
/// into the `Loader`/`Container` (spec §10).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum child-blueprint nesting depth; exceeding it fails staging
    /// with `MaxBlueprintDepthExceeded` (spec §7).
    pub max_blueprint_depth: u32,
    pub default_retry_policy: RetryPolicyConfig,
    pub stabilisation: StabilisationConfig,
    /// Upper bound on concurrently-spawned per-element tasks within a
    /// single wave.
    pub wave_concurrency_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_blueprint_depth: 5,
            default_retry_policy: RetryPolicyConfig::default(),
            stabilisation: StabilisationConfig::default(),
            wave_concurrency_cap: 16,
        }
    }
}

/// Parses an [`EngineConfig`] from KDL text of the form:
///
/// ```kdl
/// max-blueprint-depth 5
/// wave-concurrency-cap 16
///
/// retry-policy {
///     max-attempts 5
///     initial-backoff-ms 500
///     max-backoff-ms 30000
///     backoff-factor 2.0
///     jitter-fraction 0.1
/// }
///
/// stabilisation {
///     polling-interval-ms 2000
///     polling-timeout-ms 120000
/// }
/// ```
///
/// Any field, or the whole document, may be omitted — missing sections fall
/// back to [`EngineConfig::default`].
pub fn parse_engine_config(kdl: &str) -> ConfigResult<EngineConfig> {
    let doc: KdlDocument = kdl.parse().map_err(ConfigError::Parse)?;
    let mut config = EngineConfig::default();

    if let Some(node) = doc.get("max-blueprint-depth") {
        config.max_blueprint_depth = integer_arg(node, "max-blueprint-depth")? as u32;
    }
    if let Some(node) = doc.get("wave-concurrency-cap") {
        config.wave_concurrency_cap = integer_arg(node, "wave-concurrency-cap")? as usize;
    }

    if let Some(node) = doc.get("retry-policy") {
        let children = node
            .children()
            .ok_or_else(|| ConfigError::MissingField("retry-policy has no body".into()))?;
        let mut policy = RetryPolicyConfig::default();
        if let Some(n) = children.get("max-attempts") {
            policy.max_attempts = integer_arg(n, "max-attempts")? as u32;
        }
        if let Some(n) = children.get("initial-backoff-ms") {
            policy.initial_backoff = Duration::from_millis(integer_arg(n, "initial-backoff-ms")? as u64);
        }
        if let Some(n) = children.get("max-backoff-ms") {
            policy.max_backoff = Duration::from_millis(integer_arg(n, "max-backoff-ms")? as u64);
        }
        if let Some(n) = children.get("backoff-factor") {
            policy.backoff_factor = float_arg(n, "backoff-factor")?;
        }
        if let Some(n) = children.get("jitter-fraction") {
            policy.jitter_fraction = float_arg(n, "jitter-fraction")?;
        }
        config.default_retry_policy = policy;
    }

    if let Some(node) = doc.get("stabilisation") {
        let children = node
            .children()
            .ok_or_else(|| ConfigError::MissingField("stabilisation has no body".into()))?;
        let mut stabilisation = StabilisationConfig::default();
        if let Some(n) = children.get("polling-interval-ms") {
            stabilisation.polling_interval =
                Duration::from_millis(integer_arg(n, "polling-interval-ms")? as u64);
        }
        if let Some(n) = children.get("polling-timeout-ms") {
            stabilisation.polling_timeout =
                Duration::from_millis(integer_arg(n, "polling-timeout-ms")? as u64);
        }
        config.stabilisation = stabilisation;
    }

    Ok(config)
}

fn integer_arg(node: &kdl::KdlNode, field: &str) -> ConfigResult<i64> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected an integer argument".to_string(),
        })
}

fn float_arg(node: &kdl::KdlNode, field: &str) -> ConfigResult<f64> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_float().or_else(|| e.value().as_integer().map(|i| i as f64)))
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a numeric argument".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_document_is_empty() {
        let config = parse_engine_config("").unwrap();
        assert_eq!(config.max_blueprint_depth, 5);
        assert_eq!(config.wave_concurrency_cap, 16);
    }

    #[test]
    fn parses_full_document() {
        let kdl = r#"
            max-blueprint-depth 3
            wave-concurrency-cap 4

            retry-policy {
                max-attempts 7
                initial-backoff-ms 100
                max-backoff-ms 5000
                backoff-factor 1.5
                jitter-fraction 0.2
            }

            stabilisation {
                polling-interval-ms 250
                polling-timeout-ms 10000
            }
        "#;
        let config = parse_engine_config(kdl).unwrap();
        assert_eq!(config.max_blueprint_depth, 3);
        assert_eq!(config.wave_concurrency_cap, 4);
        assert_eq!(config.default_retry_policy.max_attempts, 7);
        assert_eq!(
            config.default_retry_policy.initial_backoff,
            Duration::from_millis(100)
        );
        assert_eq!(config.stabilisation.polling_interval, Duration::from_millis(250));
    }

    #[test]
    fn partial_document_falls_back_to_defaults() {
        let config = parse_engine_config("max-blueprint-depth 9").unwrap();
        assert_eq!(config.max_blueprint_depth, 9);
        assert_eq!(config.wave_concurrency_cap, EngineConfig::default().wave_concurrency_cap);
    }
}
