//! Resource Deployer: drives one resource through `Deploying` ->
//! `ConfigComplete` -> `Stabilising` -> `Deployed`/`DeployFailed` (spec
//! §4.8), retrying transient provider failures per its retry policy and
//! falling back to the loader default when the provider doesn't supply one.

use std::time::{Duration, Instant};

use blueprint_core::id::ElementId;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::{ResourceProvider, StabiliseOutcome};
use blueprint_core::retry::RetryPolicy;
use blueprint_core::state::OperationDurations;
use blueprint_core::status::ResourcePreciseStatus;
use blueprint_core::Result;

use crate::jitter::next_jitter_seed;

/// Stabilisation polling parameters for the `Stabilising` state.
#[derive(Debug, Clone, Copy)]
pub struct StabilisationPolicy {
    pub polling_interval: Duration,
    pub polling_timeout: Duration,
}

impl Default for StabilisationPolicy {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(2),
            polling_timeout: Duration::from_secs(120),
        }
    }
}

/// One progress message from a running resource deploy.
#[derive(Debug, Clone)]
pub struct ResourceDeployProgress {
    pub precise_status: ResourcePreciseStatus,
    pub attempt: u32,
    pub failure_reason: Option<String>,
}

pub type ResourceDeployProgressSender = tokio::sync::mpsc::UnboundedSender<ResourceDeployProgress>;

/// Terminal outcome of a resource deploy. `Failed` is the non-retryable,
/// provider-reported kind (spec: "other errors are fatal and terminate the
/// whole operation" — those propagate as `Err` instead).
#[derive(Debug, Clone)]
pub enum ResourceDeployOutcome {
    Deployed {
        resource_id: ElementId,
        computed_fields: MappingNode,
        durations: OperationDurations,
    },
    Failed {
        reasons: Vec<String>,
        durations: OperationDurations,
    },
}

/// Runs the Resource Deployer state machine to completion for one resource.
pub async fn deploy_resource(
    resource_id: Option<ElementId>,
    resolved_spec: &MappingNode,
    provider: &dyn ResourceProvider,
    policy: RetryPolicy,
    stabilisation: StabilisationPolicy,
    progress: Option<&ResourceDeployProgressSender>,
) -> Result<ResourceDeployOutcome> {
    let started = Instant::now();
    let mut durations = OperationDurations::default();
    let mut attempt: u32 = 0;

    let deploy_output = loop {
        attempt += 1;
        let attempt_started = Instant::now();
        emit(progress, ResourcePreciseStatus::Deploying, attempt, None);

        match provider.deploy(resource_id, resolved_spec).await {
            Ok(output) => {
                durations.attempt_durations.push(attempt_started.elapsed());
                break output;
            }
            Err(err) if err.is_retryable() => {
                durations.attempt_durations.push(attempt_started.elapsed());
                if !policy.should_retry(attempt) {
                    durations.total = started.elapsed();
                    return Ok(ResourceDeployOutcome::Failed {
                        reasons: vec![format!(
                            "exceeded max retries ({}) deploying resource: {err}",
                            policy.max_attempts
                        )],
                        durations,
                    });
                }
                emit(
                    progress,
                    ResourcePreciseStatus::Deploying,
                    attempt,
                    Some(err.to_string()),
                );
                let wait_ms = policy.calculate_retry_wait_time_ms(attempt, next_jitter_seed());
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                continue;
            }
            Err(err) => {
                durations.attempt_durations.push(attempt_started.elapsed());
                durations.total = started.elapsed();
                return match err.provider_failure_reasons() {
                    Some(reasons) => Ok(ResourceDeployOutcome::Failed {
                        reasons: reasons.to_vec(),
                        durations,
                    }),
                    None => Err(err),
                };
            }
        }
    };

    emit(progress, ResourcePreciseStatus::ConfigComplete, attempt, None);
    durations.config_complete = Some(started.elapsed());

    emit(progress, ResourcePreciseStatus::Stabilising, attempt, None);
    let stabilise_started = Instant::now();
    loop {
        match provider.stabilise(deploy_output.resource_id, resolved_spec).await {
            Ok(StabiliseOutcome::Stable) => break,
            Ok(StabiliseOutcome::InProgress) => {
                if stabilise_started.elapsed() >= stabilisation.polling_timeout {
                    durations.stabilising = Some(stabilise_started.elapsed());
                    durations.total = started.elapsed();
                    return Ok(ResourceDeployOutcome::Failed {
                        reasons: vec!["resource did not stabilise within the configured timeout".to_string()],
                        durations,
                    });
                }
                tokio::time::sleep(stabilisation.polling_interval).await;
            }
            Err(err) => {
                durations.stabilising = Some(stabilise_started.elapsed());
                durations.total = started.elapsed();
                return match err.provider_failure_reasons() {
                    Some(reasons) => Ok(ResourceDeployOutcome::Failed {
                        reasons: reasons.to_vec(),
                        durations,
                    }),
                    None => Err(err),
                };
            }
        }
    }
    durations.stabilising = Some(stabilise_started.elapsed());
    durations.total = started.elapsed();

    emit(progress, ResourcePreciseStatus::Deployed, attempt, None);
    Ok(ResourceDeployOutcome::Deployed {
        resource_id: deploy_output.resource_id,
        computed_fields: deploy_output.computed_fields,
        durations,
    })
}

fn emit(
    progress: Option<&ResourceDeployProgressSender>,
    status: ResourcePreciseStatus,
    attempt: u32,
    failure_reason: Option<String>,
) {
    if let Some(sender) = progress {
        let _ = sender.send(ResourceDeployProgress {
            precise_status: status,
            attempt,
            failure_reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blueprint_core::provider::{DeployOutput, ResourceProviderChanges};
    use blueprint_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FlakyProvider {
        fail_until_attempt: u32,
        calls: AtomicU32,
        stabilise_polls: Mutex<u32>,
    }

    #[async_trait]
    impl ResourceProvider for FlakyProvider {
        fn resource_type(&self) -> &str {
            "test/flaky"
        }

        async fn stage_changes(
            &self,
            _current: Option<&MappingNode>,
            _resolved: &MappingNode,
        ) -> Result<ResourceProviderChanges> {
            Ok(ResourceProviderChanges::default())
        }

        async fn deploy(&self, _resource_id: Option<ElementId>, _resolved_spec: &MappingNode) -> Result<DeployOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.fail_until_attempt {
                return Err(Error::Retryable("not ready yet".to_string()));
            }
            Ok(DeployOutput {
                resource_id: ElementId::new(),
                computed_fields: MappingNode::Null,
            })
        }

        async fn stabilise(&self, _resource_id: ElementId, _resolved_spec: &MappingNode) -> Result<StabiliseOutcome> {
            let mut polls = self.stabilise_polls.lock().unwrap();
            *polls += 1;
            if *polls >= 2 {
                Ok(StabiliseOutcome::Stable)
            } else {
                Ok(StabiliseOutcome::InProgress)
            }
        }

        async fn destroy(&self, _resource_id: ElementId, _resolved_spec: &MappingNode) -> Result<()> {
            Ok(())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter_fraction: 0.0,
        }
    }

    fn fast_stabilisation() -> StabilisationPolicy {
        StabilisationPolicy {
            polling_interval: Duration::from_millis(1),
            polling_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn deploys_and_stabilises_on_first_try() {
        let provider = FlakyProvider {
            fail_until_attempt: 1,
            calls: AtomicU32::new(0),
            stabilise_polls: Mutex::new(0),
        };
        let outcome = deploy_resource(
            None,
            &MappingNode::Null,
            &provider,
            fast_policy(),
            fast_stabilisation(),
            None,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ResourceDeployOutcome::Deployed { .. }));
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let provider = FlakyProvider {
            fail_until_attempt: 3,
            calls: AtomicU32::new(0),
            stabilise_polls: Mutex::new(0),
        };
        let outcome = deploy_resource(
            None,
            &MappingNode::Null,
            &provider,
            fast_policy(),
            fast_stabilisation(),
            None,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, ResourceDeployOutcome::Deployed { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_yields_failed_outcome() {
        let provider = FlakyProvider {
            fail_until_attempt: 100,
            calls: AtomicU32::new(0),
            stabilise_polls: Mutex::new(0),
        };
        let policy = RetryPolicy { max_attempts: 2, ..fast_policy() };
        let outcome = deploy_resource(None, &MappingNode::Null, &provider, policy, fast_stabilisation(), None)
            .await
            .unwrap();
        assert!(matches!(outcome, ResourceDeployOutcome::Failed { .. }));
    }

    struct TerminalFailProvider;

    #[async_trait]
    impl ResourceProvider for TerminalFailProvider {
        fn resource_type(&self) -> &str {
            "test/terminal"
        }

        async fn stage_changes(
            &self,
            _current: Option<&MappingNode>,
            _resolved: &MappingNode,
        ) -> Result<ResourceProviderChanges> {
            Ok(ResourceProviderChanges::default())
        }

        async fn deploy(&self, _resource_id: Option<ElementId>, _resolved_spec: &MappingNode) -> Result<DeployOutput> {
            Err(Error::ResourceDeployError {
                reasons: vec!["quota exceeded".to_string()],
            })
        }

        async fn stabilise(&self, _resource_id: ElementId, _resolved_spec: &MappingNode) -> Result<StabiliseOutcome> {
            unreachable!("deploy failed terminally before stabilisation")
        }

        async fn destroy(&self, _resource_id: ElementId, _resolved_spec: &MappingNode) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn non_retryable_deploy_error_surfaces_provider_reasons() {
        let outcome = deploy_resource(
            None,
            &MappingNode::Null,
            &TerminalFailProvider,
            fast_policy(),
            fast_stabilisation(),
            None,
        )
        .await
        .unwrap();
        match outcome {
            ResourceDeployOutcome::Failed { reasons, .. } => {
                assert_eq!(reasons, vec!["quota exceeded".to_string()]);
            }
            _ => panic!("expected Failed outcome"),
        }
    }
}
