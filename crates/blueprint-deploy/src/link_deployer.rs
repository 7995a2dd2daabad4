//! Link Deployer: drives a link through its three-stage update state
//! machine once both endpoint resources are in a deployable state (spec
//! §4.9) — resource A's side, then resource B's side, then the
//! intermediary resources the link introduces. Each stage retries
//! independently and captures its own attempt durations.

use std::future::Future;
use std::time::{Duration, Instant};

use blueprint_core::id::ElementId;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::LinkProvider;
use blueprint_core::retry::RetryPolicy;
use blueprint_core::state::OperationDurations;
use blueprint_core::status::LinkPreciseStatus;
use blueprint_core::{Error, Result};

use crate::jitter::next_jitter_seed;

#[derive(Debug, Clone)]
pub struct LinkDeployProgress {
    pub precise_status: LinkPreciseStatus,
    pub attempt: u32,
    pub failure_reason: Option<String>,
}

pub type LinkDeployProgressSender = tokio::sync::mpsc::UnboundedSender<LinkDeployProgress>;

/// Attempt durations captured separately per stage (spec §4.9).
#[derive(Debug, Clone, Default)]
pub struct LinkStageDurations {
    pub resource_a: OperationDurations,
    pub resource_b: OperationDurations,
    pub intermediaries: OperationDurations,
}

#[derive(Debug, Clone)]
pub enum LinkDeployOutcome {
    Deployed {
        durations: LinkStageDurations,
    },
    Failed {
        stage: LinkPreciseStatus,
        reasons: Vec<String>,
        durations: LinkStageDurations,
    },
}

enum StageOutcome {
    Succeeded(OperationDurations),
    /// A terminal failure with reasons already settled (e.g. retries
    /// exhausted), no further translation needed.
    FailedReasons {
        reasons: Vec<String>,
        durations: OperationDurations,
    },
    /// A terminal, non-retryable provider error that the caller must decide
    /// how to translate (stage A/B get a plugin-supplied translation; the
    /// intermediaries stage has no such hook and falls back to the
    /// provider's reported reasons, or propagates fatally).
    FailedRaw {
        error: Error,
        durations: OperationDurations,
    },
}

async fn run_stage_retry<F, Fut>(
    status: LinkPreciseStatus,
    policy: RetryPolicy,
    progress: Option<&LinkDeployProgressSender>,
    mut call: F,
) -> StageOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let started = Instant::now();
    let mut durations = OperationDurations::default();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let attempt_started = Instant::now();
        emit(progress, status, attempt, None);

        match call().await {
            Ok(()) => {
                durations.attempt_durations.push(attempt_started.elapsed());
                durations.total = started.elapsed();
                return StageOutcome::Succeeded(durations);
            }
            Err(err) if err.is_retryable() => {
                durations.attempt_durations.push(attempt_started.elapsed());
                if !policy.should_retry(attempt) {
                    durations.total = started.elapsed();
                    return StageOutcome::FailedReasons {
                        reasons: vec![format!(
                            "exceeded max retries ({}) updating link: {err}",
                            policy.max_attempts
                        )],
                        durations,
                    };
                }
                emit(progress, status, attempt, Some(err.to_string()));
                let wait_ms = policy.calculate_retry_wait_time_ms(attempt, next_jitter_seed());
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
            Err(err) => {
                durations.attempt_durations.push(attempt_started.elapsed());
                durations.total = started.elapsed();
                return StageOutcome::FailedRaw { error: err, durations };
            }
        }
    }
}

fn emit(
    progress: Option<&LinkDeployProgressSender>,
    status: LinkPreciseStatus,
    attempt: u32,
    failure_reason: Option<String>,
) {
    if let Some(sender) = progress {
        let _ = sender.send(LinkDeployProgress {
            precise_status: status,
            attempt,
            failure_reason,
        });
    }
}

/// Runs the Link Deployer state machine to completion for one link.
pub async fn deploy_link(
    resource_a_id: ElementId,
    resource_b_id: ElementId,
    link_data: &MappingNode,
    provider: &dyn LinkProvider,
    policy: RetryPolicy,
    progress: Option<&LinkDeployProgressSender>,
) -> Result<LinkDeployOutcome> {
    let mut durations = LinkStageDurations::default();

    match run_stage_retry(LinkPreciseStatus::UpdatingResourceA, policy, progress, || {
        provider.update_resource_a(resource_a_id, link_data)
    })
    .await
    {
        StageOutcome::Succeeded(d) => durations.resource_a = d,
        StageOutcome::FailedReasons { reasons, durations: d } => {
            durations.resource_a = d;
            return Ok(LinkDeployOutcome::Failed {
                stage: LinkPreciseStatus::UpdatingResourceA,
                reasons,
                durations,
            });
        }
        StageOutcome::FailedRaw { error, durations: d } => {
            durations.resource_a = d;
            return Ok(LinkDeployOutcome::Failed {
                stage: LinkPreciseStatus::UpdatingResourceA,
                reasons: vec![provider.handle_resource_type_a_error(&error)],
                durations,
            });
        }
    }

    match run_stage_retry(LinkPreciseStatus::UpdatingResourceB, policy, progress, || {
        provider.update_resource_b(resource_b_id, link_data)
    })
    .await
    {
        StageOutcome::Succeeded(d) => durations.resource_b = d,
        StageOutcome::FailedReasons { reasons, durations: d } => {
            durations.resource_b = d;
            return Ok(LinkDeployOutcome::Failed {
                stage: LinkPreciseStatus::UpdatingResourceB,
                reasons,
                durations,
            });
        }
        StageOutcome::FailedRaw { error, durations: d } => {
            durations.resource_b = d;
            return Ok(LinkDeployOutcome::Failed {
                stage: LinkPreciseStatus::UpdatingResourceB,
                reasons: vec![provider.handle_resource_type_b_error(&error)],
                durations,
            });
        }
    }

    match run_stage_retry(LinkPreciseStatus::UpdatingIntermediaries, policy, progress, || {
        provider.update_intermediaries(link_data)
    })
    .await
    {
        StageOutcome::Succeeded(d) => durations.intermediaries = d,
        StageOutcome::FailedReasons { reasons, durations: d } => {
            durations.intermediaries = d;
            return Ok(LinkDeployOutcome::Failed {
                stage: LinkPreciseStatus::UpdatingIntermediaries,
                reasons,
                durations,
            });
        }
        StageOutcome::FailedRaw { error, durations: d } => {
            durations.intermediaries = d;
            return match error.provider_failure_reasons() {
                Some(reasons) => Ok(LinkDeployOutcome::Failed {
                    stage: LinkPreciseStatus::UpdatingIntermediaries,
                    reasons: reasons.to_vec(),
                    durations,
                }),
                None => Err(error),
            };
        }
    }

    Ok(LinkDeployOutcome::Deployed { durations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blueprint_core::provider::{PriorityResource, ResourceProviderChanges};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingLink {
        fail_a_until: u32,
        a_calls: AtomicU32,
        fail_intermediaries: bool,
    }

    #[async_trait]
    impl LinkProvider for RecordingLink {
        async fn stage_changes(
            &self,
            _current: Option<&MappingNode>,
            _resolved: &MappingNode,
        ) -> Result<ResourceProviderChanges> {
            Ok(ResourceProviderChanges::default())
        }

        async fn get_priority_resource(&self) -> PriorityResource {
            PriorityResource::ResourceA
        }

        fn get_type(&self) -> &str {
            "test/link"
        }

        async fn update_resource_a(&self, _resource_a_id: ElementId, _link_data: &MappingNode) -> Result<()> {
            let call = self.a_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.fail_a_until {
                return Err(Error::Retryable("endpoint not ready".to_string()));
            }
            Ok(())
        }

        async fn update_intermediaries(&self, _link_data: &MappingNode) -> Result<()> {
            if self.fail_intermediaries {
                Err(Error::ResourceDeployError {
                    reasons: vec!["intermediary quota exceeded".to_string()],
                })
            } else {
                Ok(())
            }
        }

        async fn update_resource_b(&self, _resource_b_id: ElementId, _link_data: &MappingNode) -> Result<()> {
            Ok(())
        }

        async fn destroy(
            &self,
            _resource_a_id: ElementId,
            _resource_b_id: ElementId,
            _link_data: &MappingNode,
        ) -> Result<()> {
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

    #[tokio::test]
    async fn deploys_through_all_three_stages() {
        let provider = RecordingLink {
            fail_a_until: 1,
            a_calls: AtomicU32::new(0),
            fail_intermediaries: false,
        };
        let outcome = deploy_link(
            ElementId::new(),
            ElementId::new(),
            &MappingNode::Null,
            &provider,
            fast_policy(),
            None,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, LinkDeployOutcome::Deployed { .. }));
    }

    #[tokio::test]
    async fn retries_resource_a_stage_before_succeeding() {
        let provider = RecordingLink {
            fail_a_until: 3,
            a_calls: AtomicU32::new(0),
            fail_intermediaries: false,
        };
        let outcome = deploy_link(
            ElementId::new(),
            ElementId::new(),
            &MappingNode::Null,
            &provider,
            fast_policy(),
            None,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, LinkDeployOutcome::Deployed { .. }));
        assert_eq!(provider.a_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn intermediaries_failure_reports_stage_and_reasons() {
        let provider = RecordingLink {
            fail_a_until: 1,
            a_calls: AtomicU32::new(0),
            fail_intermediaries: true,
        };
        let outcome = deploy_link(
            ElementId::new(),
            ElementId::new(),
            &MappingNode::Null,
            &provider,
            fast_policy(),
            None,
        )
        .await
        .unwrap();
        match outcome {
            LinkDeployOutcome::Failed { stage, reasons, .. } => {
                assert_eq!(stage, LinkPreciseStatus::UpdatingIntermediaries);
                assert_eq!(reasons, vec!["intermediary quota exceeded".to_string()]);
            }
            _ => panic!("expected Failed outcome"),
        }
    }
}
