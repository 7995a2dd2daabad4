//! Resource and Link Destroyers: tear down a single element, retrying
//! transient provider failures with the same policy semantics as their
//! deploy counterparts (spec §4.8/§4.9 apply symmetrically to destroy).
//! Recursing into a nested child instance's own destroy is an
//! orchestration concern, not a per-element one, and lives in the engine.

use std::time::{Duration, Instant};

use blueprint_core::id::ElementId;
use blueprint_core::mapping::MappingNode;
use blueprint_core::provider::{LinkProvider, ResourceProvider};
use blueprint_core::retry::RetryPolicy;
use blueprint_core::state::OperationDurations;
use blueprint_core::status::{LinkPreciseStatus, ResourcePreciseStatus};
use blueprint_core::Result;

use crate::jitter::next_jitter_seed;

#[derive(Debug, Clone)]
pub enum DestroyOutcome {
    Destroyed { durations: OperationDurations },
    Failed { reasons: Vec<String>, durations: OperationDurations },
}

#[derive(Debug, Clone)]
pub struct DestroyProgress<S> {
    pub precise_status: S,
    pub attempt: u32,
    pub failure_reason: Option<String>,
}

pub type ResourceDestroyProgressSender = tokio::sync::mpsc::UnboundedSender<DestroyProgress<ResourcePreciseStatus>>;
pub type LinkDestroyProgressSender = tokio::sync::mpsc::UnboundedSender<DestroyProgress<LinkPreciseStatus>>;

pub async fn destroy_resource(
    resource_id: ElementId,
    resolved_spec: &MappingNode,
    provider: &dyn ResourceProvider,
    policy: RetryPolicy,
    progress: Option<&ResourceDestroyProgressSender>,
) -> Result<DestroyOutcome> {
    run_destroy_retry(
        policy,
        |attempt, failure_reason| {
            if let Some(sender) = progress {
                let _ = sender.send(DestroyProgress {
                    precise_status: ResourcePreciseStatus::Destroying,
                    attempt,
                    failure_reason,
                });
            }
        },
        || provider.destroy(resource_id, resolved_spec),
    )
    .await
}

pub async fn destroy_link(
    resource_a_id: ElementId,
    resource_b_id: ElementId,
    link_data: &MappingNode,
    provider: &dyn LinkProvider,
    policy: RetryPolicy,
    progress: Option<&LinkDestroyProgressSender>,
) -> Result<DestroyOutcome> {
    run_destroy_retry(
        policy,
        |attempt, failure_reason| {
            if let Some(sender) = progress {
                let _ = sender.send(DestroyProgress {
                    precise_status: LinkPreciseStatus::Destroying,
                    attempt,
                    failure_reason,
                });
            }
        },
        || provider.destroy(resource_a_id, resource_b_id, link_data),
    )
    .await
}

async fn run_destroy_retry<F, Fut, E>(policy: RetryPolicy, mut emit: E, mut call: F) -> Result<DestroyOutcome>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
    E: FnMut(u32, Option<String>),
{
    let started = Instant::now();
    let mut durations = OperationDurations::default();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let attempt_started = Instant::now();
        emit(attempt, None);

        match call().await {
            Ok(()) => {
                durations.attempt_durations.push(attempt_started.elapsed());
                durations.total = started.elapsed();
                return Ok(DestroyOutcome::Destroyed { durations });
            }
            Err(err) if err.is_retryable() => {
                durations.attempt_durations.push(attempt_started.elapsed());
                if !policy.should_retry(attempt) {
                    durations.total = started.elapsed();
                    return Ok(DestroyOutcome::Failed {
                        reasons: vec![format!(
                            "exceeded max retries ({}) destroying element: {err}",
                            policy.max_attempts
                        )],
                        durations,
                    });
                }
                emit(attempt, Some(err.to_string()));
                let wait_ms = policy.calculate_retry_wait_time_ms(attempt, next_jitter_seed());
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            }
            Err(err) => {
                durations.attempt_durations.push(attempt_started.elapsed());
                durations.total = started.elapsed();
                return match err.provider_failure_reasons() {
                    Some(reasons) => Ok(DestroyOutcome::Failed {
                        reasons: reasons.to_vec(),
                        durations,
                    }),
                    None => Err(err),
                };
            }
        }
    }
}
