//! Bounded polling for submit-then-poll job APIs.
//!
//! A job moves `Submitting -> Polling -> {Succeeded, Failed, Canceled,
//! TimedOut}`. The driver below owns the `Polling` part: it asks the provider
//! for the job's status at a fixed interval (waiting one interval before
//! every check, including the first), stops on the first terminal
//! status, and gives up after a hard attempt cap. Sleeping goes through
//! [`Sleeper`] so tests can run the loop without waiting.

use crate::error::ProviderFailure;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Lifecycle of a remote job as seen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Submitting,
    Polling { attempt: u32 },
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

/// What a single status check reported.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus<T> {
    Pending,
    Succeeded(T),
    Failed(String),
    Canceled,
}

/// Polls until the job reaches a terminal status or the attempt cap runs out.
///
/// `check` receives the 1-based attempt number. An error from `check` aborts
/// the loop immediately; transport problems are not retried here.
pub async fn poll_until_terminal<T, F, Fut>(
    job_id: &str,
    policy: PollPolicy,
    sleeper: &dyn Sleeper,
    mut check: F,
) -> Result<T, ProviderFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<JobStatus<T>, ProviderFailure>>,
{
    for attempt in 1..=policy.max_attempts {
        sleeper.sleep(policy.interval).await;

        let status = check(attempt).await?;
        let phase = match &status {
            JobStatus::Pending => JobPhase::Polling { attempt },
            JobStatus::Succeeded(_) => JobPhase::Succeeded,
            JobStatus::Failed(_) => JobPhase::Failed,
            JobStatus::Canceled => JobPhase::Canceled,
        };
        tracing::debug!(job_id, ?phase, "poll {}/{}", attempt, policy.max_attempts);

        match status {
            JobStatus::Pending => {}
            JobStatus::Succeeded(output) => {
                tracing::info!("Job {} succeeded after {} polls", job_id, attempt);
                return Ok(output);
            }
            JobStatus::Failed(reason) => {
                tracing::warn!("Job {} failed on poll {}: {}", job_id, attempt, reason);
                return Err(ProviderFailure::JobFailed {
                    id: job_id.to_string(),
                    reason,
                });
            }
            JobStatus::Canceled => {
                tracing::warn!("Job {} was canceled on poll {}", job_id, attempt);
                return Err(ProviderFailure::JobCanceled {
                    id: job_id.to_string(),
                });
            }
        }
    }

    tracing::warn!(
        job_id,
        phase = ?JobPhase::TimedOut,
        "Job still pending after {} polls, giving up",
        policy.max_attempts
    );
    Err(ProviderFailure::PollTimedOut {
        id: job_id.to_string(),
        attempts: policy.max_attempts,
    })
}
