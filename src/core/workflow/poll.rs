use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::core::error::{WorkflowError, WorkflowResult};

use super::JobStatus;

/// One observation of a tracked job.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Starts jobs and reports their status. Implemented over HTTP against the
/// relay's start/status endpoints; tests substitute scripted trackers.
#[async_trait]
pub trait JobTracker: Send + Sync {
    async fn start_job(&self, workflow: &str, payload: Option<&Value>) -> WorkflowResult<String>;
    async fn job_status(&self, job_id: &str) -> WorkflowResult<JobSnapshot>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Initial gap between status checks.
    pub interval: Duration,
    /// Overall wall-clock ceiling for the whole start-and-poll call.
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(15 * 60),
        }
    }
}

pub(crate) const BACKOFF_FACTOR: f64 = 1.4;
pub(crate) const BACKOFF_CEILING: Duration = Duration::from_secs(8);

/// Gap until the next status check: non-decreasing, capped growth so a
/// long-running job is not hammered but a fast one is noticed early.
pub(crate) fn next_backoff(current: Duration) -> Duration {
    BACKOFF_CEILING.min(current.mul_f64(BACKOFF_FACTOR))
}

/// Start a job and poll it to a terminal state.
///
/// A failed start is fatal and not retried. A failed status *check* is not:
/// brief network or infra flakiness must not abandon an otherwise healthy
/// job, so check failures read as "still pending". Only a definitive failed
/// status, or the overall deadline, ends polling with an error. Each status
/// check is clamped to the time left before the deadline, so a check that
/// never answers cannot stall the loop past `max_wait`.
pub async fn start_and_poll(
    tracker: &dyn JobTracker,
    workflow: &str,
    payload: Option<&Value>,
    opts: PollOptions,
) -> WorkflowResult<Value> {
    let job_id = tracker.start_job(workflow, payload).await?;
    debug!("polling job {job_id} for workflow {workflow}");

    let started = Instant::now();
    let mut wait = opts.interval;
    loop {
        let remaining = opts.max_wait.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(WorkflowError::Timeout {
                workflow: workflow.to_string(),
            });
        }
        let Ok(observation) = tokio::time::timeout(remaining, tracker.job_status(&job_id)).await
        else {
            return Err(WorkflowError::Timeout {
                workflow: workflow.to_string(),
            });
        };
        match observation {
            Ok(snapshot) => match snapshot.status {
                JobStatus::Succeeded => {
                    return Ok(snapshot
                        .result
                        .unwrap_or_else(|| Value::Object(Default::default())));
                }
                JobStatus::Failed => {
                    return Err(WorkflowError::upstream(
                        None,
                        snapshot
                            .error
                            .unwrap_or_else(|| "workflow execution failed".to_string()),
                    ));
                }
                JobStatus::Pending | JobStatus::Running => {}
            },
            Err(err) => {
                debug!("status check for job {job_id} failed, treating as pending: {err}");
            }
        }

        if started.elapsed() > opts.max_wait {
            return Err(WorkflowError::Timeout {
                workflow: workflow.to_string(),
            });
        }
        tokio::time::sleep(wait).await;
        wait = next_backoff(wait);
    }
}
