use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{error, info, warn};

use super::gateway::WorkflowGateway;
use super::outputs::extract_outputs;
use super::{JobStatus, WorkflowJob, can_transition};

/// In-process store of background workflow jobs. Decouples "start a slow
/// job" from "wait for the result" so front-end requests never hold a
/// connection open for the job's full duration.
///
/// Ids are allocated monotonically and never reused. Records live for the
/// process lifetime; reads always observe the latest committed write.
#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<JobStoreInner>,
}

#[derive(Default)]
struct JobStoreInner {
    jobs: Mutex<HashMap<String, WorkflowJob>>,
    next_id: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and store a new pending job. Pure bookkeeping; scheduling is
    /// [`JobStore::start`]'s concern.
    pub fn create_job(&self, workflow: &str, inputs: Value) -> WorkflowJob {
        let id = (self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let job = WorkflowJob {
            id: id.clone(),
            status: JobStatus::Pending,
            workflow: workflow.to_string(),
            inputs,
            result: None,
            error: None,
            started_at: now_ms(),
        };
        let mut jobs = self.lock();
        jobs.insert(id, job.clone());
        job
    }

    pub fn get_job(&self, id: &str) -> Option<WorkflowJob> {
        self.lock().get(id).cloned()
    }

    /// Create a job and schedule its execution in the background. Returns
    /// the job id synchronously without waiting on the upstream call.
    pub fn start(&self, gateway: Arc<WorkflowGateway>, workflow: String, inputs: Value) -> String {
        let job = self.create_job(&workflow, inputs.clone());
        let id = job.id.clone();
        info!("started background job {id} for workflow {workflow}");

        let store = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            store.transition(&job_id, JobStatus::Running, None, None);
            match gateway.invoke_blocking(&workflow, &inputs).await {
                Ok(raw) => {
                    let outputs = extract_outputs(&raw);
                    store.transition(&job_id, JobStatus::Succeeded, Some(outputs), None);
                }
                Err(err) => {
                    error!("background job {job_id} ({workflow}) failed: {err}");
                    store.transition(&job_id, JobStatus::Failed, None, Some(err.to_string()));
                }
            }
        });
        id
    }

    /// Move a job forward. Writes that would leave a terminal state or run
    /// the lifecycle backwards are dropped.
    pub(crate) fn transition(
        &self,
        id: &str,
        to: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        let mut jobs = self.lock();
        let Some(job) = jobs.get_mut(id) else {
            return;
        };
        if !can_transition(job.status, to) {
            warn!(
                "ignoring invalid transition {:?} -> {:?} for job {id}",
                job.status, to
            );
            return;
        }
        job.status = to;
        job.result = if to == JobStatus::Succeeded { result } else { None };
        job.error = if to == JobStatus::Failed { error } else { None };
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WorkflowJob>> {
        self.inner.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
