use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::core::error::{WorkflowError, WorkflowResult};
use crate::core::workflow::JobStatus;
use crate::core::workflow::poll::{
    BACKOFF_CEILING, JobSnapshot, JobTracker, PollOptions, next_backoff, start_and_poll,
};

#[test]
fn backoff_is_non_decreasing_and_capped() {
    let mut wait = Duration::from_secs(2);
    for _ in 0..20 {
        let next = next_backoff(wait);
        assert!(next >= wait);
        assert!(next <= BACKOFF_CEILING);
        wait = next;
    }
    assert_eq!(wait, BACKOFF_CEILING);
}

#[test]
fn backoff_grows_by_the_fixed_factor_below_the_ceiling() {
    assert_eq!(next_backoff(Duration::from_secs(2)), Duration::from_millis(2800));
    assert_eq!(next_backoff(Duration::from_millis(2800)), Duration::from_millis(3920));
}

/// Tracker that plays back a fixed sequence of status observations.
struct ScriptedTracker {
    starts: AtomicUsize,
    checks: AtomicUsize,
    script: Mutex<Vec<WorkflowResult<JobSnapshot>>>,
}

impl ScriptedTracker {
    fn new(script: Vec<WorkflowResult<JobSnapshot>>) -> Self {
        let mut script = script;
        script.reverse();
        Self {
            starts: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
            script: Mutex::new(script),
        }
    }

    fn pending() -> WorkflowResult<JobSnapshot> {
        Ok(JobSnapshot {
            status: JobStatus::Pending,
            result: None,
            error: None,
        })
    }

    fn succeeded(result: Value) -> WorkflowResult<JobSnapshot> {
        Ok(JobSnapshot {
            status: JobStatus::Succeeded,
            result: Some(result),
            error: None,
        })
    }

    fn failed(error: &str) -> WorkflowResult<JobSnapshot> {
        Ok(JobSnapshot {
            status: JobStatus::Failed,
            result: None,
            error: Some(error.to_string()),
        })
    }
}

#[async_trait]
impl JobTracker for ScriptedTracker {
    async fn start_job(&self, _workflow: &str, _payload: Option<&Value>) -> WorkflowResult<String> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok("1".to_string())
    }

    async fn job_status(&self, _job_id: &str) -> WorkflowResult<JobSnapshot> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(ScriptedTracker::pending)
    }
}

fn fast_opts() -> PollOptions {
    PollOptions {
        interval: Duration::from_millis(1),
        max_wait: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn polls_until_success_with_exactly_one_check_per_observation() {
    let tracker = ScriptedTracker::new(vec![
        ScriptedTracker::pending(),
        ScriptedTracker::pending(),
        ScriptedTracker::succeeded(json!({ "x": 1 })),
    ]);

    let result = start_and_poll(&tracker, "wf", None, fast_opts()).await.unwrap();
    assert_eq!(result, json!({ "x": 1 }));
    assert_eq!(tracker.starts.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.checks.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failed_status_surfaces_the_stored_error() {
    let tracker = ScriptedTracker::new(vec![ScriptedTracker::failed("引擎内部错误")]);

    let err = start_and_poll(&tracker, "wf", None, fast_opts()).await.unwrap_err();
    match err {
        WorkflowError::Upstream { message, .. } => assert_eq!(message, "引擎内部错误"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn transient_check_failures_read_as_pending() {
    let tracker = ScriptedTracker::new(vec![
        Err(WorkflowError::Transport("connection reset".to_string())),
        Err(WorkflowError::Transport("connection reset".to_string())),
        ScriptedTracker::succeeded(json!({ "ok": true })),
    ]);

    let result = start_and_poll(&tracker, "wf", None, fast_opts()).await.unwrap();
    assert_eq!(result, json!({ "ok": true }));
}

#[tokio::test]
async fn success_without_a_result_yields_an_empty_object() {
    let tracker = ScriptedTracker::new(vec![Ok(JobSnapshot {
        status: JobStatus::Succeeded,
        result: None,
        error: None,
    })]);

    let result = start_and_poll(&tracker, "wf", None, fast_opts()).await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn deadline_overrun_is_a_timeout() {
    // Never terminal, so the deadline must end it.
    let tracker = ScriptedTracker::new(vec![]);
    let opts = PollOptions {
        interval: Duration::from_millis(1),
        max_wait: Duration::from_millis(20),
    };

    let err = start_and_poll(&tracker, "市场情绪分析初始化", None, opts)
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    match err {
        WorkflowError::Timeout { workflow } => assert_eq!(workflow, "市场情绪分析初始化"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn hung_status_check_cannot_outlive_the_deadline() {
    struct HangingStatus;

    #[async_trait]
    impl JobTracker for HangingStatus {
        async fn start_job(
            &self,
            _workflow: &str,
            _payload: Option<&Value>,
        ) -> WorkflowResult<String> {
            Ok("1".to_string())
        }

        async fn job_status(&self, _job_id: &str) -> WorkflowResult<JobSnapshot> {
            std::future::pending().await
        }
    }

    let opts = PollOptions {
        interval: Duration::from_millis(1),
        max_wait: Duration::from_millis(50),
    };

    // The deadline must cut the in-flight check itself, not just gate the
    // next iteration.
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        start_and_poll(&HangingStatus, "wf", None, opts),
    )
    .await
    .expect("poller must give up on its own")
    .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn a_failed_start_is_fatal_and_never_polled() {
    struct BrokenStart;

    #[async_trait]
    impl JobTracker for BrokenStart {
        async fn start_job(
            &self,
            _workflow: &str,
            _payload: Option<&Value>,
        ) -> WorkflowResult<String> {
            Err(WorkflowError::Start("启动工作流失败".to_string()))
        }

        async fn job_status(&self, _job_id: &str) -> WorkflowResult<JobSnapshot> {
            panic!("status must not be checked after a failed start");
        }
    }

    let err = start_and_poll(&BrokenStart, "wf", None, fast_opts()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Start(_)));
}
