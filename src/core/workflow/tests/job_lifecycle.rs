use serde_json::json;

use crate::core::workflow::{JobStatus, JobStore, can_transition};

#[test]
fn lifecycle_happy_path_transitions_are_allowed() {
    assert!(can_transition(JobStatus::Pending, JobStatus::Running));
    assert!(can_transition(JobStatus::Running, JobStatus::Succeeded));
    assert!(can_transition(JobStatus::Running, JobStatus::Failed));
}

#[test]
fn terminal_states_absorb_everything() {
    // Including their own state: a repeated terminal write is rejected too.
    for terminal in [JobStatus::Succeeded, JobStatus::Failed] {
        for to in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
            JobStatus::Failed,
        ] {
            assert!(
                !can_transition(terminal, to),
                "expected {:?} -> {:?} to be rejected",
                terminal,
                to
            );
        }
    }
}

#[test]
fn lifecycle_never_runs_backwards() {
    assert!(!can_transition(JobStatus::Running, JobStatus::Pending));
}

#[test]
fn job_ids_are_monotonic_and_never_reused() {
    let store = JobStore::new();
    let first = store.create_job("wf", json!({}));
    let second = store.create_job("wf", json!({}));
    assert_ne!(first.id, second.id);
    assert!(second.id.parse::<u64>().unwrap() > first.id.parse::<u64>().unwrap());
}

#[test]
fn created_jobs_start_pending_with_no_outcome() {
    let store = JobStore::new();
    let job = store.create_job("市场情绪分析初始化", json!({}));
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.result.is_none());
    assert!(job.error.is_none());
    assert!(job.started_at > 0);
}

#[test]
fn transitions_are_forward_only_in_the_store() {
    let store = JobStore::new();
    let job = store.create_job("wf", json!({}));

    store.transition(&job.id, JobStatus::Running, None, None);
    store.transition(&job.id, JobStatus::Succeeded, Some(json!({ "x": 1 })), None);
    // A late failure report must not overwrite the terminal result.
    store.transition(&job.id, JobStatus::Failed, None, Some("late".to_string()));

    let stored = store.get_job(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.result, Some(json!({ "x": 1 })));
    assert!(stored.error.is_none());
}

#[test]
fn repeated_terminal_writes_never_clear_the_outcome() {
    let store = JobStore::new();
    let job = store.create_job("wf", json!({}));

    store.transition(&job.id, JobStatus::Succeeded, Some(json!({ "x": 1 })), None);
    // A duplicate success report without a result must not erase the first.
    store.transition(&job.id, JobStatus::Succeeded, None, None);

    let stored = store.get_job(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Succeeded);
    assert_eq!(stored.result, Some(json!({ "x": 1 })));
}

#[test]
fn result_and_error_stay_mutually_exclusive() {
    let store = JobStore::new();
    let job = store.create_job("wf", json!({}));
    store.transition(&job.id, JobStatus::Failed, Some(json!({ "x": 1 })), Some("boom".to_string()));

    let stored = store.get_job(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert!(stored.result.is_none());
    assert_eq!(stored.error.as_deref(), Some("boom"));
}

#[test]
fn unknown_job_reads_as_absent() {
    let store = JobStore::new();
    assert!(store.get_job("999").is_none());
}
