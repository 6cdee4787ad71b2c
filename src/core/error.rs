use thiserror::Error;

/// Failure classes for workflow invocation.
///
/// `Clone` so one failed attempt can be fanned out to every caller joined to
/// a shared in-flight request. The timeout discriminant matters: a timed-out
/// workflow may still be running upstream, so callers must never substitute
/// mock data for it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// A required credential or endpoint is missing. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// No response within the wall-clock budget, or the upstream answered
    /// with a gateway-timeout status. The job may still be running.
    #[error("workflow {workflow} timed out; it may still be running upstream")]
    Timeout { workflow: String },

    /// The upstream explicitly reported failure: a bad status, an error
    /// frame in a stream, or a job that ended in the failed state.
    #[error("upstream failure{}: {message}", status_suffix(.status))]
    Upstream { status: Option<u16>, message: String },

    /// Starting a background job failed before any polling began.
    #[error("failed to start workflow: {0}")]
    Start(String),

    /// A transport-level failure that is neither a timeout nor an explicit
    /// upstream verdict (connection refused, malformed body, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

impl WorkflowError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkflowError::Timeout { .. })
    }

    pub fn upstream(status: impl Into<Option<u16>>, message: impl Into<String>) -> Self {
        WorkflowError::Upstream {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Classify a reqwest failure: deadline expiry is timeout-class,
    /// everything else is transport-class.
    pub fn from_reqwest(workflow: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WorkflowError::Timeout {
                workflow: workflow.to_string(),
            }
        } else {
            WorkflowError::Transport(err.to_string())
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
