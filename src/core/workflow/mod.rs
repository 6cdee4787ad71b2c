pub mod aggregate;
pub mod client;
pub mod gateway;
pub mod jobs;
pub mod mock;
pub mod outputs;
pub mod poll;
pub mod sse;

pub use aggregate::{ChunkSource, ReplaySource, SseChunkSource, consume};
pub use client::{ClientConfig, SentimentInitCache, WorkflowClient};
pub use gateway::WorkflowGateway;
pub use jobs::JobStore;
pub use poll::{JobSnapshot, JobTracker, PollOptions, start_and_poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a tracked workflow invocation. Progression is forward-only:
/// pending -> running -> succeeded | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Terminal states accept nothing, not even a repeat of themselves: a
/// repeated terminal write would overwrite the stored outcome.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    match from {
        JobStatus::Pending => true,
        JobStatus::Running => !matches!(to, JobStatus::Pending),
        JobStatus::Succeeded | JobStatus::Failed => false,
    }
}

/// One tracked invocation of a workflow in start/poll mode.
///
/// `result` and `error` are mutually exclusive and both absent while the job
/// is non-terminal. Only the background execution task that owns the job may
/// move its status, and only forward.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowJob {
    pub id: String,
    pub status: JobStatus,
    pub workflow: String,
    pub inputs: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Unix milliseconds at creation, for staleness inspection.
    pub started_at: u64,
}

/// One decoded unit of a workflow response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Partial payload for one named field of the eventual result. A later
    /// chunk for the same field supersedes an earlier one.
    Field { name: String, data: Value },
    /// The full result in one piece; ends the stream.
    Complete { data: Value },
    /// The upstream reported failure; the call as a whole fails.
    Error { message: String },
}

impl StreamChunk {
    /// Decode the `{type, data}` / `{type:"complete"}` / `{type:"error"}`
    /// wire shapes. Frames without a usable tag are dropped.
    pub fn from_frame(frame: &Value) -> Option<StreamChunk> {
        let kind = frame.get("type").and_then(Value::as_str)?;
        match kind {
            "error" => Some(StreamChunk::Error {
                message: frame
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("workflow stream error")
                    .to_string(),
            }),
            "complete" => Some(StreamChunk::Complete {
                data: frame
                    .get("data")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            }),
            _ => frame.get("data").map(|data| StreamChunk::Field {
                name: kind.to_string(),
                data: data.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests;
