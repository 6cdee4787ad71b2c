use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::core::error::{WorkflowError, WorkflowResult};

use super::aggregate::{ReplaySource, SseChunkSource, consume};
use super::mock;
use super::outputs::{MARKET_SENTIMENT_INIT, looks_like_sentiment_result};
use super::poll::{JobSnapshot, JobTracker, PollOptions, start_and_poll};
use super::{JobStatus, StreamChunk};

/// Client-side abort budget for one blocking invoke. Workflows can run 110+
/// seconds, so three minutes.
const INVOKE_BUDGET: Duration = Duration::from_secs(180);
/// Budget for a full streaming invoke.
const STREAM_BUDGET: Duration = Duration::from_secs(300);
/// Budget for starting a background job. The start endpoint answers as soon
/// as the job is recorded; it never waits on the workflow itself.
const START_BUDGET: Duration = Duration::from_secs(30);
/// Budget for one status check of a background job.
const STATUS_BUDGET: Duration = Duration::from_secs(10);

/// Endpoint configuration for the dashboard-facing client. A pure config
/// object; transport policy lives in [`WorkflowClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub execute_url: String,
    pub start_url: String,
    pub status_url: String,
    pub use_mock: bool,
    pub poll: PollOptions,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            execute_url: format!("{base}/api/workflows/execute"),
            start_url: format!("{base}/api/workflows/start"),
            status_url: format!("{base}/api/workflows/status"),
            use_mock: false,
            poll: PollOptions::default(),
        }
    }

    pub fn mock_only() -> Self {
        let mut config = Self::new("http://127.0.0.1:3000");
        config.use_mock = true;
        config
    }
}

/// Public entry point for UI-layer callers. Chooses the transport strategy
/// (direct call, start+poll, or stream), applies timeouts, and falls back to
/// mock data only where policy allows — never on a timeout, because the job
/// may still be completing server-side and fabricated data would mislead.
pub struct WorkflowClient {
    http: Client,
    config: ClientConfig,
    init_cache: SentimentInitCache,
}

impl WorkflowClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            init_cache: SentimentInitCache::new(),
        }
    }

    pub fn set_use_mock(&mut self, flag: bool) {
        self.config.use_mock = flag;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Direct blocking call. A 504 from the relay means the workflow may
    /// still be running, so it surfaces as timeout-class; all failures
    /// propagate — the generic invoke never substitutes mock data.
    pub async fn invoke(&self, workflow: &str, payload: Option<&Value>) -> WorkflowResult<Value> {
        let workflow = non_empty_name(workflow)?;
        if self.config.use_mock {
            return mock::invoke(workflow, payload);
        }

        let response = self
            .http
            .post(&self.config.execute_url)
            .timeout(INVOKE_BUDGET)
            .json(&json!({ "workflow": workflow, "payload": payload }))
            .send()
            .await
            .map_err(|err| WorkflowError::from_reqwest(workflow, err))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::GATEWAY_TIMEOUT {
                return Err(WorkflowError::Timeout {
                    workflow: workflow.to_string(),
                });
            }
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowError::upstream(status.as_u16(), body));
        }
        response
            .json()
            .await
            .map_err(|err| WorkflowError::Transport(err.to_string()))
    }

    /// Start the workflow as a background job and poll it to completion,
    /// avoiding one long-held connection.
    pub async fn invoke_with_polling(
        &self,
        workflow: &str,
        payload: Option<&Value>,
    ) -> WorkflowResult<Value> {
        let workflow = non_empty_name(workflow)?;
        if self.config.use_mock {
            return mock::invoke(workflow, payload);
        }
        let tracker = HttpJobTracker {
            http: &self.http,
            start_url: &self.config.start_url,
            status_url: &self.config.status_url,
        };
        start_and_poll(&tracker, workflow, payload, self.config.poll).await
    }

    /// Streaming call: every chunk is handed to `on_chunk` as it arrives and
    /// the accumulated result is returned when the stream ends. Mock mode
    /// replays the chunk sequence a live stream would produce.
    pub async fn invoke_stream<F>(
        &self,
        workflow: &str,
        payload: Option<&Value>,
        on_chunk: F,
    ) -> WorkflowResult<Value>
    where
        F: FnMut(&StreamChunk),
    {
        let workflow = non_empty_name(workflow)?;
        if self.config.use_mock {
            let full = mock::invoke(workflow, payload)?;
            let mut source = ReplaySource::from_result(&full);
            return consume(&mut source, on_chunk).await;
        }

        let response = self
            .http
            .post(&self.config.execute_url)
            .timeout(STREAM_BUDGET)
            .json(&json!({ "workflow": workflow, "payload": payload, "stream": true }))
            .send()
            .await
            .map_err(|err| WorkflowError::from_reqwest(workflow, err))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::GATEWAY_TIMEOUT {
                return Err(WorkflowError::Timeout {
                    workflow: workflow.to_string(),
                });
            }
            let body = response.text().await.unwrap_or_default();
            return Err(WorkflowError::upstream(status.as_u16(), body));
        }

        let mut source = SseChunkSource::new(workflow, response);
        consume(&mut source, on_chunk).await
    }

    /// Single-flight idempotent fetch of the market-sentiment init result.
    ///
    /// A cached result returns immediately. Concurrent callers share one
    /// in-flight attempt. A successful result is validated and cached; a
    /// timeout-class failure propagates uncached so a later caller can
    /// retry; any other failure resolves to mock data and caches it.
    pub async fn get_or_init(&self) -> WorkflowResult<Value> {
        let http = self.http.clone();
        let config = self.config.clone();
        self.init_cache
            .run(move || sentiment_init_attempt(http, config))
            .await
    }

    pub fn reset_init_cache(&self) {
        self.init_cache.reset();
    }
}

fn non_empty_name(workflow: &str) -> WorkflowResult<&str> {
    let trimmed = workflow.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Config(
            "workflow name must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// The upstream attempt behind `get_or_init`, including the fallback policy.
async fn sentiment_init_attempt(http: Client, config: ClientConfig) -> WorkflowResult<Value> {
    let outcome = if config.use_mock {
        mock::invoke(MARKET_SENTIMENT_INIT, None)
    } else {
        let tracker = HttpJobTracker {
            http: &http,
            start_url: &config.start_url,
            status_url: &config.status_url,
        };
        start_and_poll(&tracker, MARKET_SENTIMENT_INIT, None, config.poll)
            .await
            .and_then(validate_sentiment_result)
    };

    match outcome {
        Ok(data) => Ok(data),
        Err(err) if err.is_timeout() => {
            // The workflow may still be running; surfacing fabricated data
            // here would be misleading. Let the caller offer a retry.
            error!("market sentiment init timed out: {err}");
            Err(err)
        }
        Err(err) => {
            warn!("market sentiment init failed, falling back to mock data: {err}");
            mock::invoke(MARKET_SENTIMENT_INIT, None)
        }
    }
}

/// The init result must be a non-empty object; an object without any known
/// sentiment field and no other keys reads as an empty run.
fn validate_sentiment_result(data: Value) -> WorkflowResult<Value> {
    let Some(fields) = data.as_object() else {
        return Err(WorkflowError::upstream(None, "返回数据格式错误"));
    };
    if !looks_like_sentiment_result(&data) && fields.is_empty() {
        return Err(WorkflowError::upstream(None, "返回数据为空"));
    }
    Ok(data)
}

type SharedAttempt = Shared<BoxFuture<'static, WorkflowResult<Value>>>;

/// Cache plus in-flight handle for one idempotency key (the market-sentiment
/// init lookup). An explicit object rather than process globals so tests can
/// run independent instances.
#[derive(Default)]
pub struct SentimentInitCache {
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    cached: Option<Value>,
    inflight: Option<SharedAttempt>,
}

impl SentimentInitCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Value> {
        self.lock().cached.clone()
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.cached = None;
        state.inflight = None;
    }

    /// Return the cached value, join the in-flight attempt, or start a new
    /// one. However the attempt ends, its in-flight handle is cleared, so no
    /// future caller is ever blocked by a finished attempt.
    pub async fn run<F, Fut>(&self, make_attempt: F) -> WorkflowResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WorkflowResult<Value>> + Send + 'static,
    {
        let attempt = {
            let mut state = self.lock();
            if let Some(cached) = &state.cached {
                return Ok(cached.clone());
            }
            match &state.inflight {
                Some(inflight) => inflight.clone(),
                None => {
                    let attempt: SharedAttempt = make_attempt().boxed().shared();
                    state.inflight = Some(attempt.clone());
                    attempt
                }
            }
        };

        let outcome = attempt.clone().await;

        let mut state = self.lock();
        // Only the attempt we awaited may be cleared; a newer attempt
        // started after a failure must not be disturbed.
        if state.inflight.as_ref().is_some_and(|f| f.ptr_eq(&attempt)) {
            state.inflight = None;
        }
        if let Ok(value) = &outcome
            && state.cached.is_none()
        {
            state.cached = Some(value.clone());
        }
        outcome
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Job tracking over the relay's start/status endpoints.
struct HttpJobTracker<'a> {
    http: &'a Client,
    start_url: &'a str,
    status_url: &'a str,
}

#[async_trait]
impl JobTracker for HttpJobTracker<'_> {
    async fn start_job(&self, workflow: &str, payload: Option<&Value>) -> WorkflowResult<String> {
        let response = self
            .http
            .post(self.start_url)
            .timeout(START_BUDGET)
            .json(&json!({ "workflow": workflow, "payload": payload }))
            .send()
            .await
            .map_err(|err| WorkflowError::Start(err.to_string()))?;

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WorkflowError::Start(if message.is_empty() {
                "启动工作流失败".to_string()
            } else {
                message
            }));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| WorkflowError::Start(err.to_string()))?;
        body.get("jobId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WorkflowError::Start("启动工作流失败：缺少 jobId".to_string()))
    }

    async fn job_status(&self, job_id: &str) -> WorkflowResult<JobSnapshot> {
        let url = format!("{}/{}", self.status_url, job_id);
        let response = self
            .http
            .get(&url)
            .timeout(STATUS_BUDGET)
            .send()
            .await
            .map_err(|err| WorkflowError::Transport(err.to_string()))?;

        // Non-success here includes 404/400/409 from a status endpoint that
        // has not seen the job yet; the polling loop reads any status-check
        // failure as still pending.
        if !response.status().is_success() {
            return Err(WorkflowError::Transport(format!(
                "status check failed: {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| WorkflowError::Transport(err.to_string()))?;
        let status = body
            .get("status")
            .cloned()
            .and_then(|v| serde_json::from_value::<JobStatus>(v).ok())
            .unwrap_or(JobStatus::Pending);
        Ok(JobSnapshot {
            status,
            result: body.get("result").cloned(),
            error: body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}
