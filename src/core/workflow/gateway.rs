use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{EngineRoute, Settings};
use crate::core::error::{WorkflowError, WorkflowResult};

use super::sse::{SseEvent, SseFrameDecoder};

/// Wall-clock budget for one engine call. Workflows routinely run 110+
/// seconds, so the budget is generous.
const UPSTREAM_BUDGET: Duration = Duration::from_secs(300);

/// Talks to the external workflow engine. Performs exactly one upstream call
/// per invocation and normalizes the two response encodings: a single JSON
/// document, or an SSE stream of discrete frames.
pub struct WorkflowGateway {
    client: Client,
    user_id: String,
    workflow_route: EngineRoute,
    risk_route: EngineRoute,
    chat_route: EngineRoute,
}

impl WorkflowGateway {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            user_id: settings.user_id.clone(),
            workflow_route: settings.workflow.clone(),
            risk_route: settings.risk_workflow.clone(),
            chat_route: settings.chat.clone(),
        }
    }

    pub fn has_chat_credentials(&self) -> bool {
        self.chat_route.api_key.is_some()
    }

    /// The risk-appraisal workflow lives in a separate engine app with its
    /// own credential; everything else uses the primary route.
    fn route_for(&self, workflow: &str) -> WorkflowResult<(&str, &str)> {
        let route = if workflow == super::outputs::RISK_APPRAISAL {
            &self.risk_route
        } else {
            &self.workflow_route
        };
        let key = route.api_key.as_deref().ok_or_else(|| {
            WorkflowError::Config(format!("no API key configured for workflow {workflow}"))
        })?;
        Ok((route.base_url.as_str(), key))
    }

    fn workflow_request(
        &self,
        workflow: &str,
        inputs: &Value,
        response_mode: &str,
    ) -> WorkflowResult<RequestBuilder> {
        let workflow = workflow.trim();
        if workflow.is_empty() {
            return Err(WorkflowError::Config(
                "workflow name must not be empty".to_string(),
            ));
        }
        let (base_url, api_key) = self.route_for(workflow)?;
        Ok(self
            .client
            .post(format!("{base_url}/v1/workflows/run"))
            .bearer_auth(api_key)
            .timeout(UPSTREAM_BUDGET)
            .json(&json!({
                "workflow_name": workflow,
                "inputs": inputs,
                "response_mode": response_mode,
                "user": self.user_id,
            })))
    }

    /// Single request/response invocation.
    pub async fn invoke_blocking(&self, workflow: &str, inputs: &Value) -> WorkflowResult<Value> {
        info!("invoking workflow {workflow} (blocking)");
        let response = self
            .workflow_request(workflow, inputs, "blocking")?
            .send()
            .await
            .map_err(|err| WorkflowError::from_reqwest(workflow, err))?;

        let response = check_status(workflow, response).await?;
        response
            .json()
            .await
            .map_err(|err| WorkflowError::Transport(err.to_string()))
    }

    /// Streaming invocation: decodes SSE frames incrementally, invokes
    /// `on_frame` for each parsed frame, and returns the last one (or an
    /// empty object if the stream carried none).
    pub async fn invoke_streaming<F>(
        &self,
        workflow: &str,
        inputs: &Value,
        on_frame: F,
    ) -> WorkflowResult<Value>
    where
        F: FnMut(&Value),
    {
        info!("invoking workflow {workflow} (streaming)");
        let response = self
            .workflow_request(workflow, inputs, "streaming")?
            .send()
            .await
            .map_err(|err| WorkflowError::from_reqwest(workflow, err))?;

        let response = check_status(workflow, response).await?;
        read_sse_body(workflow, response, on_frame).await
    }

    /// Relay one chat message through the engine's chat endpoint, streaming.
    pub async fn send_chat_message<F>(&self, message: &str, on_frame: F) -> WorkflowResult<Value>
    where
        F: FnMut(&Value),
    {
        let api_key = self.chat_route.api_key.as_deref().ok_or_else(|| {
            WorkflowError::Config("DIFY_API_KEY_3 is not configured".to_string())
        })?;

        let response = self
            .client
            .post(format!("{}/v1/chat-messages", self.chat_route.base_url))
            .bearer_auth(api_key)
            .timeout(UPSTREAM_BUDGET)
            .json(&json!({
                "query": message,
                "inputs": {},
                "response_mode": "streaming",
                "user": self.user_id,
            }))
            .send()
            .await
            .map_err(|err| WorkflowError::from_reqwest("chatflow", err))?;

        let response = check_status("chatflow", response).await?;
        read_sse_body("chatflow", response, on_frame).await
    }
}

/// Map a non-success status to the right failure class. The body is read in
/// full first so the upstream's own error report survives. A 504 is not a
/// hard failure: the job may still be running upstream.
async fn check_status(workflow: &str, response: Response) -> WorkflowResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::GATEWAY_TIMEOUT {
        return Err(WorkflowError::Timeout {
            workflow: workflow.to_string(),
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(WorkflowError::upstream(status.as_u16(), body))
}

/// Decode an SSE response body frame by frame. An explicit error frame fails
/// the call immediately; partial trailing bytes are discarded at the end of
/// the stream.
async fn read_sse_body<F>(
    workflow: &str,
    response: Response,
    mut on_frame: F,
) -> WorkflowResult<Value>
where
    F: FnMut(&Value),
{
    let mut stream = response.bytes_stream();
    let mut decoder = SseFrameDecoder::new();
    let mut last_frame: Option<Value> = None;
    let mut done = false;

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|err| WorkflowError::from_reqwest(workflow, err))?;
        for event in decoder.push(&bytes) {
            match event {
                SseEvent::Done => done = true,
                SseEvent::Frame(frame) => {
                    if frame.get("type").and_then(Value::as_str) == Some("error") {
                        let message = frame
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("workflow stream error");
                        return Err(WorkflowError::upstream(None, message));
                    }
                    on_frame(&frame);
                    last_frame = Some(frame);
                }
            }
        }
        if done {
            break;
        }
    }

    debug!("workflow {workflow} stream ended (saw frames: {})", last_frame.is_some());
    Ok(last_frame.unwrap_or_else(|| Value::Object(Default::default())))
}
