use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

use crate::core::workflow::outputs::{
    MARKET_SENTIMENT_INIT, RISK_APPRAISAL, RISK_STREAM_FIELDS, extract_outputs, frame_outputs,
    shape_inputs,
};
use crate::core::workflow::sse::DONE_TOKEN;
use crate::core::workflow::JobStatus;

use super::super::AppState;

#[derive(Deserialize)]
pub(crate) struct ExecuteRequest {
    workflow: Option<String>,
    payload: Option<Value>,
    #[serde(default)]
    stream: bool,
}

pub(crate) async fn execute_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> axum::response::Response {
    let Some(workflow) = req
        .workflow
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Workflow name is required" })),
        )
            .into_response();
    };

    let inputs = shape_inputs(&workflow, req.payload.as_ref());
    info!("executing workflow {workflow} (stream: {})", req.stream);

    if req.stream {
        return stream_execute(state, workflow, inputs).await;
    }

    match state.gateway.invoke_blocking(&workflow, &inputs).await {
        Ok(raw) => {
            let outputs = extract_outputs(&raw);
            if workflow == MARKET_SENTIMENT_INIT {
                let empty = outputs.as_object().is_none_or(|o| o.is_empty());
                if empty {
                    error!("market sentiment init returned no data");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "工作流返回数据为空" })),
                    )
                        .into_response();
                }
                Json(outputs).into_response()
            } else {
                let body = outputs
                    .get("result")
                    .filter(|v| !v.is_null())
                    .cloned()
                    .unwrap_or(outputs);
                Json(body).into_response()
            }
        }
        Err(err) => {
            error!("workflow {workflow} failed: {err}");
            let status = if err.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(json!({ "error": format!("调用工作流 {workflow} 失败: {err}") })),
            )
                .into_response()
        }
    }
}

/// Relay the engine's SSE stream to the browser. The risk-appraisal workflow
/// is exploded into per-field chunks so the UI can fill in regions as they
/// arrive; other workflows deliver one `complete` chunk built from the final
/// frame's outputs.
async fn stream_execute(state: AppState, workflow: String, inputs: Value) -> axum::response::Response {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let frame_tx = tx.clone();
        let per_field = workflow == RISK_APPRAISAL;
        let outcome = state
            .gateway
            .invoke_streaming(&workflow, &inputs, move |frame| {
                if !per_field {
                    return;
                }
                let Some(outputs) = frame_outputs(frame) else {
                    return;
                };
                for chunk in risk_field_chunks(outputs) {
                    let _ = frame_tx.send(chunk.to_string());
                }
            })
            .await;

        match outcome {
            Ok(last_frame) => {
                if workflow != RISK_APPRAISAL {
                    let outputs = frame_outputs(&last_frame)
                        .cloned()
                        .unwrap_or_else(|| json!({}));
                    let _ = tx.send(json!({ "type": "complete", "data": outputs }).to_string());
                }
                let _ = tx.send(DONE_TOKEN.to_string());
            }
            Err(err) => {
                error!("streaming workflow {workflow} failed: {err}");
                let _ = tx.send(json!({ "type": "error", "error": err.to_string() }).to_string());
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));
    Sse::new(stream).into_response()
}

/// Per-field chunk frames for the risk-appraisal stream. Text fields stream
/// once present; fund and news only once they are arrays.
fn risk_field_chunks(outputs: &Value) -> Vec<Value> {
    let mut chunks = Vec::new();
    for field in RISK_STREAM_FIELDS {
        let Some(data) = outputs.get(field) else {
            continue;
        };
        let streamable = match field {
            "fund" | "news" => data.is_array(),
            _ => !data.is_null(),
        };
        if streamable {
            chunks.push(json!({ "type": field, "data": data }));
        }
    }
    chunks
}

#[derive(Deserialize)]
pub(crate) struct StartRequest {
    workflow: Option<String>,
    payload: Option<Value>,
}

pub(crate) async fn start_endpoint(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> axum::response::Response {
    let Some(workflow) = req
        .workflow
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Workflow name is required" })),
        )
            .into_response();
    };

    let inputs = shape_inputs(&workflow, req.payload.as_ref());
    let job_id = state.jobs.start(state.gateway.clone(), workflow, inputs);
    (StatusCode::ACCEPTED, Json(json!({ "jobId": job_id }))).into_response()
}

pub(crate) async fn status_endpoint(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<Value> {
    match state.jobs.get_job(&job_id) {
        // Unknown ids read as pending: a poller racing job creation should
        // keep polling instead of erroring out on a 404.
        None => Json(json!({ "status": "pending" })),
        Some(job) => {
            let mut body = serde_json::Map::new();
            body.insert("status".to_string(), json!(job.status));
            body.insert("startedAt".to_string(), json!(job.started_at));
            body.insert("workflow".to_string(), Value::String(job.workflow));
            match job.status {
                JobStatus::Succeeded => {
                    if let Some(result) = job.result {
                        body.insert("result".to_string(), result);
                    }
                }
                JobStatus::Failed => {
                    if let Some(error) = job.error {
                        body.insert("error".to_string(), Value::String(error));
                    }
                }
                _ => {}
            }
            Json(Value::Object(body))
        }
    }
}
