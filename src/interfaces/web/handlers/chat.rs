use std::convert::Infallible;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    response::sse::{Event, Sse},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::error;

use crate::core::workflow::sse::DONE_TOKEN;

use super::super::AppState;

#[derive(Deserialize)]
pub(crate) struct ChatflowRequest {
    message: Option<String>,
}

/// SSE relay for the chat workflow: incremental `answer_chunk` deltas as the
/// engine streams, then a final `complete` frame and the `[DONE]` token.
pub(crate) async fn chatflow_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ChatflowRequest>,
) -> axum::response::Response {
    let Some(message) = req.message.filter(|m| !m.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Message is required" })),
        )
            .into_response();
    };

    if !state.gateway.has_chat_credentials() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "DIFY_API_KEY_3 未配置，请在 .env 文件中添加 DIFY_API_KEY_3" })),
        )
            .into_response();
    }

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut relay = AnswerRelay::default();
        let frame_tx = tx.clone();
        let outcome = state
            .gateway
            .send_chat_message(&message, |frame| {
                if let Some(delta) = relay.on_frame(frame) {
                    let _ = frame_tx.send(delta.to_string());
                }
            })
            .await;

        match outcome {
            Ok(last_frame) => {
                let _ = tx.send(relay.complete(&last_frame).to_string());
                let _ = tx.send(DONE_TOKEN.to_string());
            }
            Err(err) => {
                error!("chatflow relay failed: {err}");
                let _ = tx.send(json!({ "type": "error", "error": err.to_string() }).to_string());
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|msg| Ok::<_, Infallible>(Event::default().data(msg)));
    Sse::new(stream).into_response()
}

/// Tracks the answer text as the engine streams it cumulatively, emitting
/// only the increments. Kept free of transport concerns so it can be
/// exercised with plain frames.
#[derive(Debug, Default)]
struct AnswerRelay {
    answer: String,
    files: Vec<Value>,
}

impl AnswerRelay {
    /// Absorb one engine frame; returns an `answer_chunk` frame when the
    /// frame extended the answer.
    fn on_frame(&mut self, frame: &Value) -> Option<Value> {
        if let Some(files) = extract_files(frame) {
            self.files = files;
        }

        let extracted = extract_answer(frame)?;
        if extracted == self.answer {
            return None;
        }
        let delta = match extracted.strip_prefix(&self.answer) {
            Some(delta) if !delta.is_empty() => delta.to_string(),
            Some(_) => return None,
            // The engine restarted or rewrote the answer; resend it whole.
            None => extracted.clone(),
        };
        self.answer = extracted;
        Some(json!({ "type": "answer_chunk", "data": delta }))
    }

    /// Final frame for the client. When no delta frame ever carried the
    /// answer, try once more against the stream's last payload.
    fn complete(mut self, last_frame: &Value) -> Value {
        if self.answer.is_empty()
            && let Some(answer) = extract_answer(last_frame)
        {
            self.answer = answer;
        }
        if self.files.is_empty()
            && let Some(files) = extract_files(last_frame)
        {
            self.files = files;
        }
        json!({ "type": "complete", "answer": self.answer, "files": self.files })
    }
}

/// The chat endpoint nests `answer` in several places depending on the event
/// kind; try them in order.
fn extract_answer(frame: &Value) -> Option<String> {
    frame
        .get("answer")
        .or_else(|| frame.get("data").and_then(|d| d.get("answer")))
        .or_else(|| frame.get("message").and_then(|m| m.get("answer")))
        .or_else(|| outputs_of(frame).and_then(|o| o.get("answer")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn extract_files(frame: &Value) -> Option<Vec<Value>> {
    frame
        .get("files")
        .or_else(|| frame.get("data").and_then(|d| d.get("files")))
        .or_else(|| outputs_of(frame).and_then(|o| o.get("files")))
        .and_then(Value::as_array)
        .filter(|files| !files.is_empty())
        .cloned()
}

fn outputs_of(frame: &Value) -> Option<&Value> {
    frame
        .get("data")
        .and_then(|d| d.get("outputs"))
        .or_else(|| frame.get("outputs"))
}
