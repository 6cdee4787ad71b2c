use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};

use crate::core::error::{WorkflowError, WorkflowResult};

use super::outputs::RISK_STREAM_FIELDS;
use super::sse::{SseEvent, SseFrameDecoder};
use super::StreamChunk;

/// Source of typed chunks: a live network stream, or a replay synthesized
/// from a complete result in mock mode.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` when the source is exhausted.
    async fn next_chunk(&mut self) -> WorkflowResult<Option<StreamChunk>>;
}

/// Fold a chunk sequence into the accumulated result.
///
/// Each field chunk is merged under its name (last write wins, keys are
/// never removed) and handed to `on_chunk` before the next chunk is read, so
/// callers can update one UI region at a time. A `complete` chunk merges the
/// whole object and ends the stream. An error chunk fails the call; nothing
/// accumulated survives from the caller's perspective.
pub async fn consume<S, F>(source: &mut S, mut on_chunk: F) -> WorkflowResult<Value>
where
    S: ChunkSource + ?Sized,
    F: FnMut(&StreamChunk),
{
    let mut accumulated = Map::new();
    while let Some(chunk) = source.next_chunk().await? {
        match &chunk {
            StreamChunk::Field { name, data } => {
                accumulated.insert(name.clone(), data.clone());
                on_chunk(&chunk);
            }
            StreamChunk::Complete { data } => {
                if let Some(fields) = data.as_object() {
                    for (key, value) in fields {
                        accumulated.insert(key.clone(), value.clone());
                    }
                }
                break;
            }
            StreamChunk::Error { message } => {
                return Err(WorkflowError::upstream(None, message.clone()));
            }
        }
    }
    Ok(Value::Object(accumulated))
}

/// Replays the chunk sequence a live stream would produce, built from a
/// complete result object. Lets callers written against the streaming
/// contract run unmodified when no backend is configured.
pub struct ReplaySource {
    chunks: VecDeque<StreamChunk>,
}

impl ReplaySource {
    pub fn from_result(result: &Value) -> Self {
        let mut chunks = VecDeque::new();
        for field in RISK_STREAM_FIELDS {
            let Some(data) = result.get(field) else {
                continue;
            };
            // The live relay only streams fund/news once they are arrays.
            let streamable = match field {
                "fund" | "news" => data.is_array(),
                _ => !data.is_null(),
            };
            if streamable {
                chunks.push_back(StreamChunk::Field {
                    name: field.to_string(),
                    data: data.clone(),
                });
            }
        }
        chunks.push_back(StreamChunk::Complete {
            data: result.clone(),
        });
        Self { chunks }
    }

    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks: chunks.into(),
        }
    }
}

#[async_trait]
impl ChunkSource for ReplaySource {
    async fn next_chunk(&mut self) -> WorkflowResult<Option<StreamChunk>> {
        Ok(self.chunks.pop_front())
    }
}

/// Live chunk source over an SSE response body.
pub struct SseChunkSource {
    workflow: String,
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: SseFrameDecoder,
    pending: VecDeque<StreamChunk>,
    done: bool,
}

impl SseChunkSource {
    pub fn new(workflow: &str, response: reqwest::Response) -> Self {
        Self {
            workflow: workflow.to_string(),
            stream: Box::pin(response.bytes_stream()),
            decoder: SseFrameDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

#[async_trait]
impl ChunkSource for SseChunkSource {
    async fn next_chunk(&mut self) -> WorkflowResult<Option<StreamChunk>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Ok(Some(chunk));
            }
            if self.done {
                return Ok(None);
            }
            match self.stream.next().await {
                None => {
                    self.done = true;
                }
                Some(Err(err)) => {
                    return Err(WorkflowError::from_reqwest(&self.workflow, err));
                }
                Some(Ok(bytes)) => {
                    for event in self.decoder.push(&bytes) {
                        match event {
                            SseEvent::Done => self.done = true,
                            SseEvent::Frame(frame) => {
                                if let Some(chunk) = StreamChunk::from_frame(&frame) {
                                    self.pending.push_back(chunk);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
