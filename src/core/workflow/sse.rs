use serde_json::Value;
use tracing::warn;

/// Literal terminator token: the stream ended with no further payload.
pub const DONE_TOKEN: &str = "[DONE]";

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Frame(Value),
    Done,
}

/// Incremental decoder for the engine's SSE framing: records separated by a
/// blank line, each holding one or more `data:` lines whose joined text is a
/// JSON document or the `[DONE]` token.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the wire; returns every event completed by this
    /// read. A record whose payload fails to parse as JSON is logged and
    /// skipped. Trailing bytes of an unterminated record stay buffered and
    /// are discarded if the stream ends before the record completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(idx) = self.buffer.find("\n\n") {
            let record = self.buffer[..idx].to_string();
            self.buffer.drain(..idx + 2);
            let Some(text) = data_payload(&record) else {
                continue;
            };
            if text == DONE_TOKEN {
                events.push(SseEvent::Done);
                continue;
            }
            match serde_json::from_str::<Value>(&text) {
                Ok(frame) => events.push(SseEvent::Frame(frame)),
                Err(err) => warn!("skipping unparsable stream frame ({err}): {text}"),
            }
        }
        events
    }
}

/// Collect the `data:` payload lines of one record, joined with a newline.
fn data_payload(record: &str) -> Option<String> {
    let lines: Vec<&str> = record
        .split('\n')
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();
    if lines.is_empty() {
        return None;
    }
    let joined = lines.join("\n");
    (!joined.is_empty()).then_some(joined)
}
