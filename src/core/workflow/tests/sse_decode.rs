use serde_json::json;

use crate::core::workflow::sse::{SseEvent, SseFrameDecoder};

#[test]
fn decodes_a_complete_record() {
    let mut decoder = SseFrameDecoder::new();
    let events = decoder.push(b"data: {\"type\":\"score\",\"data\":10}\n\n");
    assert_eq!(
        events,
        vec![SseEvent::Frame(json!({ "type": "score", "data": 10 }))]
    );
}

#[test]
fn reassembles_records_split_across_reads() {
    let mut decoder = SseFrameDecoder::new();
    assert!(decoder.push(b"data: {\"type\":\"sc").is_empty());
    assert!(decoder.push(b"ore\",\"data\":55}").is_empty());
    let events = decoder.push(b"\n\ndata: [DONE]\n\n");
    assert_eq!(
        events,
        vec![
            SseEvent::Frame(json!({ "type": "score", "data": 55 })),
            SseEvent::Done
        ]
    );
}

#[test]
fn joins_multiple_data_lines_with_a_newline() {
    let mut decoder = SseFrameDecoder::new();
    // A JSON document spread over two data lines inside one record.
    let events = decoder.push(b"data: {\"a\":\ndata: 1}\n\n");
    assert_eq!(events, vec![SseEvent::Frame(json!({ "a": 1 }))]);
}

#[test]
fn unparsable_payloads_are_skipped_not_fatal() {
    let mut decoder = SseFrameDecoder::new();
    let events = decoder.push(b"data: not json\n\ndata: {\"ok\":true}\n\n");
    assert_eq!(events, vec![SseEvent::Frame(json!({ "ok": true }))]);
}

#[test]
fn non_data_lines_are_ignored() {
    let mut decoder = SseFrameDecoder::new();
    let events = decoder.push(b"event: message\ndata: {\"ok\":true}\n\n: comment\n\n");
    assert_eq!(events, vec![SseEvent::Frame(json!({ "ok": true }))]);
}

#[test]
fn trailing_partial_record_produces_nothing() {
    let mut decoder = SseFrameDecoder::new();
    let events = decoder.push(b"data: {\"ok\":true}\n\ndata: {\"half\":");
    assert_eq!(events, vec![SseEvent::Frame(json!({ "ok": true }))]);
    // The unterminated tail stays buffered; dropping the decoder discards it.
}
