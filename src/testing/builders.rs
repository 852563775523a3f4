//! Constructors for the backend messages tests script.

use serde_json::json;

use crate::types::content::{ContentBlock, TextBlock};
use crate::types::messages::*;

fn no_extra() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// `system/init`, the first line of every session.
#[must_use]
pub fn system_init(session_id: &str) -> Message {
    Message::System(SystemMessage {
        subtype: "init".into(),
        session_id: session_id.into(),
        cwd: "/tmp".into(),
        tools: vec!["Read".into(), "Write".into(), "Bash".into()],
        model: "claude-sonnet-4-5".into(),
        extra: no_extra(),
    })
}

/// An assistant message with a single text block and a fresh message id, so
/// it opens a turn of its own.
#[must_use]
pub fn assistant_text(text: &str) -> Message {
    assistant_turn(&format!("msg_{}", uuid::Uuid::new_v4().simple()), text)
}

/// An assistant message with a single text block and the given message id.
/// Consecutive messages with the same id belong to one turn.
#[must_use]
pub fn assistant_turn(message_id: &str, text: &str) -> Message {
    Message::Assistant(AssistantMessage {
        message: AssistantMessageInner {
            id: message_id.into(),
            content: vec![ContentBlock::Text(TextBlock { text: text.into() })],
            model: "claude-sonnet-4-5".into(),
            stop_reason: Some("end_turn".into()),
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
                ..Default::default()
            },
        },
        session_id: None,
        extra: no_extra(),
    })
}

fn result(session_id: &str, subtype: &str, is_error: bool, num_turns: u32) -> ResultMessage {
    ResultMessage {
        subtype: subtype.into(),
        duration_ms: 1000,
        is_error,
        num_turns,
        session_id: Some(session_id.into()),
        total_cost_usd: Some(0.001),
        usage: Usage::default(),
        result: None,
        extra: no_extra(),
    }
}

/// A successful `result`.
#[must_use]
pub fn result_success(session_id: &str) -> Message {
    let mut r = result(session_id, "success", false, 1);
    r.result = Some("Done.".into());
    Message::Result(r)
}

/// A failed `result` carrying `message`.
#[must_use]
pub fn result_error(session_id: &str, message: &str) -> Message {
    let mut r = result(session_id, "error_during_execution", true, 1);
    r.result = Some(message.into());
    Message::Result(r)
}

/// The `result` the backend emits when it stops at its turn limit.
#[must_use]
pub fn result_max_turns(session_id: &str, num_turns: u32) -> Message {
    Message::Result(result(session_id, MAX_TURNS_SUBTYPE, true, num_turns))
}

fn stream_event(session_id: &str, event: serde_json::Value) -> Message {
    Message::StreamEvent(StreamEvent {
        uuid: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.into(),
        event,
        parent_tool_use_id: None,
        extra: no_extra(),
    })
}

/// A `message_start` stream event opening assistant message `message_id`.
#[must_use]
pub fn message_start(session_id: &str, message_id: &str) -> Message {
    stream_event(
        session_id,
        json!({
            "type": "message_start",
            "message": { "id": message_id, "role": "assistant", "content": [] }
        }),
    )
}

/// A `content_block_delta` stream event carrying `text`.
#[must_use]
pub fn text_delta(session_id: &str, text: &str) -> Message {
    stream_event(
        session_id,
        json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        }),
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────
