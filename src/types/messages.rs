//! Top-level NDJSON message types produced by the Claude Code CLI.
//!
//! With `--output-format stream-json` the CLI writes one JSON object per line
//! on stdout. Each line is one [`Message`].
//!
//! # Resilience
//!
//! Struct fields use `#[serde(default)]` so that fields missing in older CLI
//! versions do not break parsing, and a flattened `extra` map absorbs fields
//! newer versions add. Lines whose `"type"` is not listed here are skipped by
//! the client before they reach these types (see [`Message::is_known_type`]).
//!
//! # Example
//!
//! ```rust
//! use claude_query::types::messages::Message;
//!
//! let line = r#"{"type":"result","subtype":"success","is_error":false,"num_turns":1,"result":"4"}"#;
//! let msg: Message = serde_json::from_str(line).unwrap();
//! assert!(matches!(msg, Message::Result(_)));
//! ```

use serde::{Deserialize, Serialize};

use crate::types::content::ContentBlock;

/// `"type"` values the client understands.
const KNOWN_TYPES: &[&str] = &["system", "assistant", "user", "result", "stream_event"];

// ── Top-level message enum ────────────────────────────────────────────────────

/// The top-level message type emitted by the Claude Code CLI on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A system-level message (session initialisation and notices).
    System(SystemMessage),
    /// Assistant output. Lines sharing a message id belong to one turn.
    Assistant(AssistantMessage),
    /// A user turn, e.g. tool results fed back to the model.
    User(UserMessage),
    /// The final message of an exchange.
    Result(ResultMessage),
    /// A partial-message event (only with `--include-partial-messages`).
    StreamEvent(StreamEvent),
}

impl Message {
    /// Returns `true` if a raw NDJSON value carries a `"type"` this module
    /// can deserialise.
    #[must_use]
    pub fn is_known_type(value: &serde_json::Value) -> bool {
        value
            .get("type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| KNOWN_TYPES.contains(&t))
    }

    /// Returns the session ID if present on this message variant.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::System(m) => Some(&m.session_id),
            Self::Assistant(m) => m.session_id.as_deref(),
            Self::User(_) => None,
            Self::Result(m) => m.session_id.as_deref(),
            Self::StreamEvent(m) => Some(&m.session_id),
        }
    }

    /// Returns `true` if this is a [`Message::Result`] that indicates an error.
    #[inline]
    #[must_use]
    pub fn is_error_result(&self) -> bool {
        matches!(self, Self::Result(r) if r.is_error)
    }

    /// Text blocks of an [`Message::Assistant`] message, in order. Empty for
    /// every other variant.
    #[must_use]
    pub fn assistant_text_blocks(&self) -> Vec<&str> {
        match self {
            Self::Assistant(a) => a
                .message
                .content
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ── SystemMessage ─────────────────────────────────────────────────────────────

/// A system-level message. The first line the CLI emits is `system/init`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Discriminates between system message kinds (e.g., `"init"`).
    #[serde(default)]
    pub subtype: String,

    /// Opaque session identifier.
    #[serde(default)]
    pub session_id: String,

    /// Working directory of the Claude process.
    #[serde(default)]
    pub cwd: String,

    /// Tool names available in this session.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Model identifier.
    #[serde(default)]
    pub model: String,

    /// Forward-compatibility catchall.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

// ── AssistantMessage ──────────────────────────────────────────────────────────

/// An assistant turn containing one or more content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// The inner Anthropic messages API object.
    pub message: AssistantMessageInner,

    /// Session ID (may be absent).
    #[serde(default)]
    pub session_id: Option<String>,

    /// Forward-compatibility catchall.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// The inner structure of an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessageInner {
    /// Unique message ID assigned by the API.
    #[serde(default)]
    pub id: String,

    /// Content blocks (text, tool use, thinking).
    #[serde(default)]
    pub content: Vec<ContentBlock>,

    /// Model that generated this message.
    #[serde(default)]
    pub model: String,

    /// Why the model stopped generating (e.g., `"end_turn"`, `"tool_use"`).
    #[serde(default)]
    pub stop_reason: Option<String>,

    /// Token usage for this turn.
    #[serde(default)]
    pub usage: Usage,
}

// ── UserMessage ───────────────────────────────────────────────────────────────

/// A user-turn message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    /// The raw user payload; a string or a list of content blocks.
    #[serde(default)]
    pub message: serde_json::Value,

    /// Forward-compatibility catchall.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

// ── ResultMessage ─────────────────────────────────────────────────────────────

/// Result subtype the CLI reports when it stops at `--max-turns`.
pub const MAX_TURNS_SUBTYPE: &str = "error_max_turns";

/// The final message emitted by the CLI after the exchange completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    /// Result subtype (e.g., `"success"`, `"error_max_turns"`).
    #[serde(default)]
    pub subtype: String,

    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,

    /// `true` if the exchange ended due to an error.
    #[serde(default)]
    pub is_error: bool,

    /// Number of conversation turns executed.
    #[serde(default)]
    pub num_turns: u32,

    /// Session identifier.
    #[serde(default)]
    pub session_id: Option<String>,

    /// Total USD cost, when billing data is available.
    #[serde(default)]
    pub total_cost_usd: Option<f64>,

    /// Aggregate token usage.
    #[serde(default)]
    pub usage: Usage,

    /// The final text result, if any.
    #[serde(default)]
    pub result: Option<String>,

    /// Forward-compatibility catchall.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl ResultMessage {
    /// `true` when the backend stopped because it used up its turn budget.
    #[must_use]
    pub fn reached_turn_limit(&self) -> bool {
        self.subtype == MAX_TURNS_SUBTYPE
    }

    /// `true` when the exchange failed for a reason other than the turn limit.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.is_error && !self.reached_turn_limit()
    }
}

// ── StreamEvent ──────────────────────────────────────────────────────────────

/// A raw Anthropic streaming event forwarded by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Unique event identifier.
    #[serde(default)]
    pub uuid: String,

    /// Session this event belongs to.
    #[serde(default)]
    pub session_id: String,

    /// Opaque event payload.
    #[serde(default)]
    pub event: serde_json::Value,

    /// The tool use this event belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,

    /// Forward-compatibility catchall.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl StreamEvent {
    /// Returns the API message id of a `message_start` event, which opens a
    /// new assistant turn.
    #[must_use]
    pub fn message_start_id(&self) -> Option<&str> {
        if self.event.get("type").and_then(|t| t.as_str()) != Some("message_start") {
            return None;
        }
        Some(
            self.event
                .get("message")
                .and_then(|m| m.get("id"))
                .and_then(|id| id.as_str())
                .unwrap_or_default(),
        )
    }

    /// Returns the text of a `content_block_delta` / `text_delta` event.
    #[must_use]
    pub fn text_delta(&self) -> Option<&str> {
        if self.event.get("type").and_then(|t| t.as_str()) != Some("content_block_delta") {
            return None;
        }
        let delta = self.event.get("delta")?;
        if delta.get("type").and_then(|t| t.as_str()) != Some("text_delta") {
            return None;
        }
        delta.get("text").and_then(|t| t.as_str())
    }
}

// ── Usage ─────────────────────────────────────────────────────────────────────

/// Token usage counters for a message or exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the input (prompt) context.
    #[serde(default)]
    pub input_tokens: u32,

    /// Tokens in the generated output.
    #[serde(default)]
    pub output_tokens: u32,

    /// Input tokens served from the prompt cache.
    #[serde(default)]
    pub cache_read_input_tokens: u32,

    /// Input tokens used to populate the prompt cache.
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
}

impl Usage {
    /// Total tokens consumed (input + output), ignoring cache counters.
    #[inline]
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_init_from_ndjson() {
        let line = r#"{"type":"system","subtype":"init","session_id":"s1","cwd":"/tmp","tools":["Read"],"model":"claude-sonnet-4-5","permissionMode":"default"}"#;
        let msg: Message = serde_json::from_str(line).unwrap();
        let Message::System(s) = &msg else {
            panic!("expected System, got {msg:?}");
        };
        assert_eq!(s.subtype, "init");
        assert_eq!(s.tools, ["Read"]);
        assert_eq!(s.extra["permissionMode"], "default");
        assert_eq!(msg.session_id(), Some("s1"));
    }

    #[test]
    fn system_message_missing_fields_use_defaults() {
        let msg: Message = serde_json::from_str(r#"{"type":"system"}"#).unwrap();
        assert!(matches!(msg, Message::System(ref s) if s.subtype.is_empty()));
    }

    #[test]
    fn assistant_text_blocks_in_order() {
        let line = r#"{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"2 + 2 "},{"type":"tool_use","id":"t","name":"Bash","input":{}},{"type":"text","text":"= 4"}],"model":"m","stop_reason":"end_turn","usage":{"input_tokens":3,"output_tokens":4}},"session_id":"s1"}"#;
        let msg: Message = serde_json::from_str(line).unwrap();
        assert_eq!(msg.assistant_text_blocks(), ["2 + 2 ", "= 4"]);
        assert_eq!(msg.session_id(), Some("s1"));
    }

    #[test]
    fn assistant_with_unmodelled_blocks_keeps_its_text() {
        let line = r#"{"type":"assistant","message":{"id":"m2","content":[{"type":"redacted_thinking","data":"x"},{"type":"server_tool_use","id":"s","name":"web_search","input":{}},{"type":"text","text":"done"}]}}"#;
        let msg: Message = serde_json::from_str(line).unwrap();
        assert_eq!(msg.assistant_text_blocks(), ["done"]);
    }

    #[test]
    fn non_assistant_has_no_text_blocks() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"user","message":{"role":"user","content":"hi"}}"#)
                .unwrap();
        assert!(msg.assistant_text_blocks().is_empty());
        assert_eq!(msg.session_id(), None);
    }

    #[test]
    fn result_success_from_ndjson() {
        let line = r#"{"type":"result","subtype":"success","duration_ms":1200,"is_error":false,"num_turns":1,"session_id":"s1","total_cost_usd":0.002,"result":"4","usage":{"input_tokens":10,"output_tokens":2}}"#;
        let msg: Message = serde_json::from_str(line).unwrap();
        let Message::Result(r) = &msg else {
            panic!("expected Result");
        };
        assert!(!r.is_failure());
        assert_eq!(r.num_turns, 1);
        assert_eq!(r.result.as_deref(), Some("4"));
        assert_eq!(r.usage.total_tokens(), 12);
        assert!(!msg.is_error_result());
    }

    #[test]
    fn max_turns_result_is_not_a_failure() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"result","subtype":"error_max_turns","is_error":true,"num_turns":3}"#,
        )
        .unwrap();
        let Message::Result(r) = &msg else {
            panic!("expected Result");
        };
        assert!(r.reached_turn_limit());
        assert!(!r.is_failure());
        assert!(msg.is_error_result());
    }

    #[test]
    fn execution_error_result_is_failure() {
        let r: ResultMessage = serde_json::from_str(
            r#"{"subtype":"error_during_execution","is_error":true}"#,
        )
        .unwrap();
        assert!(r.is_failure());
    }

    #[test]
    fn stream_event_text_delta() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"stream_event","uuid":"u1","session_id":"s1","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}}"#,
        )
        .unwrap();
        let Message::StreamEvent(e) = &msg else {
            panic!("expected StreamEvent");
        };
        assert_eq!(e.text_delta(), Some("Hel"));
    }

    #[test]
    fn stream_event_non_text_delta_is_none() {
        let e: StreamEvent = serde_json::from_value(serde_json::json!({
            "uuid": "u1",
            "session_id": "s1",
            "event": {"type": "content_block_delta", "delta": {"type": "input_json_delta", "partial_json": "{"}}
        }))
        .unwrap();
        assert_eq!(e.text_delta(), None);

        let start: StreamEvent = serde_json::from_value(serde_json::json!({
            "event": {"type": "message_start"}
        }))
        .unwrap();
        assert_eq!(start.text_delta(), None);
    }

    #[test]
    fn stream_event_message_start_id() {
        let start: StreamEvent = serde_json::from_value(serde_json::json!({
            "event": {"type": "message_start", "message": {"id": "msg_7"}}
        }))
        .unwrap();
        assert_eq!(start.message_start_id(), Some("msg_7"));

        let anonymous: StreamEvent = serde_json::from_value(serde_json::json!({
            "event": {"type": "message_start"}
        }))
        .unwrap();
        assert_eq!(anonymous.message_start_id(), Some(""));

        let stop: StreamEvent = serde_json::from_value(serde_json::json!({
            "event": {"type": "message_stop"}
        }))
        .unwrap();
        assert_eq!(stop.message_start_id(), None);
    }

    #[test]
    fn known_type_detection() {
        assert!(Message::is_known_type(&serde_json::json!({"type": "assistant"})));
        assert!(!Message::is_known_type(&serde_json::json!({"type": "rate_limit_event"})));
        assert!(!Message::is_known_type(&serde_json::json!({"no_type": true})));
    }
}
