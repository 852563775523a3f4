//! Content block types carried inside assistant and user messages.
//!
//! The CLI serialises each block as a JSON object tagged by `"type"`. Only
//! text blocks become response fragments; the others are parsed so that a
//! turn which only runs tools still deserialises cleanly.

use serde::{Deserialize, Serialize};

// ── ContentBlock ──────────────────────────────────────────────────────────────

/// A single block of content within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain-text content produced by the model.
    Text(TextBlock),

    /// A tool invocation requested by the model.
    ToolUse(ToolUseBlock),

    /// The result of a tool invocation, sent back as user content.
    ToolResult(ToolResultBlock),

    /// Extended thinking content.
    Thinking(ThinkingBlock),

    /// A block type this crate does not model (e.g. `redacted_thinking`,
    /// `server_tool_use`). Carries no text.
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    /// Returns the text string if this block is [`ContentBlock::Text`].
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(b) => Some(&b.text),
            _ => None,
        }
    }

    /// Returns `true` if this is a [`ContentBlock::ToolUse`] block.
    #[inline]
    #[must_use]
    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse(_))
    }
}

/// A plain-text content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// The text produced by the model.
    pub text: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Identifier correlating this call with its [`ToolResultBlock`].
    pub id: String,

    /// Name of the tool being invoked (one of the allowed tools).
    pub name: String,

    /// Arguments passed to the tool.
    #[serde(default)]
    pub input: serde_json::Value,
}

/// The result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// The `id` from the corresponding [`ToolUseBlock`].
    pub tool_use_id: String,

    /// Whether the tool invocation produced an error.
    #[serde(default)]
    pub is_error: bool,

    /// Tool output; a string or a list of nested blocks.
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Extended thinking produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingBlock {
    /// The chain-of-thought text.
    pub thinking: String,

    /// Opaque signature produced by the API.
    #[serde(default)]
    pub signature: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
