//! Type definitions for claude-query.
//!
//! - [`content`]: content blocks inside messages ([`ContentBlock`], …)
//! - [`messages`]: the CLI's NDJSON message types ([`Message`], …)
//! - [`fragment`]: [`ResponseFragment`], the unit handed to callers

pub mod content;
pub mod fragment;
pub mod messages;

pub use content::{ContentBlock, TextBlock, ThinkingBlock, ToolResultBlock, ToolUseBlock};
pub use fragment::ResponseFragment;
pub use messages::{
    AssistantMessage, AssistantMessageInner, Message, ResultMessage, StreamEvent, SystemMessage,
    Usage, UserMessage,
};
