#![warn(missing_docs)]
//! # claude-query
//!
//! Send a prompt to the [Claude Code CLI] and read the answer as an ordered,
//! asynchronous stream of text fragments.
//!
//! Each query runs in its own CLI process, speaking the CLI's NDJSON
//! `stream-json` output format. The stream ends when the backend reports the
//! exchange complete, or with a single error.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use claude_query::{QueryConfig, QueryRequest, StreamingQueryClient};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> claude_query::Result<()> {
//!     let client = StreamingQueryClient::new();
//!     let request = QueryRequest::new("Create a hello world function in Python")
//!         .with_config(
//!             QueryConfig::builder()
//!                 .system_prompt("You are a helpful Python programming assistant.")
//!                 .max_conversation_turns(3_u32)
//!                 .allowed_tools(vec!["Read".into(), "Write".into(), "Bash".into()])
//!                 .build(),
//!         );
//!     let mut fragments = client.query(request).await?;
//!     while let Some(fragment) = fragments.next().await {
//!         print!("{}", fragment?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Timeouts
//!
//! All timeouts are configurable via [`ClientOptions`]:
//!
//! | Timeout | Default | Purpose |
//! |---------|---------|---------|
//! | `connect_timeout` | 30s | Deadline for process spawn |
//! | `read_timeout` | 300s | Deadline for each backend line |
//! | `close_timeout` | 10s | Deadline for graceful shutdown; kills on expiry |
//! | `version_check_timeout` | 5s | Deadline for `--version` check |
//!
//! Set any of them to `None` to wait indefinitely.
//!
//! ## Feature flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `testing` | Enables the `testing` module (`MockBackend`, `MockTransport`, …) |
//!
//! [Claude Code CLI]: https://www.anthropic.com/claude-code

pub mod backend;
pub mod client;
pub mod config;
pub mod demo;
pub mod discovery;
pub mod errors;
pub mod request;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ── Top-level re-exports ────────────────────────────────────────────────────

// Core
pub use backend::{BackendClient, CliBackend};
pub use client::{FragmentStream, QueryState, QuerySummary, StreamingQueryClient, query};
pub use config::{ClientOptions, QueryConfig};
pub use errors::{Error, Result};
pub use request::QueryRequest;

// Wire types
pub use types::content::{ContentBlock, TextBlock, ThinkingBlock, ToolResultBlock, ToolUseBlock};
pub use types::fragment::ResponseFragment;
pub use types::messages::{
    AssistantMessage, AssistantMessageInner, Message, ResultMessage, StreamEvent, SystemMessage,
    Usage, UserMessage,
};

// Discovery
pub use discovery::{check_cli_version, find_cli};

// Transport
pub use transport::{CliTransport, Transport};

// Cancellation
pub use tokio_util::sync::CancellationToken;
