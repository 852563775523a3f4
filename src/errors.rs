//! Error types for claude-query.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an alias
//! for `std::result::Result<T, Error>`.
//!
//! Callers usually only need to tell two situations apart: the backend CLI is
//! not installed ([`Error::CliNotFound`], see [`Error::is_backend_not_found`])
//! and everything else.
//!
//! # Example
//!
//! ```rust
//! use claude_query::{Error, Result};
//!
//! fn might_fail() -> Result<()> {
//!     Err(Error::NotConnected)
//! }
//! ```

/// All errors that can be produced while running a query.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The Claude Code CLI binary was not found on `PATH` or in any of the
    /// fallback install locations.
    ///
    /// Install it with: `npm install -g @anthropic-ai/claude-code`
    #[error("Claude Code CLI not found. Install: npm install -g @anthropic-ai/claude-code")]
    CliNotFound,

    /// The discovered CLI version is below the minimum this crate supports.
    #[error("CLI version {found} below minimum {required}")]
    VersionMismatch {
        /// The version that was discovered on the system.
        found: String,
        /// The minimum version required.
        required: String,
    },

    /// The OS failed to spawn the backend child process.
    #[error("Failed to spawn Claude process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The backend process exited with a non-zero (or missing) status code.
    ///
    /// `code` is `None` when the process was killed by a signal.
    #[error("Claude process exited with code {code:?}: {stderr}")]
    ProcessExited {
        /// The exit code, or `None` if the process was killed by a signal.
        code: Option<i32>,
        /// The tail of the process's stderr output.
        stderr: String,
    },

    /// A line from the backend could not be parsed as valid JSON.
    #[error("Failed to parse JSON: {message} (line: {line})")]
    ParseError {
        /// Human-readable description of the parse failure.
        message: String,
        /// The raw line that could not be parsed (truncated to 200 chars).
        line: String,
    },

    /// Transparent wrapper around [`std::io::Error`].
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transparent wrapper around [`serde_json::Error`].
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transport operation was attempted before it was connected.
    #[error("Backend not connected. Call connect() first.")]
    NotConnected,

    /// An error in the stdio transport layer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A request or configuration value is absent or out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The backend finished the exchange but reported it as failed.
    #[error("Backend reported an error ({subtype}): {message}")]
    Backend {
        /// Result subtype reported by the CLI (e.g. `"error_during_execution"`).
        subtype: String,
        /// Result text, or a placeholder when the CLI sent none.
        message: String,
    },

    /// An async operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The query was cancelled via a [`CancellationToken`](tokio_util::sync::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias so callers can write `Result<T>` instead of
/// `std::result::Result<T, claude_query::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

// ── Helpers ──────────────────────────────────────────────────────────────────

impl Error {
    /// Returns `true` if the backend executable could not be located.
    ///
    /// This is the one error callers are expected to answer with an
    /// installation hint rather than a generic failure message.
    #[inline]
    #[must_use]
    pub fn is_backend_not_found(&self) -> bool {
        matches!(self, Self::CliNotFound)
    }

    /// Returns `true` if the backend process exited with a failure code.
    #[inline]
    #[must_use]
    pub fn is_process_exit(&self) -> bool {
        matches!(self, Self::ProcessExited { .. })
    }

    /// Returns `true` if the query was cancelled via a token.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
