//! Query and client configuration, both built with [`typed_builder`].
//!
//! Two layers of settings exist:
//!
//! - [`QueryConfig`] is the declarative, per-request object. It recognises
//!   exactly four options: `system_prompt`, `max_conversation_turns`,
//!   `allowed_tools` and `working_directory`.
//! - [`ClientOptions`] belongs to the [`StreamingQueryClient`](crate::StreamingQueryClient)
//!   and carries transport concerns: where the CLI lives, timeouts,
//!   cancellation, and the child-process environment.
//!
//! # Example
//!
//! ```rust
//! use claude_query::config::{ClientOptions, QueryConfig};
//!
//! let config = QueryConfig::builder()
//!     .system_prompt("You are a helpful Python programming assistant.")
//!     .max_conversation_turns(3_u32)
//!     .allowed_tools(vec!["Read".into(), "Write".into(), "Bash".into()])
//!     .working_directory(".")
//!     .build();
//!
//! let options = ClientOptions::builder().build();
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::errors::{Error, Result};

// ── QueryConfig ──────────────────────────────────────────────────────────────

/// Declarative configuration for a single query.
///
/// Immutable once built; a request owns its copy and the client only reads
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Default, TypedBuilder, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// System prompt replacing the CLI's default one.
    #[builder(default, setter(strip_option, into))]
    pub system_prompt: Option<String>,

    /// Upper bound on conversation turns the backend may take. Must be > 0.
    #[builder(default, setter(strip_option))]
    pub max_conversation_turns: Option<u32>,

    /// Tool names the backend may invoke, in the order given.
    #[builder(default)]
    pub allowed_tools: Vec<String>,

    /// Directory the backend process runs in. Must exist.
    #[builder(default, setter(strip_option, into))]
    pub working_directory: Option<PathBuf>,
}

impl QueryConfig {
    /// Validate the configuration.
    ///
    /// Checks:
    /// - `max_conversation_turns`, if set, is positive.
    /// - `working_directory`, if set, exists and is a directory.
    pub fn validate(&self) -> Result<()> {
        if self.max_conversation_turns == Some(0) {
            return Err(Error::Config(
                "max_conversation_turns must be a positive integer".into(),
            ));
        }
        if let Some(ref dir) = self.working_directory {
            if !dir.exists() {
                return Err(Error::Config(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
            if !dir.is_dir() {
                return Err(Error::Config(format!(
                    "working directory is not a directory: {}",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

// ── ClientOptions ────────────────────────────────────────────────────────────

/// Transport-level settings for a [`StreamingQueryClient`](crate::StreamingQueryClient).
///
/// Use [`ClientOptions::builder()`] or [`ClientOptions::default()`].
#[derive(TypedBuilder)]
pub struct ClientOptions {
    /// Path to the Claude CLI binary. If `None`, auto-discovered via
    /// [`find_cli()`](crate::discovery::find_cli).
    #[builder(default, setter(strip_option, into))]
    pub cli_path: Option<PathBuf>,

    /// Run `claude --version` before each query and reject versions below
    /// [`MIN_CLI_VERSION`](crate::discovery::MIN_CLI_VERSION).
    #[builder(default)]
    pub check_version: bool,

    /// Ask the CLI for partial assistant messages so fragments arrive as
    /// token deltas instead of whole text blocks.
    #[builder(default)]
    pub include_partial_messages: bool,

    /// Extra environment variables for the CLI process.
    #[builder(default)]
    pub env: HashMap<String, String>,

    // ── Timeouts ──────────────────────────────────────────────────────────
    /// Deadline for process spawn + connect. `None` = wait forever.
    ///
    /// Default: `Some(30s)`.
    #[builder(default_code = "Some(Duration::from_secs(30))")]
    pub connect_timeout: Option<Duration>,

    /// Deadline for each wait on the next backend message. `None` = wait
    /// forever.
    ///
    /// Default: `Some(300s)`. A single turn that runs tools can legitimately
    /// stay silent for minutes.
    #[builder(default_code = "Some(Duration::from_secs(300))")]
    pub read_timeout: Option<Duration>,

    /// Deadline for the process to exit during close. On expiry it is killed.
    ///
    /// Default: `Some(10s)`.
    #[builder(default_code = "Some(Duration::from_secs(10))")]
    pub close_timeout: Option<Duration>,

    /// Deadline for the `--version` check.
    ///
    /// Default: `Some(5s)`.
    #[builder(default_code = "Some(Duration::from_secs(5))")]
    pub version_check_timeout: Option<Duration>,

    // ── Cancellation ─────────────────────────────────────────────────────
    /// When cancelled, in-flight streams yield [`Error::Cancelled`] and the
    /// backend is interrupted.
    #[builder(default, setter(strip_option))]
    pub cancellation_token: Option<CancellationToken>,

    /// Called with each stderr line of the CLI process.
    #[builder(default, setter(strip_option))]
    pub stderr_callback: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("cli_path", &self.cli_path)
            .field("check_version", &self.check_version)
            .field("include_partial_messages", &self.include_partial_messages)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("version_check_timeout", &self.version_check_timeout)
            .finish_non_exhaustive()
    }
}

impl ClientOptions {
    /// Build the environment variable map for the CLI process.
    ///
    /// Defaults, each overridable through `self.env`:
    /// - `CLAUDE_CODE_SDK_ORIGINATOR=claude_query_rs`
    /// - `CI=true`: suppress interactive prompts
    /// - `TERM=dumb`: no ANSI escapes in output
    #[must_use]
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "CLAUDE_CODE_SDK_ORIGINATOR".into(),
            "claude_query_rs".into(),
        );
        env.insert("CI".into(), "true".into());
        env.insert("TERM".into(), "dumb".into());
        env.extend(self.env.clone());
        env
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
