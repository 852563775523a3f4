//! The two-query demonstration program behind the `claude-query` binary.
//!
//! Output goes to any [`Write`] sink so the program can run against a buffer
//! in tests. Fragments are flushed as they arrive.

use std::io::Write;
use std::process::ExitCode;

use tokio_stream::StreamExt;

use crate::client::StreamingQueryClient;
use crate::config::QueryConfig;
use crate::errors::{Error, Result};
use crate::request::QueryRequest;

/// Prompt of the first query.
pub const ARITHMETIC_PROMPT: &str = "What is 2 + 2?";

/// Prompt of the second query.
pub const PYTHON_PROMPT: &str = "Create a simple hello world function in Python and explain it";

const RULE_WIDTH: usize = 40;

/// Configuration of the second query.
#[must_use]
pub fn python_assistant_config() -> QueryConfig {
    QueryConfig::builder()
        .system_prompt("You are a helpful Python programming assistant.")
        .max_conversation_turns(3_u32)
        .allowed_tools(vec!["Read".into(), "Write".into(), "Bash".into()])
        .working_directory(".")
        .build()
}

fn rule() -> String {
    "-".repeat(RULE_WIDTH)
}

/// Stream one query's fragments into `out`, flushing after each.
async fn stream_into(
    client: &StreamingQueryClient,
    request: QueryRequest,
    out: &mut impl Write,
) -> Result<()> {
    let mut fragments = client.query(request).await?;
    while let Some(fragment) = fragments.next().await {
        out.write_all(fragment?.text().as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

/// Run both queries in order, printing headers, fragments and rules.
///
/// # Errors
///
/// The first error from either query, or from writing to `out`. Output
/// already written stays written.
pub async fn run(client: &StreamingQueryClient, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Asking Claude: {ARITHMETIC_PROMPT}")?;
    writeln!(out, "{}", rule())?;
    stream_into(client, QueryRequest::new(ARITHMETIC_PROMPT), out).await?;
    writeln!(out, "\n{}", rule())?;

    writeln!(out, "\nAsking Claude to help with Python:")?;
    writeln!(out, "{}", rule())?;
    let request = QueryRequest::new(PYTHON_PROMPT).with_config(python_assistant_config());
    stream_into(client, request, out).await?;
    writeln!(out, "\n{}", rule())?;
    Ok(())
}

/// Print the message for a failed run and return the process exit code.
pub fn report_failure(error: &Error, out: &mut impl Write) -> ExitCode {
    tracing::debug!(error = ?error, "demo run failed");
    let written = if error.is_backend_not_found() {
        writeln!(out, "Error: Claude Code CLI not found. Please install it with:")
            .and_then(|()| writeln!(out, "npm install -g @anthropic-ai/claude-code"))
    } else {
        writeln!(out, "Error: {error}")
    };
    if let Err(e) = written.and_then(|()| out.flush()) {
        tracing::warn!(error = %e, "could not report failure");
    }
    ExitCode::from(1)
}
