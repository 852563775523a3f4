//! `claude-query`: ask Claude Code two questions and stream the answers.

use std::process::ExitCode;

use claude_query::{StreamingQueryClient, demo};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Diagnostics go to stderr; stdout carries only the answers.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let client = StreamingQueryClient::new();
    let mut stdout = std::io::stdout();
    match demo::run(&client, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => demo::report_failure(&e, &mut stdout),
    }
}
