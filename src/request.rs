//! [`QueryRequest`]: a prompt plus its optional [`QueryConfig`].

use crate::config::QueryConfig;
use crate::errors::{Error, Result};

/// One query to run against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    prompt: String,
    config: Option<QueryConfig>,
}

impl QueryRequest {
    /// Create a request with no configuration.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            config: None,
        }
    }

    /// Attach a configuration to the request.
    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The prompt text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The attached configuration, if any.
    #[must_use]
    pub fn config(&self) -> Option<&QueryConfig> {
        self.config.as_ref()
    }

    /// Turn limit declared by the configuration, if any.
    #[must_use]
    pub fn max_conversation_turns(&self) -> Option<u32> {
        self.config.as_ref().and_then(|c| c.max_conversation_turns)
    }

    /// Reject empty prompts and invalid configurations.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::Config("prompt must not be empty".into()));
        }
        if let Some(config) = &self.config {
            config.validate()?;
        }
        Ok(())
    }

    /// Build the CLI argument list for servicing this request.
    ///
    /// This does NOT include the binary path itself. The working directory is
    /// applied to the process, not passed as an argument.
    #[must_use]
    pub fn to_cli_args(&self, include_partial_messages: bool) -> Vec<String> {
        // stream-json output requires --verbose in --print mode.
        let mut args = vec![
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
            "--print".into(),
            self.prompt.clone(),
        ];

        if include_partial_messages {
            args.push("--include-partial-messages".into());
        }

        let Some(config) = &self.config else {
            return args;
        };

        if let Some(system_prompt) = &config.system_prompt {
            args.push("--system-prompt".into());
            args.push(system_prompt.clone());
        }

        if let Some(turns) = config.max_conversation_turns {
            args.push("--max-turns".into());
            args.push(turns.to_string());
        }

        for tool in &config.allowed_tools {
            args.push("--allowedTools".into());
            args.push(tool.clone());
        }

        args
    }
}

impl From<&str> for QueryRequest {
    fn from(prompt: &str) -> Self {
        Self::new(prompt)
    }
}

impl From<String> for QueryRequest {
    fn from(prompt: String) -> Self {
        Self::new(prompt)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
