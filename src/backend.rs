//! The [`BackendClient`] seam: who services a query.
//!
//! A `BackendClient` turns one [`QueryRequest`] into one unconnected
//! [`Transport`]. Every query gets its own transport; nothing is shared between
//! calls. [`CliBackend`] is the production implementation. Tests substitute
//! `MockBackend` from the `testing` module.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ClientOptions;
use crate::discovery;
use crate::errors::Result;
use crate::request::QueryRequest;
use crate::transport::{CliTransport, Transport};

/// Factory for per-query backend sessions.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Prepare a session for `request`. The returned transport is not yet
    /// connected.
    ///
    /// # Errors
    ///
    /// [`Error::CliNotFound`](crate::Error::CliNotFound) when the backend
    /// executable cannot be located; any other error when the backend cannot
    /// be prepared.
    async fn open(
        &self,
        request: &QueryRequest,
        options: &ClientOptions,
    ) -> Result<Arc<dyn Transport>>;
}

/// Runs each query through a fresh Claude Code CLI process.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliBackend;

#[async_trait]
impl BackendClient for CliBackend {
    async fn open(
        &self,
        request: &QueryRequest,
        options: &ClientOptions,
    ) -> Result<Arc<dyn Transport>> {
        let cli_path = discovery::resolve_cli(options.cli_path.as_deref())?;
        if options.check_version {
            discovery::ensure_supported_version(&cli_path, options.version_check_timeout).await?;
        }
        Ok(Arc::new(CliTransport::for_request(
            cli_path, request, options,
        )))
    }
}
