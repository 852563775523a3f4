//! A [`BackendClient`] that hands out scripted transports.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::BackendClient;
use crate::config::ClientOptions;
use crate::errors::{Error, Result};
use crate::request::QueryRequest;
use crate::testing::mock_transport::MockTransport;
use crate::transport::Transport;

/// Serves one scripted [`MockTransport`] per query, in order, and records the
/// requests it was asked to open.
#[derive(Debug, Default)]
pub struct MockBackend {
    sessions: Mutex<VecDeque<Arc<MockTransport>>>,
    requests: Mutex<Vec<QueryRequest>>,
    not_found: bool,
}

impl MockBackend {
    /// A backend with no scripted sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the transport the next query will receive.
    #[must_use]
    pub fn script(self, transport: MockTransport) -> Self {
        self.script_shared(Arc::new(transport))
    }

    /// Like [`script`](Self::script), keeping a handle for later inspection.
    #[must_use]
    pub fn script_shared(self, transport: Arc<MockTransport>) -> Self {
        self.sessions.lock().expect("lock").push_back(transport);
        self
    }

    /// Fail every `open` with [`Error::CliNotFound`].
    #[must_use]
    pub fn not_found(mut self) -> Self {
        self.not_found = true;
        self
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }

    /// Prompts of every opened session, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .map(|r| r.prompt().to_owned())
            .collect()
    }

    /// Requests of every opened session, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn open(
        &self,
        request: &QueryRequest,
        _options: &ClientOptions,
    ) -> Result<Arc<dyn Transport>> {
        if self.not_found {
            return Err(Error::CliNotFound);
        }
        self.requests.lock().expect("lock").push(request.clone());
        let transport = self
            .sessions
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| Error::Transport("no scripted session left".into()))?;
        Ok(transport)
    }
}
