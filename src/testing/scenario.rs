//! Scenario builder for scripting a whole backend session.

use crate::testing::builders::{result_success, system_init};
use crate::testing::mock_transport::MockTransport;
use crate::types::messages::Message;

/// Fluent builder for a scripted backend session.
///
/// # Example
///
/// ```rust,ignore
/// use claude_query::testing::{ScenarioBuilder, assistant_turn};
///
/// let transport = ScenarioBuilder::new("session-1")
///     .exchange(vec![assistant_turn("msg_1", "Hello!")])
///     .build();
/// assert_eq!(transport.queued_count(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    session_id: String,
    exchanges: Vec<Vec<Message>>,
}

impl ScenarioBuilder {
    /// Start a scenario for `session_id`.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            exchanges: Vec::new(),
        }
    }

    /// Append the lines the backend produces for one step of the exchange.
    #[must_use]
    pub fn exchange(mut self, messages: Vec<Message>) -> Self {
        self.exchanges.push(messages);
        self
    }

    /// A [`MockTransport`] loaded with `system/init`, every exchange, then a
    /// successful result.
    #[must_use]
    pub fn build(self) -> MockTransport {
        self.build_into(MockTransport::new())
    }

    /// Like [`build`](Self::build), appending to an existing transport.
    #[must_use]
    pub fn build_into(self, transport: MockTransport) -> MockTransport {
        transport.enqueue_value(&system_init(&self.session_id));
        self.enqueue_exchanges(&transport);
        transport.enqueue_value(&result_success(&self.session_id));
        transport
    }

    /// A [`MockTransport`] holding only the exchanges, without the init and
    /// result bookends.
    #[must_use]
    pub fn build_raw(self) -> MockTransport {
        let transport = MockTransport::new();
        self.enqueue_exchanges(&transport);
        transport
    }

    fn enqueue_exchanges(&self, transport: &MockTransport) {
        for msg in self.exchanges.iter().flatten() {
            transport.enqueue_value(msg);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
