//! [`StreamingQueryClient`]: run a query and stream its text fragments.
//!
//! # Lifecycle
//!
//! Every call to [`query()`](StreamingQueryClient::query) walks one state
//! machine and never returns to the start:
//!
//! ```text
//! Idle → Requesting → Streaming → { Completed | Failed }
//! ```
//!
//! `Requesting` covers request validation, backend discovery, spawn and
//! connect; a failure there is returned directly from `query()`. `Streaming`
//! covers fragment delivery through the returned [`FragmentStream`]; a failure
//! there is the stream's last item.
//!
//! # Turn accounting
//!
//! Assistant lines (and `message_start` events when partial messages are on)
//! that share an API message id form one conversation turn. When the request
//! declares `max_conversation_turns = N` and the backend opens turn N+1, the
//! client interrupts the backend and ends the stream normally without
//! delivering anything from that turn.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendClient, CliBackend};
use crate::config::ClientOptions;
use crate::errors::{Error, Result};
use crate::request::QueryRequest;
use crate::transport::{MessageValueStream, Transport};
use crate::types::fragment::ResponseFragment;
use crate::types::messages::{Message, ResultMessage};

// ── Cancellation / timeout helpers ───────────────────────────────────────────

/// Wait for the token to fire, or pend forever if `None`.
async fn cancelled_or_pending(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Pull the next JSON value with an optional deadline and cancellation token.
///
/// `Ok(None)` means the backend closed its output.
async fn next_value(
    values: &mut MessageValueStream,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<Option<serde_json::Value>> {
    tokio::select! {
        biased;
        _ = cancelled_or_pending(cancel) => Err(Error::Cancelled),
        item = async {
            match timeout {
                Some(d) => tokio::time::timeout(d, values.next()).await.map_err(|_| {
                    Error::Timeout(format!("no backend output for {}s", d.as_secs_f64()))
                }),
                None => Ok(values.next().await),
            }
        } => item.and_then(Option::transpose),
    }
}

// ── Query state ──────────────────────────────────────────────────────────────

/// Where a query is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryState {
    /// Created, not started.
    #[default]
    Idle,
    /// Validating the request and starting the backend.
    Requesting,
    /// Delivering fragments.
    Streaming,
    /// The backend finished the exchange. Terminal.
    Completed,
    /// The exchange aborted with an error. Terminal.
    Failed,
}

impl QueryState {
    /// `true` for [`Completed`](Self::Completed) and [`Failed`](Self::Failed).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Bookkeeping reported by the backend's final `result` message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySummary {
    /// Session the backend ran the query in.
    pub session_id: Option<String>,
    /// Conversation turns the backend reports having taken.
    pub num_turns: u32,
    /// Wall-clock duration reported by the backend.
    pub duration_ms: u64,
    /// Cost reported by the backend, when available.
    pub total_cost_usd: Option<f64>,
    /// The exchange stopped at `max_conversation_turns`.
    pub reached_turn_limit: bool,
}

impl From<&ResultMessage> for QuerySummary {
    fn from(r: &ResultMessage) -> Self {
        Self {
            session_id: r.session_id.clone(),
            num_turns: r.num_turns,
            duration_ms: r.duration_ms,
            total_cost_usd: r.total_cost_usd,
            reached_turn_limit: r.reached_turn_limit(),
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    state: QueryState,
    summary: Option<QuerySummary>,
}

type SharedProgress = Arc<Mutex<Progress>>;

fn set_state(progress: &SharedProgress, state: QueryState) {
    if let Ok(mut p) = progress.lock() {
        tracing::debug!(from = ?p.state, to = ?state, "query state");
        p.state = state;
    }
}

/// Counts conversation turns by distinct API message id.
#[derive(Debug, Default)]
struct TurnCounter {
    current: u32,
    last_id: Option<String>,
}

impl TurnCounter {
    /// Record a turn marker and return the turn it belongs to. An empty id
    /// always opens a new turn.
    fn observe(&mut self, id: &str) -> u32 {
        if id.is_empty() || self.last_id.as_deref() != Some(id) {
            self.current += 1;
            self.last_id = Some(id.to_owned());
        }
        self.current
    }
}

// ── FragmentStream ───────────────────────────────────────────────────────────

/// Lazy, forward-only stream of [`ResponseFragment`]s for one query.
///
/// Fragments arrive in the order the backend emits them. The stream ends after
/// the exchange completes, or after yielding exactly one error. Dropping it
/// early stops the backend.
pub struct FragmentStream {
    inner: Pin<Box<dyn Stream<Item = Result<ResponseFragment>> + Send>>,
    progress: SharedProgress,
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl FragmentStream {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QueryState {
        self.progress
            .lock()
            .map(|p| p.state)
            .unwrap_or(QueryState::Failed)
    }

    /// The backend's final accounting, once its `result` message arrived.
    #[must_use]
    pub fn summary(&self) -> Option<QuerySummary> {
        self.progress.lock().ok().and_then(|p| p.summary.clone())
    }

    /// Drain the stream, concatenating every fragment.
    ///
    /// # Errors
    ///
    /// The first error the stream yields.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(fragment?.text());
        }
        Ok(text)
    }
}

impl Stream for FragmentStream {
    type Item = Result<ResponseFragment>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

// ── StreamingQueryClient ─────────────────────────────────────────────────────

/// Runs queries against a [`BackendClient`], one backend session per query.
///
/// # Example
///
/// ```rust,no_run
/// use claude_query::{QueryRequest, StreamingQueryClient};
/// use tokio_stream::StreamExt;
///
/// # async fn example() -> claude_query::Result<()> {
/// let client = StreamingQueryClient::new();
/// let mut fragments = client.query(QueryRequest::new("What is 2 + 2?")).await?;
/// while let Some(fragment) = fragments.next().await {
///     print!("{}", fragment?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamingQueryClient {
    backend: Arc<dyn BackendClient>,
    options: ClientOptions,
}

impl std::fmt::Debug for StreamingQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingQueryClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for StreamingQueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingQueryClient {
    /// A client backed by the Claude Code CLI with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// A client backed by the Claude Code CLI.
    #[must_use]
    pub fn with_options(options: ClientOptions) -> Self {
        Self::with_backend(Arc::new(CliBackend), options)
    }

    /// A client backed by any [`BackendClient`] (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Arc<dyn BackendClient>, options: ClientOptions) -> Self {
        Self { backend, options }
    }

    /// The client's transport options.
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Start a query and return its fragment stream.
    ///
    /// # Errors
    ///
    /// Anything that fails before the first fragment can be read:
    /// - [`Error::Config`] for an empty prompt or an invalid [`QueryConfig`](crate::QueryConfig).
    /// - [`Error::CliNotFound`] when the backend executable cannot be located.
    /// - [`Error::Timeout`], [`Error::SpawnFailed`], … when the backend does
    ///   not start.
    pub async fn query(&self, request: impl Into<QueryRequest>) -> Result<FragmentStream> {
        let request = request.into();
        let progress = SharedProgress::default();

        set_state(&progress, QueryState::Requesting);
        let transport = match self.start(&request).await {
            Ok(t) => t,
            Err(e) => {
                set_state(&progress, QueryState::Failed);
                tracing::debug!(error = %e, "query failed to start");
                return Err(e);
            }
        };
        set_state(&progress, QueryState::Streaming);

        let inner = fragments(
            transport,
            request.max_conversation_turns(),
            self.options.include_partial_messages,
            self.options.read_timeout,
            self.options.cancellation_token.clone(),
            Arc::clone(&progress),
        );
        Ok(FragmentStream {
            inner: Box::pin(inner),
            progress,
        })
    }

    async fn start(&self, request: &QueryRequest) -> Result<Arc<dyn Transport>> {
        request.validate()?;
        tracing::debug!(
            prompt_chars = request.prompt().chars().count(),
            config = ?request.config(),
            "starting query"
        );

        let transport = self.backend.open(request, &self.options).await?;
        let connected = match self.options.connect_timeout {
            Some(d) => tokio::time::timeout(d, transport.connect())
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout(format!(
                        "connect timed out after {}s",
                        d.as_secs_f64()
                    )))
                }),
            None => transport.connect().await,
        };
        if let Err(e) = connected {
            let _ = transport.close().await;
            return Err(e);
        }
        Ok(transport)
    }
}

/// Run a query on a default CLI-backed client.
///
/// # Errors
///
/// See [`StreamingQueryClient::query`].
pub async fn query(request: impl Into<QueryRequest>) -> Result<FragmentStream> {
    StreamingQueryClient::new().query(request).await
}

// ── Fragment pump ────────────────────────────────────────────────────────────

/// Why the read loop stopped before the backend closed its output.
enum Stop {
    /// A `result` message ended the exchange.
    Finished(Result<()>),
    /// The client cut the exchange short (turn guard, cancellation, timeout).
    Aborted(Result<()>),
}

fn fragments(
    transport: Arc<dyn Transport>,
    max_turns: Option<u32>,
    include_partial_messages: bool,
    read_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    progress: SharedProgress,
) -> impl Stream<Item = Result<ResponseFragment>> + Send {
    async_stream::stream! {
        let mut values = transport.read_messages();
        let mut turns = TurnCounter::default();
        let mut stop = None;

        loop {
            let value = match next_value(&mut values, read_timeout, cancel.as_ref()).await {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(e) => {
                    stop = Some(Stop::Aborted(Err(e)));
                    break;
                }
            };

            if !Message::is_known_type(&value) {
                tracing::debug!(kind = ?value.get("type"), "skipping unrecognised backend message");
                continue;
            }
            let msg: Message = match serde_json::from_value(value) {
                Ok(m) => m,
                Err(e) => {
                    stop = Some(Stop::Aborted(Err(Error::Json(e))));
                    break;
                }
            };

            let marker = match &msg {
                Message::Assistant(a) => Some(a.message.id.as_str()),
                Message::StreamEvent(e) => e.message_start_id(),
                _ => None,
            };
            if let Some(id) = marker {
                let turn = turns.observe(id);
                if max_turns.is_some_and(|max| turn > max) {
                    tracing::debug!(turn, ?max_turns, "turn limit reached, stopping backend");
                    if let Ok(mut p) = progress.lock() {
                        p.summary = Some(QuerySummary {
                            num_turns: turn - 1,
                            reached_turn_limit: true,
                            session_id: msg.session_id().map(str::to_owned),
                            ..QuerySummary::default()
                        });
                    }
                    stop = Some(Stop::Aborted(Ok(())));
                    break;
                }
            }

            match msg {
                Message::System(ref s) => {
                    tracing::debug!(
                        subtype = %s.subtype,
                        session_id = %s.session_id,
                        model = %s.model,
                        "backend system message"
                    );
                }
                Message::Assistant(_) if !include_partial_messages => {
                    for text in msg.assistant_text_blocks() {
                        yield Ok(ResponseFragment::new(text, turns.current));
                    }
                }
                Message::StreamEvent(ref e) if include_partial_messages => {
                    if let Some(text) = e.text_delta() {
                        yield Ok(ResponseFragment::new(text, turns.current));
                    }
                }
                Message::Result(ref r) => {
                    if let Ok(mut p) = progress.lock() {
                        p.summary = Some(QuerySummary::from(r));
                    }
                    let outcome = if r.is_failure() {
                        Err(Error::Backend {
                            subtype: r.subtype.clone(),
                            message: r
                                .result
                                .clone()
                                .unwrap_or_else(|| "no details reported".into()),
                        })
                    } else {
                        Ok(())
                    };
                    stop = Some(Stop::Finished(outcome));
                    break;
                }
                _ => {}
            }
        }

        // Release the channel before closing so the reader task can exit.
        drop(values);

        let outcome = match stop {
            Some(Stop::Finished(outcome)) => {
                if let Err(e) = transport.close().await {
                    tracing::warn!(error = %e, "backend did not shut down cleanly");
                }
                outcome
            }
            Some(Stop::Aborted(outcome)) => {
                if let Err(e) = transport.interrupt().await {
                    tracing::debug!(error = %e, "backend interrupt after abort");
                }
                if let Err(e) = transport.close().await {
                    tracing::debug!(error = %e, "backend close after abort");
                }
                outcome
            }
            None => match transport.close().await {
                Ok(Some(0)) => Err(Error::Transport(
                    "backend closed the stream before a result".into(),
                )),
                Ok(code) => Err(Error::ProcessExited {
                    code,
                    stderr: transport.stderr_tail(),
                }),
                Err(e) => Err(e),
            },
        };

        match outcome {
            Ok(()) => set_state(&progress, QueryState::Completed),
            Err(e) => {
                set_state(&progress, QueryState::Failed);
                yield Err(e);
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::testing::{
        MockBackend, MockTransport, ScenarioBuilder, assistant_text, assistant_turn,
        result_error, result_max_turns, text_delta, message_start,
    };

    fn client(backend: MockBackend) -> StreamingQueryClient {
        StreamingQueryClient::with_backend(Arc::new(backend), ClientOptions::default())
    }

    async fn drain(mut stream: FragmentStream) -> (Vec<ResponseFragment>, Option<Error>, FragmentStream) {
        let mut fragments = Vec::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(f) => fragments.push(f),
                Err(e) => error = Some(e),
            }
        }
        (fragments, error, stream)
    }

    #[test]
    fn turn_counter_groups_by_message_id() {
        let mut turns = TurnCounter::default();
        assert_eq!(turns.observe("a"), 1);
        assert_eq!(turns.observe("a"), 1);
        assert_eq!(turns.observe("b"), 2);
        assert_eq!(turns.observe(""), 3);
        assert_eq!(turns.observe(""), 4);
    }

    #[test]
    fn terminal_states() {
        assert!(QueryState::Completed.is_terminal());
        assert!(QueryState::Failed.is_terminal());
        assert!(!QueryState::Streaming.is_terminal());
        assert_eq!(QueryState::default(), QueryState::Idle);
    }

    #[tokio::test]
    async fn fragments_concatenate_in_emission_order() {
        let backend = MockBackend::new().script(
            ScenarioBuilder::new("s1")
                .exchange(vec![assistant_text("The answer"), assistant_text(" is 4.")])
                .build(),
        );
        let stream = client(backend)
            .query(QueryRequest::new("What is 2 + 2?"))
            .await
            .unwrap();
        assert_eq!(stream.state(), QueryState::Streaming);
        assert_eq!(stream.collect_text().await.unwrap(), "The answer is 4.");
    }

    #[tokio::test]
    async fn completed_stream_reports_summary() {
        let backend = MockBackend::new()
            .script(ScenarioBuilder::new("s9").exchange(vec![assistant_text("4")]).build());
        let stream = client(backend).query("What is 2 + 2?").await.unwrap();
        let (fragments, error, stream) = drain(stream).await;

        assert!(error.is_none());
        assert_eq!(fragments, [ResponseFragment::new("4", 1)]);
        assert_eq!(stream.state(), QueryState::Completed);
        let summary = stream.summary().unwrap();
        assert_eq!(summary.session_id.as_deref(), Some("s9"));
        assert!(!summary.reached_turn_limit);
    }

    #[tokio::test]
    async fn empty_prompt_fails_before_backend_is_opened() {
        let backend = Arc::new(MockBackend::new());
        let client = StreamingQueryClient::with_backend(backend.clone(), ClientOptions::default());
        let err = client.query("  ").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(backend.opened(), 0);
    }

    #[tokio::test]
    async fn backend_not_found_is_returned_from_query() {
        let backend = MockBackend::new().not_found();
        let err = client(backend).query("hi").await.unwrap_err();
        assert!(err.is_backend_not_found());
    }

    #[tokio::test]
    async fn connect_timeout_fires() {
        let transport = MockTransport::new();
        transport.set_connect_delay(Duration::from_secs(5));
        let options = ClientOptions::builder()
            .connect_timeout(Some(Duration::from_millis(20)))
            .build();
        let client = StreamingQueryClient::with_backend(
            Arc::new(MockBackend::new().script(transport)),
            options,
        );
        let err = client.query("hi").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn turn_limit_stops_before_next_turn() {
        let backend = MockBackend::new().script(
            ScenarioBuilder::new("s1")
                .exchange(vec![assistant_turn("m1", "first")])
                .exchange(vec![assistant_turn("m2", "second")])
                .build(),
        );
        let request = QueryRequest::new("go")
            .with_config(QueryConfig::builder().max_conversation_turns(1_u32).build());
        let stream = client(backend).query(request).await.unwrap();
        let (fragments, error, stream) = drain(stream).await;

        assert!(error.is_none());
        assert_eq!(fragments, [ResponseFragment::new("first", 1)]);
        assert_eq!(stream.state(), QueryState::Completed);
        let summary = stream.summary().unwrap();
        assert!(summary.reached_turn_limit);
        assert_eq!(summary.num_turns, 1);
    }

    #[tokio::test]
    async fn lines_of_one_message_count_as_one_turn() {
        let backend = MockBackend::new().script(
            ScenarioBuilder::new("s1")
                .exchange(vec![assistant_turn("m1", "a"), assistant_turn("m1", "b")])
                .build(),
        );
        let request = QueryRequest::new("go")
            .with_config(QueryConfig::builder().max_conversation_turns(1_u32).build());
        let text = client(backend)
            .query(request)
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn backend_turn_limit_result_completes_normally() {
        let backend = MockBackend::new().script(
            ScenarioBuilder::new("s1")
                .exchange(vec![assistant_text("partial"), result_max_turns("s1", 3)])
                .build_raw(),
        );
        let stream = client(backend).query("go").await.unwrap();
        let (fragments, error, stream) = drain(stream).await;
        assert!(error.is_none());
        assert_eq!(fragments.len(), 1);
        assert_eq!(stream.state(), QueryState::Completed);
        assert!(stream.summary().unwrap().reached_turn_limit);
    }

    #[tokio::test]
    async fn backend_error_after_fragments_keeps_them() {
        let backend = MockBackend::new().script(
            ScenarioBuilder::new("s1")
                .exchange(vec![assistant_text("one"), result_error("s1", "API overloaded")])
                .build_raw(),
        );
        let stream = client(backend).query("go").await.unwrap();
        let (fragments, error, stream) = drain(stream).await;

        assert_eq!(fragments, [ResponseFragment::new("one", 1)]);
        let error = error.unwrap();
        assert!(error.to_string().contains("API overloaded"), "{error}");
        assert_eq!(stream.state(), QueryState::Failed);
    }

    #[tokio::test]
    async fn missing_result_with_nonzero_exit_is_process_exited() {
        let transport = ScenarioBuilder::new("s1")
            .exchange(vec![assistant_text("cut")])
            .build_raw();
        transport.set_exit_code(Some(1));
        transport.set_stderr("rate limited");
        let stream = client(MockBackend::new().script(transport))
            .query("go")
            .await
            .unwrap();
        let (fragments, error, _) = drain(stream).await;
        assert_eq!(fragments.len(), 1);
        assert!(
            matches!(error, Some(Error::ProcessExited { code: Some(1), ref stderr }) if stderr == "rate limited"),
            "{error:?}"
        );
    }

    #[tokio::test]
    async fn missing_result_with_clean_exit_is_transport_error() {
        let transport = ScenarioBuilder::new("s1").build_raw();
        let err = client(MockBackend::new().script(transport))
            .query("go")
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_line_aborts_stream() {
        let transport = MockTransport::new();
        transport.enqueue("{not json");
        let err = client(MockBackend::new().script(transport))
            .query("go")
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[tokio::test]
    async fn unknown_message_types_are_skipped() {
        let transport = MockTransport::new();
        transport.enqueue(r#"{"type":"rate_limit_event","session_id":"s1"}"#);
        let transport = ScenarioBuilder::new("s1")
            .exchange(vec![assistant_text("ok")])
            .build_into(transport);
        let text = client(MockBackend::new().script(transport))
            .query("go")
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn unmodelled_content_blocks_do_not_abort_query() {
        let transport = MockTransport::new();
        transport.enqueue(
            r#"{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"4"}]}}"#,
        );
        transport.enqueue(
            r#"{"type":"assistant","message":{"id":"m2","content":[{"type":"redacted_thinking","data":"x"}]}}"#,
        );
        transport.enqueue_value(&crate::testing::result_success("s1"));
        let text = client(MockBackend::new().script(transport))
            .query("What is 2 + 2?")
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_cli_is_killed_within_close_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("claude");
        std::fs::write(
            &cli,
            "#!/bin/sh\n\
             trap '' INT\n\
             echo '{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"s1\"}'\n\
             sleep 20\n",
        )
        .unwrap();
        std::fs::set_permissions(&cli, std::fs::Permissions::from_mode(0o755)).unwrap();

        let options = ClientOptions::builder()
            .cli_path(cli)
            .read_timeout(Some(Duration::from_millis(200)))
            .close_timeout(Some(Duration::from_millis(300)))
            .build();
        let started = std::time::Instant::now();
        let err = StreamingQueryClient::with_options(options)
            .query("hi")
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn partial_messages_yield_deltas_not_full_text() {
        let backend = MockBackend::new().script(
            ScenarioBuilder::new("s1")
                .exchange(vec![
                    message_start("s1", "m1"),
                    text_delta("s1", "Hel"),
                    text_delta("s1", "lo"),
                    assistant_turn("m1", "Hello"),
                ])
                .build(),
        );
        let options = ClientOptions::builder().include_partial_messages(true).build();
        let client = StreamingQueryClient::with_backend(Arc::new(backend), options);
        let stream = client.query("hi").await.unwrap();
        let (fragments, error, _) = drain(stream).await;
        assert!(error.is_none());
        assert_eq!(
            fragments,
            [ResponseFragment::new("Hel", 1), ResponseFragment::new("lo", 1)]
        );
    }

    #[tokio::test]
    async fn read_timeout_fails_stream() {
        let transport = ScenarioBuilder::new("s1")
            .exchange(vec![assistant_text("slow")])
            .build();
        transport.set_recv_delay(Duration::from_secs(5));
        let options = ClientOptions::builder()
            .read_timeout(Some(Duration::from_millis(20)))
            .build();
        let client =
            StreamingQueryClient::with_backend(Arc::new(MockBackend::new().script(transport)), options);
        let err = client.query("hi").await.unwrap().collect_text().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn cancellation_ends_stream_and_interrupts_backend() {
        let transport = Arc::new(
            ScenarioBuilder::new("s1")
                .exchange(vec![assistant_text("never")])
                .build(),
        );
        transport.set_recv_delay(Duration::from_secs(5));
        let token = CancellationToken::new();
        let options = ClientOptions::builder()
            .cancellation_token(token.clone())
            .build();
        let client = StreamingQueryClient::with_backend(
            Arc::new(MockBackend::new().script_shared(transport.clone())),
            options,
        );
        let stream = client.query("hi").await.unwrap();
        token.cancel();
        let (fragments, error, stream) = drain(stream).await;

        assert!(fragments.is_empty());
        assert!(matches!(error, Some(Error::Cancelled)));
        assert_eq!(stream.state(), QueryState::Failed);
        assert!(transport.was_interrupted());
        assert!(!transport.is_ready());
    }

    #[tokio::test]
    async fn each_query_gets_its_own_backend_session() {
        let backend = Arc::new(
            MockBackend::new()
                .script(ScenarioBuilder::new("a").exchange(vec![assistant_text("first")]).build())
                .script(ScenarioBuilder::new("b").exchange(vec![assistant_text("second")]).build()),
        );
        let client = StreamingQueryClient::with_backend(backend.clone(), ClientOptions::default());

        let first = client.query("one").await.unwrap().collect_text().await.unwrap();
        let second = client.query("two").await.unwrap().collect_text().await.unwrap();

        assert_eq!((first.as_str(), second.as_str()), ("first", "second"));
        assert_eq!(backend.opened(), 2);
        assert_eq!(backend.prompts(), ["one", "two"]);
    }
}
