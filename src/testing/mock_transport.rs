//! In-memory transport that replays scripted backend output.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::{Error, Result};
use crate::transport::{MessageValueStream, Transport};

/// A scripted, in-memory [`Transport`].
///
/// Pre-load NDJSON lines via [`enqueue`](Self::enqueue), then hand the
/// transport to a [`MockBackend`](super::MockBackend). After the query ran,
/// [`was_interrupted`](Self::was_interrupted) tells whether the client stopped
/// the backend early.
pub struct MockTransport {
    lines: Mutex<VecDeque<String>>,
    ready: AtomicBool,
    interrupted: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    recv_delay: Mutex<Option<Duration>>,
    exit_code: Mutex<Option<i32>>,
    stderr: Mutex<String>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &self.queued_count())
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .field("interrupted", &self.interrupted.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// An empty transport that exits with code 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            ready: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            connect_delay: Mutex::new(None),
            recv_delay: Mutex::new(None),
            exit_code: Mutex::new(Some(0)),
            stderr: Mutex::new(String::new()),
        }
    }

    /// Delay [`connect()`](Transport::connect) by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().expect("lock") = Some(delay);
    }

    /// Delay every line yielded by [`read_messages()`](Transport::read_messages).
    pub fn set_recv_delay(&self, delay: Duration) {
        *self.recv_delay.lock().expect("lock") = Some(delay);
    }

    /// Exit code reported by [`close()`](Transport::close). `None` simulates a
    /// signal-killed process.
    pub fn set_exit_code(&self, code: Option<i32>) {
        *self.exit_code.lock().expect("lock") = code;
    }

    /// Text returned by [`stderr_tail()`](Transport::stderr_tail).
    pub fn set_stderr(&self, stderr: impl Into<String>) {
        *self.stderr.lock().expect("lock") = stderr.into();
    }

    /// Queue a raw line as if the backend had written it to stdout.
    pub fn enqueue(&self, line: &str) {
        self.lines.lock().expect("lock").push_back(line.to_owned());
    }

    /// Queue a serializable value as one JSON line.
    pub fn enqueue_value(&self, value: &impl serde::Serialize) {
        let json = serde_json::to_string(value).expect("serialize");
        self.enqueue(&json);
    }

    /// Lines not yet handed out by `read_messages`.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.lines.lock().expect("lock").len()
    }

    /// `true` once [`interrupt()`](Transport::interrupt) has been called.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        let delay = *self.connect_delay.lock().expect("lock");
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn read_messages(&self) -> MessageValueStream {
        let lines: Vec<String> = self.lines.lock().expect("lock").drain(..).collect();
        let recv_delay = *self.recv_delay.lock().expect("lock");
        let (tx, rx) = mpsc::channel(lines.len().max(1));

        tokio::spawn(async move {
            for line in lines {
                if let Some(delay) = recv_delay {
                    tokio::time::sleep(delay).await;
                }
                let parsed = serde_json::from_str::<serde_json::Value>(&line).map_err(|e| {
                    Error::ParseError {
                        message: e.to_string(),
                        line: line.clone(),
                    }
                });
                if tx.send(parsed).await.is_err() {
                    break;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn interrupt(&self) -> Result<()> {
        self.interrupted.store(true, Ordering::Release);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<Option<i32>> {
        self.ready.store(false, Ordering::Release);
        Ok(*self.exit_code.lock().expect("lock"))
    }

    fn stderr_tail(&self) -> String {
        self.stderr.lock().expect("lock").clone()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
