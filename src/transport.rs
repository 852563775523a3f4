//! Transport layer: one live backend session.
//!
//! The [`Transport`] trait abstracts the channel between the client and a
//! single backend process. [`CliTransport`] is the production implementation:
//! it spawns the Claude CLI in `--print` mode and reads NDJSON from its stdout.
//!
//! # Architecture
//!
//! `CliTransport::connect()` spawns the CLI with no stdin (the prompt is
//! passed as an argument), then starts a background reader task that parses
//! stdout lines and forwards JSON values through a `tokio::sync::mpsc`
//! channel. `read_messages()` hands out a `ReceiverStream` over that channel
//! exactly once. A second task drains stderr, keeping the last
//! [`STDERR_TAIL_LINES`] lines for error reports.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ClientOptions;
use crate::errors::{Error, Result};
use crate::request::QueryRequest;

/// Stream of parsed JSON values read from a backend.
pub type MessageValueStream = Pin<Box<dyn Stream<Item = Result<serde_json::Value>> + Send>>;

/// Number of stderr lines kept for [`Error::ProcessExited`] reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// Longest raw line echoed back in an [`Error::ParseError`].
const MAX_ERROR_LINE_CHARS: usize = 200;

// ── Transport Trait ──────────────────────────────────────────────────────────

/// One backend session, servicing exactly one request.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the session (e.g., spawn the CLI process).
    async fn connect(&self) -> Result<()>;

    /// Return the stream of parsed JSON values. Only the first call yields
    /// data; later calls return an empty stream.
    fn read_messages(&self) -> MessageValueStream;

    /// Ask the backend to stop (SIGINT on Unix).
    async fn interrupt(&self) -> Result<()>;

    /// Returns `true` between a successful `connect` and `close`.
    fn is_ready(&self) -> bool;

    /// Close the session and wait for the backend to exit.
    ///
    /// Returns the exit code if available.
    async fn close(&self) -> Result<Option<i32>>;

    /// Last lines the backend wrote to its diagnostic stream.
    fn stderr_tail(&self) -> String {
        String::new()
    }
}

// ── CliTransport ─────────────────────────────────────────────────────────────

/// Production transport that runs the Claude CLI as a subprocess.
pub struct CliTransport {
    cli_path: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    env: HashMap<String, String>,
    close_timeout: Option<Duration>,
    // `process` uses `std::sync::Mutex` because it must be accessed in the
    // synchronous `Drop` impl.
    process: Mutex<Option<Child>>,
    message_rx: Mutex<Option<mpsc::Receiver<Result<serde_json::Value>>>>,
    reader_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stderr_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    stderr_callback: Option<Arc<dyn Fn(String) + Send + Sync>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    ready: AtomicBool,
}

impl std::fmt::Debug for CliTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliTransport")
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl CliTransport {
    /// Create a new `CliTransport`.
    ///
    /// This does NOT spawn the process; call [`connect()`](Transport::connect) first.
    #[must_use]
    pub fn new(
        cli_path: PathBuf,
        args: Vec<String>,
        cwd: PathBuf,
        env: HashMap<String, String>,
        stderr_callback: Option<Arc<dyn Fn(String) + Send + Sync>>,
    ) -> Self {
        Self {
            cli_path,
            args,
            cwd,
            env,
            close_timeout: None,
            process: Mutex::new(None),
            message_rx: Mutex::new(None),
            reader_handle: tokio::sync::Mutex::new(None),
            stderr_handle: tokio::sync::Mutex::new(None),
            stderr_callback,
            stderr_tail: Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES))),
            ready: AtomicBool::new(false),
        }
    }

    /// Build the transport for `request`, running the CLI found at `cli_path`.
    ///
    /// The process runs in the request's `working_directory`, falling back to
    /// the current directory.
    #[must_use]
    pub fn for_request(cli_path: PathBuf, request: &QueryRequest, options: &ClientOptions) -> Self {
        let cwd = request
            .config()
            .and_then(|c| c.working_directory.clone())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let mut transport = Self::new(
            cli_path,
            request.to_cli_args(options.include_partial_messages),
            cwd,
            options.to_env(),
            options.stderr_callback.clone(),
        );
        transport.close_timeout = options.close_timeout;
        transport
    }

    /// Arguments the CLI will be started with.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Parse one stdout line, or `None` for a blank line.
fn parse_line(line: &str) -> Option<Result<serde_json::Value>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<serde_json::Value>(line).map_err(|e| Error::ParseError {
            message: e.to_string(),
            line: truncate_line(line),
        }),
    )
}

fn truncate_line(line: &str) -> String {
    match line.char_indices().nth(MAX_ERROR_LINE_CHARS) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_owned(),
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn connect(&self) -> Result<()> {
        use std::process::Stdio;

        let mut cmd = tokio::process::Command::new(&self.cli_path);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        // Keep the child from believing it runs nested inside another Claude
        // Code session. Removed after the env loop so callers cannot re-add them.
        cmd.env_remove("CLAUDECODE");
        cmd.env_remove("CLAUDE_CODE_SSE_PORT");
        cmd.env_remove("CLAUDE_CODE_ENTRYPOINT");

        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        // ENOENT from spawn means either the binary or the working directory
        // is gone. Only the former is a missing backend.
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound if !self.cwd.is_dir() => Error::Config(format!(
                "working directory does not exist: {}",
                self.cwd.display()
            )),
            std::io::ErrorKind::NotFound => Error::CliNotFound,
            _ => Error::SpawnFailed(e),
        })?;
        tracing::debug!(
            cli = %self.cli_path.display(),
            cwd = %self.cwd.display(),
            pid = ?child.id(),
            "spawned Claude CLI"
        );

        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("failed to capture child stdout".into()))?;
        let child_stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel(256);

        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(child_stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(result) = parse_line(&line) else {
                            continue;
                        };
                        if tx.send(result).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Io(e))).await;
                        break;
                    }
                }
            }
        });

        if let Some(stderr) = child_stderr {
            let callback = self.stderr_callback.clone();
            let tail = Arc::clone(&self.stderr_tail);
            let handle = tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!(target: "claude_query::stderr", "{line}");
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                    }
                    if let Some(cb) = &callback {
                        cb(line);
                    }
                }
            });
            *self.stderr_handle.lock().await = Some(handle);
        }

        *self.process.lock().expect("process lock") = Some(child);
        *self.message_rx.lock().expect("message_rx lock") = Some(rx);
        *self.reader_handle.lock().await = Some(reader_handle);
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn read_messages(&self) -> MessageValueStream {
        let rx = self.message_rx.lock().expect("message_rx lock").take();
        match rx {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            None => {
                tracing::debug!("read_messages() called after receiver was already taken");
                Box::pin(tokio_stream::empty())
            }
        }
    }

    async fn interrupt(&self) -> Result<()> {
        let guard = self.process.lock().expect("process lock");
        if let Some(pid) = guard.as_ref().and_then(Child::id) {
            #[cfg(unix)]
            {
                use nix::sys::signal::{Signal, kill};
                use nix::unistd::Pid;
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
            }
            #[cfg(windows)]
            {
                use windows_sys::Win32::System::Console::{
                    CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent,
                };
                // CTRL_C is ignored by CREATE_NEW_PROCESS_GROUP children; the
                // child's PID doubles as its group ID.
                let _ = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
            }
            tracing::debug!(pid, "interrupted Claude CLI");
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<Option<i32>> {
        self.ready.store(false, Ordering::Release);

        // Unread output would otherwise keep the reader blocked on a full channel.
        self.message_rx.lock().expect("message_rx lock").take();

        let mut reader = self.reader_handle.lock().await.take();
        let mut stderr = self.stderr_handle.lock().await.take();
        let maybe_child = self.process.lock().expect("process lock").take();
        let Some(mut child) = maybe_child else {
            if let Some(handle) = reader {
                let _ = handle.await;
            }
            return Ok(None);
        };

        // One deadline covers the whole shutdown: stdout EOF, process exit and
        // the stderr drain.
        let shutdown = async {
            if let Some(handle) = reader.as_mut() {
                let _ = handle.await;
            }
            let status = child.wait().await;
            if let Some(handle) = stderr.as_mut() {
                let _ = handle.await;
            }
            status
        };
        let status = match self.close_timeout {
            Some(d) => match tokio::time::timeout(d, shutdown).await {
                Ok(status) => status,
                Err(_) => {
                    let _ = child.kill().await;
                    // Descendants may still hold the pipes open.
                    for handle in [reader, stderr].into_iter().flatten() {
                        handle.abort();
                    }
                    tracing::debug!("Claude CLI did not exit in time, killed");
                    return Err(Error::Timeout(format!(
                        "close timed out after {}s, process killed",
                        d.as_secs_f64()
                    )));
                }
            },
            None => shutdown.await,
        };
        let code = status
            .map_err(|e| Error::Transport(format!("wait failed: {e}")))?
            .code();
        tracing::debug!(?code, "Claude CLI exited");
        Ok(code)
    }

    fn stderr_tail(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }
}

impl Drop for CliTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.process.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
