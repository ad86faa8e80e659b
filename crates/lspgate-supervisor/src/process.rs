//! One supervised language server subprocess.
//!
//! Each process runs three independent flows that must not block one
//! another: a writer task draining an mpsc channel into stdin, a reader
//! task decoding stdout frames, and an exit watcher. Outbound traffic for
//! the client is published on a broadcast channel in the exact order the
//! server emitted it; a slow client lags on its own receiver and never
//! stalls the stdout reader.

use crate::config::LaunchSpec;
use crate::correlator::RequestCorrelator;
use crate::error::{SupervisorError, SupervisorResult};
use lspgate_protocol::{
    encode, encode_value, FrameDecoder, Incoming, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse,
};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

const STDIN_QUEUE_DEPTH: usize = 64;
const OUTBOUND_QUEUE_DEPTH: usize = 256;
const LIVENESS_DELAY: Duration = Duration::from_millis(150);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle state of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Ready,
    Crashed,
    Stopped,
}

/// Sent to the registry when a process exits. Carries the pid so the
/// registry can tell a stale event apart from one for the process it
/// currently holds under the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub key: String,
    pub pid: Option<u32>,
}

/// A running language server and its I/O pipeline.
#[derive(Debug)]
pub struct LanguageServerProcess {
    spec: LaunchSpec,
    key: String,
    pid: Option<u32>,
    state: Arc<RwLock<ProcessState>>,
    child: Arc<Mutex<Option<Child>>>,
    stdin_tx: mpsc::Sender<Vec<u8>>,
    correlator: Arc<RequestCorrelator>,
    outbound: broadcast::Sender<Value>,
}

impl LanguageServerProcess {
    /// Install (if needed) and spawn the server, wire up its I/O tasks,
    /// and verify it survived startup.
    ///
    /// `exit_tx`, when present, receives an [`ExitEvent`] once the process
    /// exits for any reason.
    pub async fn spawn(
        spec: LaunchSpec,
        key: impl Into<String>,
        workspace_root: &Path,
        exit_tx: Option<mpsc::UnboundedSender<ExitEvent>>,
    ) -> SupervisorResult<Arc<Self>> {
        let key = key.into();
        ensure_installed(&spec).await?;

        let args = spec.resolved_args(workspace_root)?;
        debug!(language = %spec.language, command = %spec.command, ?args, "starting language server");

        let mut child = Command::new(&spec.command)
            .args(&args)
            .envs(&spec.env)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SupervisorError::launch(&spec.language, e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SupervisorError::launch(&spec.language, "failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::launch(&spec.language, "failed to get stdout"))?;
        let stderr = child.stderr.take();

        // An immediate exit (missing JVM, bad arguments) must surface as a
        // launch failure, not a dead handle that fails on first use.
        tokio::time::sleep(LIVENESS_DELAY).await;
        if let Some(status) = child
            .try_wait()
            .map_err(|e| SupervisorError::launch(&spec.language, e.to_string()))?
        {
            return Err(SupervisorError::launch(
                &spec.language,
                format!("server exited immediately with {status}"),
            ));
        }

        let pid = child.id();
        let (stdin_tx, stdin_rx) = mpsc::channel::<Vec<u8>>(STDIN_QUEUE_DEPTH);
        let (outbound, _) = broadcast::channel(OUTBOUND_QUEUE_DEPTH);
        let state = Arc::new(RwLock::new(ProcessState::Ready));
        let child = Arc::new(Mutex::new(Some(child)));
        let correlator = Arc::new(RequestCorrelator::new());

        let process = Arc::new(Self {
            spec,
            key: key.clone(),
            pid,
            state: Arc::clone(&state),
            child: Arc::clone(&child),
            stdin_tx: stdin_tx.clone(),
            correlator: Arc::clone(&correlator),
            outbound: outbound.clone(),
        });

        tokio::spawn(writer_task(stdin, stdin_rx));
        tokio::spawn(reader_task(
            stdout,
            Arc::clone(&correlator),
            outbound,
            stdin_tx,
            Arc::clone(&state),
            process.spec.language.clone(),
        ));
        if let Some(stderr) = stderr {
            let language = process.spec.language.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    trace!(language = %language, "server stderr: {line}");
                }
            });
        }
        tokio::spawn(exit_watcher(
            child,
            state,
            correlator,
            key,
            pid,
            process.spec.language.clone(),
            exit_tx,
        ));

        info!(language = %process.spec.language, pid = ?pid, key = %process.key, "language server started");
        Ok(process)
    }

    pub fn language(&self) -> &str {
        &self.spec.language
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub async fn state(&self) -> ProcessState {
        *self.state.read().await
    }

    /// Whether the process is usable for new traffic.
    pub async fn is_alive(&self) -> bool {
        matches!(
            *self.state.read().await,
            ProcessState::Starting | ProcessState::Ready
        )
    }

    /// Subscribe to server-to-client traffic (notifications, forwarded
    /// requests, and responses to client-originated requests), in the
    /// order the server emitted it.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.outbound.subscribe()
    }

    /// Number of gateway-originated requests still in flight.
    pub async fn pending_requests(&self) -> usize {
        self.correlator.pending_count().await
    }

    /// Send a gateway-originated request and await its response, bounded
    /// by the method's timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> SupervisorResult<Value> {
        let timeout = self.spec.timeout_for(method);
        let id = self.correlator.next_id();
        let rx = self.correlator.register(id, method).await;

        let frame = encode(&JsonRpcRequest::new(id, method, params))?;
        if self.stdin_tx.send(frame).await.is_err() {
            self.correlator
                .fail(id, SupervisorError::process_gone("stdin closed"))
                .await;
            return Err(SupervisorError::process_gone("stdin closed"));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SupervisorError::process_gone("request channel dropped")),
            Err(_) => {
                // May race an in-flight settlement; the correlator ensures
                // at most one outcome either way.
                self.correlator
                    .fail(
                        id,
                        SupervisorError::Timeout {
                            method: method.to_string(),
                            after: timeout,
                        },
                    )
                    .await;
                Err(SupervisorError::Timeout {
                    method: method.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> SupervisorResult<()> {
        let frame = encode(&JsonRpcNotification::new(method, params))?;
        self.stdin_tx
            .send(frame)
            .await
            .map_err(|_| SupervisorError::process_gone("stdin closed"))
    }

    /// Forward a raw client message verbatim.
    pub async fn forward_raw(&self, message: &Value) -> SupervisorResult<()> {
        let frame = encode_value(message);
        self.stdin_tx
            .send(frame)
            .await
            .map_err(|_| SupervisorError::process_gone("stdin closed"))
    }

    /// Run the LSP `initialize`/`initialized` handshake for a workspace.
    pub async fn initialize_handshake(&self, workspace_root: &Path) -> SupervisorResult<()> {
        let root_uri = format!("file://{}", workspace_root.display());
        let params = lsp_types::InitializeParams {
            process_id: Some(std::process::id()),
            workspace_folders: Some(vec![lsp_types::WorkspaceFolder {
                uri: root_uri
                    .parse()
                    .map_err(|e| SupervisorError::launch(&self.spec.language, format!("{e:?}")))?,
                name: workspace_root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("workspace")
                    .to_string(),
            }]),
            capabilities: lsp_types::ClientCapabilities {
                text_document: Some(lsp_types::TextDocumentClientCapabilities {
                    publish_diagnostics: Some(lsp_types::PublishDiagnosticsClientCapabilities {
                        related_information: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        self.request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        self.notify(
            "initialized",
            Some(serde_json::to_value(lsp_types::InitializedParams {})?),
        )
        .await?;
        debug!(language = %self.spec.language, "handshake complete");
        Ok(())
    }

    /// Graceful stop: LSP shutdown/exit with a short grace period, then
    /// kill. The exit watcher performs the final bookkeeping.
    pub async fn shutdown(&self) {
        *self.state.write().await = ProcessState::Stopped;
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, self.request("shutdown", None)).await;
        let _ = self.notify("exit", None).await;
        self.kill().await;
    }

    /// Kill the process without ceremony. Safe to call more than once.
    pub async fn kill(&self) {
        if let Some(child) = self.child.lock().await.as_mut() {
            let _ = child.start_kill();
        }
    }
}

impl Drop for LanguageServerProcess {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(child) = guard.as_mut() {
                let _ = child.start_kill();
            }
        }
    }
}

/// Drain the stdin queue into the child. Exits when the queue closes or
/// the pipe breaks.
async fn writer_task(mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        if stdin.write_all(&frame).await.is_err() || stdin.flush().await.is_err() {
            debug!("server stdin closed; writer exiting");
            break;
        }
    }
}

/// Read stdout chunks, decode frames, and dispatch each message.
async fn reader_task(
    stdout: tokio::process::ChildStdout,
    correlator: Arc<RequestCorrelator>,
    outbound: broadcast::Sender<Value>,
    stdin_tx: mpsc::Sender<Vec<u8>>,
    state: Arc<RwLock<ProcessState>>,
    language: String,
) {
    let mut stdout = stdout;
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 8192];

    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        match decoder.feed(&buf[..n]) {
            Ok(frames) => {
                for frame in frames {
                    dispatch(frame, &correlator, &outbound, &stdin_tx).await;
                }
            }
            Err(error) => {
                // Framing is unrecoverable; tear the pipeline down.
                warn!(language = %language, %error, "transport framing failure");
                let mut state = state.write().await;
                if *state == ProcessState::Ready {
                    *state = ProcessState::Crashed;
                }
                drop(state);
                correlator
                    .reject_all(|method| {
                        SupervisorError::process_gone(format!(
                            "framing failure while '{method}' was in flight"
                        ))
                    })
                    .await;
                break;
            }
        }
    }
    debug!(language = %language, "server stdout closed; reader exiting");
}

/// Route one decoded frame.
async fn dispatch(
    frame: Value,
    correlator: &RequestCorrelator,
    outbound: &broadcast::Sender<Value>,
    stdin_tx: &mpsc::Sender<Vec<u8>>,
) {
    let Some(incoming) = Incoming::classify(frame.clone()) else {
        warn!("dropping unclassifiable frame from server");
        return;
    };

    match incoming {
        Incoming::Response { id, result, error } => {
            // Gateway-originated ids are numeric; anything the correlator
            // does not recognize belongs to a client-forwarded request.
            if let Some(id) = id.as_u64() {
                let outcome = match error {
                    Some(error) => Err(error),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                if correlator.settle(id, outcome).await {
                    return;
                }
            }
            let _ = outbound.send(frame);
        }
        Incoming::Request { id, method, params } => {
            if let Some(result) = canned_response(&method, params.as_ref()) {
                trace!(method = %method, "answering server request locally");
                let response = JsonRpcResponse::success(id, result);
                if let Ok(frame) = encode(&response) {
                    let _ = stdin_tx.send(frame).await;
                }
            } else {
                let _ = outbound.send(frame);
            }
        }
        Incoming::Notification { .. } => {
            let _ = outbound.send(frame);
        }
    }
}

/// Trivial deterministic answers to server-to-gateway requests that would
/// otherwise stall the server waiting on a client that never sees them.
fn canned_response(method: &str, params: Option<&Value>) -> Option<Value> {
    match method {
        "workspace/configuration" => {
            let items = params
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map(|a| a.len())
                .unwrap_or(1);
            Some(Value::Array(vec![Value::Null; items]))
        }
        "client/registerCapability"
        | "client/unregisterCapability"
        | "window/workDoneProgress/create" => Some(Value::Null),
        _ => None,
    }
}

/// Wait for the child to exit, then reject in-flight requests and tell the
/// registry to forget this process.
#[allow(clippy::too_many_arguments)]
async fn exit_watcher(
    child: Arc<Mutex<Option<Child>>>,
    state: Arc<RwLock<ProcessState>>,
    correlator: Arc<RequestCorrelator>,
    key: String,
    pid: Option<u32>,
    language: String,
    exit_tx: Option<mpsc::UnboundedSender<ExitEvent>>,
) {
    let status: Option<std::process::ExitStatus> = loop {
        {
            let mut guard = child.lock().await;
            let Some(running) = guard.as_mut() else {
                return;
            };
            match running.try_wait() {
                Ok(Some(status)) => {
                    *guard = None;
                    break Some(status);
                }
                Ok(None) => {}
                Err(_) => {
                    *guard = None;
                    break None;
                }
            }
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    };

    {
        let mut state = state.write().await;
        if *state != ProcessState::Stopped {
            warn!(language = %language, key = %key, ?status, "language server crashed");
            *state = ProcessState::Crashed;
        } else {
            debug!(language = %language, key = %key, ?status, "language server stopped");
        }
    }

    let rejected = correlator
        .reject_all(|method| {
            SupervisorError::process_gone(format!("process exited while '{method}' was in flight"))
        })
        .await;
    if rejected > 0 {
        debug!(key = %key, rejected, "rejected in-flight requests on exit");
    }

    if let Some(tx) = exit_tx {
        let _ = tx.send(ExitEvent { key, pid });
    }
}

async fn ensure_installed(spec: &LaunchSpec) -> SupervisorResult<()> {
    if binary_on_path(&spec.command) {
        return Ok(());
    }
    let Some(install) = &spec.install else {
        return Err(SupervisorError::launch(
            &spec.language,
            format!("'{}' not found on PATH and no installer configured", spec.command),
        ));
    };
    let (program, args) = install.split_first().ok_or_else(|| {
        SupervisorError::launch(&spec.language, "empty install command")
    })?;

    info!(language = %spec.language, command = %program, "installing language server");
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| SupervisorError::launch(&spec.language, format!("install failed: {e}")))?;
    if !status.success() {
        return Err(SupervisorError::launch(
            &spec.language,
            format!("install command exited with {status}"),
        ));
    }
    if !binary_on_path(&spec.command) {
        return Err(SupervisorError::launch(
            &spec.language,
            format!("'{}' still missing after install", spec.command),
        ));
    }
    Ok(())
}

/// Check whether a command resolves to an existing file.
fn binary_on_path(command: &str) -> bool {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}
