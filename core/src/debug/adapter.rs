//! Host-side debug adapter.
//!
//! Spawns the runtime with `--inspect`, scans its stdout for the handshake,
//! connects, registers the editor's breakpoints and then translates pause
//! notifications back into (flow, step) events for the editor.
//!
//! ```text
//! Idle -> Starting -> Attached -> Running <-> Paused
//!                                   any -> Stopped
//! ```
//!
//! The child watcher owns the process. `stop` cancels it, which kills the
//! child, and waits for the exit code, so a returned `stop` means the
//! process is gone. A lost or garbled debug connection cancels the same
//! way. `Stopped` reaches the editor exactly once per session, after the
//! process has exited.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DebugError;
use crate::runtime::events::decode_event;
use crate::types::LogEvent;

use super::linemap::BreakpointMap;
use super::protocol::{parse_handshake, Message, Notification, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    Starting,
    Attached,
    Paused,
    Running,
    Stopped,
}

/// What the editor hears about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "body", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditorEvent {
    /// A line the program printed
    Output(String),
    Log(LogEvent),
    /// Paused at `step` of `flow`; `line` is the generated line
    Breakpoint {
        flow: String,
        step: usize,
        line: usize,
        scope_id: String,
    },
    Resumed,
    Stopped {
        exit_code: Option<i32>,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Runtime executable, normally the `robotflow` binary itself
    pub runtime_program: PathBuf,
    pub host: String,
    pub port: u16,
    pub attach_timeout: Duration,
    /// Passed to `run` after the program path
    pub extra_args: Vec<String>,
}

/// How long to wait for buffered output once the runtime has exited.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<JsonValue, String>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// State shared with the background tasks.
struct Shared {
    state: Mutex<AdapterState>,
    events: mpsc::UnboundedSender<EditorEvent>,
    stopped_sent: AtomicBool,
    breakpoints: Mutex<BreakpointMap>,
}

impl Shared {
    fn set_state(&self, state: AdapterState) {
        let mut current = lock(&self.state);
        // Nothing leaves Stopped.
        if *current != AdapterState::Stopped {
            debug!(from = ?*current, to = ?state, "debug adapter state");
            *current = state;
        }
    }

    fn emit(&self, event: EditorEvent) {
        let _ = self.events.send(event);
    }

    fn stopped(&self, exit_code: Option<i32>, reason: &str) {
        *lock(&self.state) = AdapterState::Stopped;
        if !self.stopped_sent.swap(true, Ordering::SeqCst) {
            info!(?exit_code, reason, "debug session stopped");
            self.emit(EditorEvent::Stopped {
                exit_code,
                reason: reason.to_string(),
            });
        }
    }
}

struct Session {
    writer: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    cancel: CancellationToken,
    exit: watch::Receiver<Option<i32>>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct DebugAdapter {
    options: AdapterOptions,
    shared: Arc<Shared>,
    session: Option<Session>,
}

impl DebugAdapter {
    pub fn new(options: AdapterOptions, breakpoints: BreakpointMap) -> (Self, mpsc::UnboundedReceiver<EditorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(AdapterState::Idle),
            events,
            stopped_sent: AtomicBool::new(false),
            breakpoints: Mutex::new(breakpoints),
        });
        (
            Self {
                options,
                shared,
                session: None,
            },
            rx,
        )
    }

    pub fn state(&self) -> AdapterState {
        *lock(&self.shared.state)
    }

    /// Launch `program` under the debugger and start it running.
    pub async fn start(&mut self, program: &Path) -> Result<(), DebugError> {
        if self.state() != AdapterState::Idle {
            return Err(DebugError::AlreadyStarted);
        }
        self.shared.set_state(AdapterState::Starting);
        match self.launch(program).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "debug launch failed");
                self.stop().await;
                Err(e)
            }
        }
    }

    async fn launch(&mut self, program: &Path) -> Result<(), DebugError> {
        let mut child = Command::new(&self.options.runtime_program)
            .arg("run")
            .arg(program)
            .arg("--inspect")
            .arg(self.options.port.to_string())
            .arg("--inspect-host")
            .arg(&self.options.host)
            .args(&self.options.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DebugError::Spawn {
                program: self.options.runtime_program.clone(),
                source,
            })?;
        info!(program = %program.display(), pid = ?child.id(), "runtime spawned");

        let mut output = Vec::new();
        let (handshake_tx, handshake_rx) = oneshot::channel::<String>();

        if let Some(stdout) = child.stdout.take() {
            let shared = Arc::clone(&self.shared);
            output.push(tokio::spawn(async move {
                let mut handshake = Some(handshake_tx);
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if handshake.is_some() {
                        if let Some(addr) = parse_handshake(&line) {
                            if let Some(tx) = handshake.take() {
                                let _ = tx.send(addr);
                            }
                            continue;
                        }
                    }
                    shared.emit(EditorEvent::Output(line));
                }
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            let shared = Arc::clone(&self.shared);
            output.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match decode_event(&line) {
                        Some(event) => shared.emit(EditorEvent::Log(event)),
                        None => shared.emit(EditorEvent::Output(line)),
                    }
                }
            }));
        }

        let cancel = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(None);
        let mut tasks = Vec::new();
        {
            let shared = Arc::clone(&self.shared);
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let status = tokio::select! {
                    status = child.wait() => status,
                    _ = cancel.cancelled() => {
                        let _ = child.kill().await;
                        child.wait().await
                    }
                };
                let code = match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(error = %e, "failed to wait for runtime");
                        None
                    }
                };
                // Deliver the last output before reporting the exit.
                for task in output {
                    let _ = tokio::time::timeout(OUTPUT_DRAIN, task).await;
                }
                let _ = exit_tx.send(Some(code.unwrap_or(-1)));
                shared.stopped(code, "process exited");
            }));
        }

        // Partial session so that a failure below can still be stopped.
        let (writer, writer_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        self.session = Some(Session {
            writer,
            pending: Arc::clone(&pending),
            next_id: AtomicU64::new(1),
            cancel,
            exit: exit_rx,
            tasks,
        });

        let timeout = self.options.attach_timeout;
        let addr = match tokio::time::timeout(timeout, handshake_rx).await {
            Ok(Ok(addr)) => addr,
            Ok(Err(_)) => return Err(DebugError::ExitedEarly),
            Err(_) => return Err(DebugError::AttachTimeout(timeout.as_millis() as u64)),
        };
        let stream = TcpStream::connect(&addr).await?;
        info!(%addr, "attached to runtime");
        self.attach(stream, writer_rx, pending);
        self.shared.set_state(AdapterState::Attached);

        let locations = {
            let map = lock(&self.shared.breakpoints);
            map.entries()
                .map(|(flow, step)| map.resolve(flow, step))
                .collect::<Vec<_>>()
        };
        for location in locations {
            match location {
                Ok(location) => {
                    self.request(Request::SetBreakpoint(location)).await?;
                }
                Err(e) => warn!(error = %e, "skipping breakpoint"),
            }
        }

        self.shared.set_state(AdapterState::Running);
        self.request(Request::Run).await?;
        Ok(())
    }

    fn attach(&mut self, stream: TcpStream, mut outgoing: mpsc::UnboundedReceiver<Message>, pending: Pending) {
        let (read_half, mut write_half) = stream.into_split();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.tasks.push(tokio::spawn(async move {
            while let Some(message) = outgoing.recv().await {
                if write_half.write_all(message.encode().as_bytes()).await.is_err() {
                    break;
                }
            }
        }));

        let shared = Arc::clone(&self.shared);
        let cancel = session.cancel.clone();
        session.tasks.push(tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            let mut exit_code = None;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "debug channel failed");
                        break;
                    }
                };
                let message = match Message::decode(&line) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "malformed debug message");
                        break;
                    }
                };
                if message.is_response() {
                    let Some(id) = message.id else { continue };
                    if let Some(tx) = lock(&pending).remove(&id) {
                        let result = match message.error {
                            Some(error) => Err(error),
                            None => Ok(message.result.unwrap_or(JsonValue::Null)),
                        };
                        let _ = tx.send(result);
                    }
                    continue;
                }
                let Some(method) = message.method.as_deref() else {
                    continue;
                };
                match Notification::parse(method, &message.params) {
                    Some(Notification::Paused(paused)) => {
                        let mapped = lock(&shared.breakpoints).step_at(&paused.file, paused.line);
                        let (flow, step) = mapped.unwrap_or_else(|| {
                            (
                                paused.block.flow_name.clone(),
                                (paused.block.block_line - 1).max(0) as usize,
                            )
                        });
                        shared.set_state(AdapterState::Paused);
                        shared.emit(EditorEvent::Breakpoint {
                            flow,
                            step,
                            line: paused.line,
                            scope_id: paused.scope_id,
                        });
                    }
                    Some(Notification::Resumed) => {
                        shared.set_state(AdapterState::Running);
                        shared.emit(EditorEvent::Resumed);
                    }
                    Some(Notification::Exited { code }) => {
                        debug!(code, "runtime reported exit");
                        exit_code = Some(code);
                    }
                    None => debug!(method, "ignoring unknown notification"),
                }
            }
            // Fail whatever is still waiting for an answer.
            lock(&pending).clear();
            // Without `exited` the runtime is unreachable but may still be
            // alive. The watcher kills it and reports the stop once it is gone.
            if exit_code.is_none() {
                warn!("debug channel closed before the runtime exited");
                cancel.cancel();
            }
        }));
    }

    async fn request(&self, request: Request) -> Result<JsonValue, DebugError> {
        let session = self.session.as_ref().ok_or(DebugError::NotRunning)?;
        let id = session.next_id.fetch_add(1, Ordering::SeqCst);
        let method = request.method().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&session.pending).insert(id, tx);
        session
            .writer
            .send(Message::request(id, &request))
            .map_err(|_| DebugError::ChannelClosed)?;
        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(DebugError::Remote { method, message }),
            Err(_) => Err(DebugError::ChannelClosed),
        }
    }

    fn require_paused(&self) -> Result<(), DebugError> {
        match self.state() {
            AdapterState::Paused => Ok(()),
            _ => Err(DebugError::NotPaused),
        }
    }

    pub async fn resume(&self) -> Result<(), DebugError> {
        self.require_paused()?;
        self.request(Request::Resume).await?;
        Ok(())
    }

    pub async fn step_over(&self) -> Result<(), DebugError> {
        self.require_paused()?;
        self.request(Request::StepOver).await?;
        Ok(())
    }

    /// Properties of a paused scope or nested value, verbatim from the runtime.
    pub async fn get_properties(&self, object_id: &str) -> Result<JsonValue, DebugError> {
        self.require_paused()?;
        self.request(Request::GetProperties {
            object_id: object_id.to_string(),
        })
        .await
    }

    /// Record a breakpoint; registered right away when a session is live.
    pub async fn set_breakpoint(&self, flow: &str, step: usize) -> Result<(), DebugError> {
        let location = {
            let mut map = lock(&self.shared.breakpoints);
            map.add(flow, step);
            map.resolve(flow, step)
        };
        if self.is_live() {
            self.request(Request::SetBreakpoint(location?)).await?;
        }
        Ok(())
    }

    pub async fn remove_breakpoint(&self, flow: &str, step: usize) -> Result<(), DebugError> {
        let location = {
            let mut map = lock(&self.shared.breakpoints);
            map.remove(flow, step);
            map.location(flow, step)
        };
        if self.is_live() {
            self.request(Request::RemoveBreakpoint(location)).await?;
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        matches!(
            self.state(),
            AdapterState::Attached | AdapterState::Running | AdapterState::Paused
        )
    }

    /// End the session from any state. Returns the exit code of the
    /// runtime, if one was started; the process has exited when this returns.
    pub async fn stop(&mut self) -> Option<i32> {
        let Some(mut session) = self.session.take() else {
            self.shared.stopped(None, "stopped");
            return None;
        };
        session.cancel.cancel();
        let code = loop {
            if let Some(code) = *session.exit.borrow() {
                break Some(code);
            }
            if session.exit.changed().await.is_err() {
                break None;
            }
        };
        for task in session.tasks.drain(..) {
            task.abort();
        }
        self.shared.stopped(code, "stopped");
        code
    }

    /// Wait until the runtime exits on its own.
    pub async fn wait(&mut self) -> Option<i32> {
        let session = self.session.as_mut()?;
        loop {
            if let Some(code) = *session.exit.borrow() {
                return Some(code);
            }
            if session.exit.changed().await.is_err() {
                return None;
            }
        }
    }
}
