//! In-runtime debug server.
//!
//! Listens on a TCP port, announces itself on stdout and serves a single
//! debugger connection. The interpreter reaches the server through the
//! [`DebugHook`] implementation: `check` is a lock-and-lookup on the
//! breakpoint set, `pause` parks the program until the debugger resumes it.

use std::collections::BTreeSet;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::DebugError;
use crate::executor::{DebugHook, PauseInfo, PauseReason, Val};

use super::protocol::{
    handshake_line, properties, Location, Message, Notification, Paused, Request, SCOPE_LOCALS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeMode {
    Continue,
    Step,
}

struct Parked {
    locals: Val,
    globals: Val,
    resume: Option<oneshot::Sender<ResumeMode>>,
}

#[derive(Default)]
struct Shared {
    attached: AtomicBool,
    stepping: AtomicBool,
    breakpoints: Mutex<BTreeSet<Location>>,
    parked: Mutex<Option<Parked>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn send(&self, message: Message) {
        if let Some(tx) = lock(&self.outgoing).as_ref() {
            let _ = tx.send(message);
        }
    }

    fn resume(&self, mode: ResumeMode) -> bool {
        let mut parked = lock(&self.parked);
        match parked.as_mut().and_then(|p| p.resume.take()) {
            Some(tx) => {
                self.stepping.store(mode == ResumeMode::Step, Ordering::SeqCst);
                let _ = tx.send(mode);
                true
            }
            None => false,
        }
    }

    /// Connection gone: forget breakpoints and let the program run on.
    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.stepping.store(false, Ordering::SeqCst);
        lock(&self.breakpoints).clear();
        *lock(&self.outgoing) = None;
        self.resume(ResumeMode::Continue);
    }

    fn handle(&self, request: Request, run: &mut Option<oneshot::Sender<()>>) -> Result<JsonValue, String> {
        match request {
            Request::SetBreakpoint(location) => {
                let location = canonical(location);
                debug!(file = %location.file.display(), line = location.line, "breakpoint set");
                let result = serde_json::to_value(&location).unwrap_or(JsonValue::Null);
                lock(&self.breakpoints).insert(location);
                Ok(result)
            }
            Request::RemoveBreakpoint(location) => {
                let removed = lock(&self.breakpoints).remove(&canonical(location));
                Ok(json!({ "removed": removed }))
            }
            Request::Run => {
                if let Some(tx) = run.take() {
                    let _ = tx.send(());
                }
                Ok(JsonValue::Null)
            }
            Request::Resume => self
                .resume(ResumeMode::Continue)
                .then_some(JsonValue::Null)
                .ok_or_else(|| "program is not paused".to_string()),
            Request::StepOver => self
                .resume(ResumeMode::Step)
                .then_some(JsonValue::Null)
                .ok_or_else(|| "program is not paused".to_string()),
            Request::GetProperties { object_id } => {
                let parked = lock(&self.parked);
                let Some(parked) = parked.as_ref() else {
                    return Err("program is not paused".to_string());
                };
                let props = properties(&object_id, &parked.locals, &parked.globals)?;
                serde_json::to_value(props).map_err(|e| e.to_string())
            }
        }
    }
}

fn canonical(location: Location) -> Location {
    let file = std::fs::canonicalize(&location.file).unwrap_or(location.file);
    Location {
        file,
        line: location.line,
    }
}

/// Debug endpoint of one runtime process.
pub struct DebugServer {
    listener: TcpListener,
    addr: SocketAddr,
    session: Uuid,
    shared: Arc<Shared>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl DebugServer {
    /// Bind `host:port`; port 0 picks a free port.
    pub async fn bind(host: &str, port: u16) -> Result<Self, DebugError> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        Ok(Self {
            listener,
            addr,
            session: Uuid::new_v4(),
            shared: Arc::new(Shared::default()),
            writer: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Announce the endpoint on stdout.
    pub fn announce(&self) -> Result<(), DebugError> {
        let line = handshake_line(&self.addr.ip().to_string(), self.addr.port(), self.session);
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", line)?;
        handle.flush()?;
        Ok(())
    }

    /// Accept the debugger and serve it until it sends `run`.
    pub async fn wait_for_run(&self) -> Result<(), DebugError> {
        let (stream, peer) = self.listener.accept().await?;
        info!(%peer, "debugger attached");
        let (run_tx, run_rx) = oneshot::channel();
        self.serve(stream, run_tx);
        run_rx.await.map_err(|_| DebugError::ChannelClosed)
    }

    fn serve(&self, stream: TcpStream, run: oneshot::Sender<()>) {
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *lock(&self.shared.outgoing) = Some(tx);
        self.shared.attached.store(true, Ordering::SeqCst);

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if write_half.write_all(message.encode().as_bytes()).await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });
        *lock(&self.writer) = Some(writer);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut run = Some(run);
            let mut lines = BufReader::new(read_half).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "debug connection failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let message = match Message::decode(&line) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "malformed debug message");
                        continue;
                    }
                };
                let (Some(id), Some(method)) = (message.id, message.method.as_deref()) else {
                    continue;
                };
                let result = Request::parse(method, &message.params)
                    .and_then(|request| shared.handle(request, &mut run));
                shared.send(Message::response(id, result));
            }
            info!("debugger detached");
            shared.detach();
        });
    }

    /// Hook to install on the interpreter.
    pub fn hook(&self) -> Arc<dyn DebugHook> {
        Arc::new(ServerHook {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Report the exit code and flush pending messages.
    pub async fn finish(&self, code: i32) {
        self.shared.send(Message::notification(&Notification::Exited { code }));
        *lock(&self.shared.outgoing) = None;
        let writer = lock(&self.writer).take();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
    }
}

struct ServerHook {
    shared: Arc<Shared>,
}

#[async_trait]
impl DebugHook for ServerHook {
    fn check(&self, file: &Path, line: usize) -> Option<PauseReason> {
        if !self.shared.attached.load(Ordering::SeqCst) {
            return None;
        }
        if self.shared.stepping.load(Ordering::SeqCst) {
            return Some(PauseReason::Step);
        }
        let location = Location {
            file: PathBuf::from(file),
            line,
        };
        lock(&self.shared.breakpoints)
            .contains(&location)
            .then_some(PauseReason::Breakpoint)
    }

    async fn pause(&self, info: PauseInfo) {
        let (tx, rx) = oneshot::channel();
        *lock(&self.shared.parked) = Some(Parked {
            locals: info.locals,
            globals: info.globals,
            resume: Some(tx),
        });
        debug!(file = %info.file.display(), line = info.line, "paused");
        self.shared.send(Message::notification(&Notification::Paused(Paused {
            file: info.file,
            line: info.line,
            reason: info.reason,
            scope_id: SCOPE_LOCALS.to_string(),
            block: info.block,
        })));

        // A dropped sender (debugger gone) also resumes.
        let _ = rx.await;
        *lock(&self.shared.parked) = None;
        self.shared.send(Message::notification(&Notification::Resumed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockContext;

    async fn connect(server: &DebugServer) -> TcpStream {
        TcpStream::connect(server.local_addr()).await.unwrap()
    }

    async fn send(stream: &mut TcpStream, id: u64, request: Request) {
        let line = Message::request(id, &request).encode();
        stream.write_all(line.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.rflow");
        std::fs::write(&file, "").unwrap();
        let file = std::fs::canonicalize(&file).unwrap();

        let server = DebugServer::bind("127.0.0.1", 0).await.unwrap();
        let mut client = connect(&server).await;
        send(&mut client, 1, Request::SetBreakpoint(Location::new(&file, 3))).await;
        send(&mut client, 2, Request::Run).await;
        server.wait_for_run().await.unwrap();

        let hook = server.hook();
        assert_eq!(hook.check(&file, 3), Some(PauseReason::Breakpoint));
        assert_eq!(hook.check(&file, 4), None);

        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let pause = hook.pause(PauseInfo {
            file: file.clone(),
            line: 3,
            reason: PauseReason::Breakpoint,
            block: BlockContext::unknown(),
            locals: Val::Obj(maplit::btreemap! { "x".to_string() => Val::Num(5.0) }),
            globals: Val::empty_obj(),
        });
        let driver = async {
            let mut paused = None;
            while paused.is_none() {
                let line = lines.next_line().await.unwrap().unwrap();
                let message = Message::decode(&line).unwrap();
                if message.method.as_deref() == Some("paused") {
                    paused = Notification::parse("paused", &message.params);
                }
            }
            let props = Message::request(
                3,
                &Request::GetProperties {
                    object_id: "locals".into(),
                },
            );
            write_half.write_all(props.encode().as_bytes()).await.unwrap();
            let props = loop {
                let message = Message::decode(&lines.next_line().await.unwrap().unwrap()).unwrap();
                if message.id == Some(3) {
                    break message;
                }
            };
            write_half
                .write_all(Message::request(4, &Request::StepOver).encode().as_bytes())
                .await
                .unwrap();
            (paused, props)
        };
        let ((), (paused, props)) = tokio::join!(pause, driver);

        match paused {
            Some(Notification::Paused(p)) => {
                assert_eq!(p.line, 3);
                assert_eq!(p.scope_id, "locals");
            }
            other => panic!("Expected paused, got {:?}", other),
        }
        let result = props.result.unwrap();
        assert_eq!(result[0]["name"], "x");
        assert_eq!(result[0]["value"], 5);

        // Step mode pauses at the next line whatever it is.
        assert_eq!(hook.check(&file, 9), Some(PauseReason::Step));
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let server = DebugServer::bind("127.0.0.1", 0).await.unwrap();
        let mut client = connect(&server).await;
        send(&mut client, 1, Request::SetBreakpoint(Location::new("/x/main.rflow", 3))).await;
        send(&mut client, 2, Request::Run).await;
        server.wait_for_run().await.unwrap();
        drop(client);

        let hook = server.hook();
        for _ in 0..50 {
            if hook.check(Path::new("/x/main.rflow"), 3).is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("breakpoint still active after disconnect");
    }
}
