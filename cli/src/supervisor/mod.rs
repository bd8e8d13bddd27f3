//! Backend process lifecycle.
//!
//! The supervisor spawns a backend with every stdio stream piped, wires up
//! its command channel, and hands back a [`BackendHandle`]. A watcher task
//! owns the child process and performs the same teardown on every exit
//! path:
//!
//! 1. Reject all pending requests with `BackendStopped`
//! 2. Unlink the socket files handed to the backend
//! 3. Clear the alive flag
//!
//! An exit nobody asked for additionally produces an
//! [`ExitReport`] event carrying the last lines of stderr. The supervisor
//! never restarts anything on its own.
//!
//! # Stop sequence
//!
//! ```text
//! stop() ──> close channel (stdin EOF, pending rejected)
//!        ──> SIGTERM ──> wait 1s ──> SIGKILL
//!        ──> await watcher teardown
//! ```
//!
//! Rust guideline compliant 2026-02

pub mod locate;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::channel::{socket, CommandChannel, PendingTable, Reply};
use crate::codec::Command;
use crate::config::{BackendKind, BridgeConfig};
use crate::constants::{STDERR_TAIL_LINES, STOP_GRACE_PERIOD};
use crate::env;
use crate::error::BridgeError;
use crate::events::{BackendEvent, BridgeEvent, EventSender, ExitReport};

/// How long an exiting backend gets to flush its remaining stderr lines.
const STDERR_FLUSH_WAIT: Duration = Duration::from_millis(200);

/// Everything needed to launch one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    /// Which protocol the backend speaks.
    pub kind: BackendKind,
    /// Explicit binary, searched before the default locations.
    pub program: Option<PathBuf>,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Player IPC socket to connect to after spawn.
    pub ipc_socket: Option<PathBuf>,
    /// Files to unlink when the backend goes away.
    pub owned_paths: Vec<PathBuf>,
}

impl LaunchSpec {
    /// Helper launch: frame socket and network settings via environment.
    pub fn helper(config: &BridgeConfig, frame_socket: &Path) -> Self {
        let mut vars = vec![(
            env::FRAME_SOCKET.to_string(),
            frame_socket.to_string_lossy().into_owned(),
        )];
        if config.debug {
            vars.push((env::DEBUG.to_string(), "1".to_string()));
        }
        if config.http_debug {
            vars.push((env::HTTP_DEBUG.to_string(), "1".to_string()));
        }
        if let Some(agent) = &config.http.user_agent {
            vars.push((env::HTTP_USER_AGENT.to_string(), agent.clone()));
        }
        if let Some(referer) = &config.http.referer {
            vars.push((env::HTTP_REFERER.to_string(), referer.clone()));
        }
        if let Some(timeout) = config.http.timeout_secs {
            vars.push((env::HTTP_TIMEOUT.to_string(), timeout.to_string()));
        }

        Self {
            kind: BackendKind::Helper,
            program: config.helper_path.clone(),
            args: Vec::new(),
            env: vars,
            ipc_socket: None,
            owned_paths: vec![frame_socket.to_path_buf()],
        }
    }

    /// Player launch: idle mode, no terminal, IPC server, optional embedding.
    pub fn player(config: &BridgeConfig, ipc_socket: &Path, window: Option<u64>) -> Self {
        let mut args = vec![
            "--idle=yes".to_string(),
            "--no-terminal".to_string(),
            "--keep-open=no".to_string(),
            format!("--input-ipc-server={}", ipc_socket.display()),
        ];
        if let Some(wid) = window {
            args.push(format!("--wid={wid}"));
        }
        if let Some(agent) = &config.http.user_agent {
            args.push(format!("--user-agent={agent}"));
        }
        if let Some(referer) = &config.http.referer {
            args.push(format!("--referrer={referer}"));
        }
        if let Some(timeout) = config.http.timeout_secs {
            args.push(format!("--network-timeout={timeout}"));
        }

        Self {
            kind: BackendKind::Player,
            program: config.player_path.clone(),
            args,
            env: Vec::new(),
            ipc_socket: Some(ipc_socket.to_path_buf()),
            owned_paths: vec![ipc_socket.to_path_buf()],
        }
    }
}

/// A running backend process and its command channel.
pub struct BackendHandle {
    id: u64,
    kind: BackendKind,
    pid: Option<u32>,
    channel: CommandChannel,
    alive: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl BackendHandle {
    /// Generation id; events carry it.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Backend variant.
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// OS process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Send a command over the backend's channel.
    pub async fn send(&self, command: &Command) -> Result<Reply, BridgeError> {
        if !self.is_alive() {
            return Err(BridgeError::NotConnected);
        }
        self.channel.send(command).await
    }

    /// Stop the backend and wait for teardown to finish.
    ///
    /// Calling this again (or after the backend died) is a no-op.
    pub async fn stop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            log::info!("[Supervisor] Stopping {} backend #{}", self.kind, self.id);
            self.channel.close();
            let _ = kill_tx.send(());
        }
        // Err means the watcher is gone, which only happens after teardown.
        let _ = self.exited.wait_for(|done| *done).await;
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        self.channel.close();
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }
}

/// State the exit watcher needs to tear a backend down.
struct Teardown {
    id: u64,
    kind: BackendKind,
    alive: Arc<AtomicBool>,
    pending: Arc<PendingTable>,
    owned_paths: Vec<PathBuf>,
    tail: Arc<Mutex<VecDeque<String>>>,
    events: EventSender,
}

impl Teardown {
    fn run(self, status: Option<ExitStatus>, requested: bool) {
        self.alive.store(false, Ordering::Release);
        let rejected = self.pending.reject_all(&BridgeError::BackendStopped);
        for path in &self.owned_paths {
            remove_socket_file(path);
        }

        if requested {
            log::info!(
                "[Supervisor] {} backend #{} stopped ({rejected} request(s) rejected)",
                self.kind,
                self.id
            );
            return;
        }

        let stderr_tail: Vec<String> = self
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let report = ExitReport {
            exit_code: status.and_then(|s| s.code()),
            signal: status.and_then(exit_signal),
            stderr_tail,
        };
        log::warn!(
            "[Supervisor] {} backend #{} {} unexpectedly",
            self.kind,
            self.id,
            report.summary()
        );
        let _ = self
            .events
            .send(BridgeEvent::new(self.id, BackendEvent::Exited(report)));
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("[Supervisor] Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("[Supervisor] Failed to remove {}: {e}", path.display()),
    }
}

/// Spawns backends and hands out generation ids.
#[derive(Debug)]
pub struct Supervisor {
    next_id: u64,
    events: EventSender,
    request_timeout: Duration,
}

impl Supervisor {
    /// Supervisor delivering backend events to `events`.
    pub fn new(events: EventSender, request_timeout: Duration) -> Self {
        Self {
            next_id: 1,
            events,
            request_timeout,
        }
    }

    /// Reserve the generation id for the next backend.
    ///
    /// Callers that create resources tagged with the id (the frame server)
    /// reserve it first and pass it to [`Supervisor::start`].
    pub fn reserve_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Locate, spawn, and connect a backend.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::BackendNotFound`] if no binary exists
    /// - [`BridgeError::Spawn`] if the process cannot be started or dies
    ///   during startup
    /// - [`BridgeError::Io`] if the player's IPC socket never appears
    pub async fn start(&mut self, id: u64, spec: LaunchSpec) -> Result<BackendHandle, BridgeError> {
        let program = locate::locate(spec.kind, spec.program.as_deref())?;

        if let Some(ipc) = &spec.ipc_socket {
            crate::transport::server::check_socket_path(ipc)?;
            remove_socket_file(ipc);
        }

        log::info!(
            "[Supervisor] Starting {} backend #{id}: {}",
            spec.kind,
            program.display()
        );

        let mut command = ProcessCommand::new(&program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| BridgeError::Spawn(format!("{}: {e}", program.display())))?;
        let pid = child.id();

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_stderr(id, stderr, Arc::clone(&tail))));

        let channel = match self.connect(id, &spec, &mut child).await {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("[Supervisor] Backend #{id} failed to start: {e}");
                let _ = child.start_kill();
                let _ = child.wait().await;
                for path in &spec.owned_paths {
                    remove_socket_file(path);
                }
                return Err(e);
            }
        };

        let alive = Arc::new(AtomicBool::new(true));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = watch::channel(false);
        let teardown = Teardown {
            id,
            kind: spec.kind,
            alive: Arc::clone(&alive),
            pending: channel.pending(),
            owned_paths: spec.owned_paths,
            tail,
            events: self.events.clone(),
        };
        tokio::spawn(watch_exit(child, kill_rx, stderr_task, teardown, exited_tx));

        Ok(BackendHandle {
            id,
            kind: spec.kind,
            pid,
            channel,
            alive,
            kill_tx: Some(kill_tx),
            exited: exited_rx,
        })
    }

    async fn connect(
        &self,
        id: u64,
        spec: &LaunchSpec,
        child: &mut Child,
    ) -> Result<CommandChannel, BridgeError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Spawn("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn("stdout not captured".to_string()))?;

        match (spec.kind, &spec.ipc_socket) {
            (BackendKind::Helper, _) => Ok(CommandChannel::spawn(
                crate::channel::Protocol::Text,
                stdout,
                stdin,
                id,
                self.events.clone(),
                self.request_timeout,
            )),
            (BackendKind::Player, Some(ipc)) => {
                // The player is driven over IPC only; keep stdin open and
                // stdout drained so it never blocks on a full pipe.
                tokio::spawn(drain_stdout(id, stdout, stdin));
                let stream = tokio::select! {
                    stream = socket::connect_with_retry(ipc) => stream?,
                    status = child.wait() => {
                        let status = status?;
                        return Err(BridgeError::Spawn(format!("player exited during startup ({status})")));
                    }
                };
                CommandChannel::player(stream, id, self.events.clone(), self.request_timeout).await
            }
            (BackendKind::Player, None) => {
                Err(BridgeError::Spawn("player launch without an IPC socket".to_string()))
            }
        }
    }

    /// Stop a backend; a second call is a no-op.
    pub async fn stop(&self, handle: &mut BackendHandle) {
        handle.stop().await;
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&self, handle: &BackendHandle) -> bool {
        handle.is_alive()
    }
}

async fn collect_stderr<R>(id: u64, stderr: R, tail: Arc<Mutex<VecDeque<String>>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("[Supervisor] #{id} stderr: {line}");
        let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

async fn drain_stdout<R, W>(id: u64, stdout: R, _stdin: W)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("[Supervisor] #{id} stdout: {line}");
    }
}

async fn watch_exit(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    stderr_task: Option<JoinHandle<()>>,
    teardown: Teardown,
    exited_tx: watch::Sender<bool>,
) {
    let (status, requested) = tokio::select! {
        status = child.wait() => (status.ok(), false),
        _ = &mut kill_rx => (terminate(&mut child).await, true),
    };

    if !requested {
        if let Some(task) = stderr_task {
            let _ = tokio::time::timeout(STDERR_FLUSH_WAIT, task).await;
        }
    }

    teardown.run(status, requested);
    let _ = exited_tx.send(true);
}

/// SIGTERM, a grace period, then SIGKILL.
async fn terminate(child: &mut Child) -> Option<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill(2) on a pid we spawned and have not reaped yet.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }

    match tokio::time::timeout(STOP_GRACE_PERIOD, child.wait()).await {
        Ok(status) => status.ok(),
        Err(_) => {
            log::warn!("[Supervisor] Backend ignored SIGTERM, killing");
            let _ = child.start_kill();
            child.wait().await.ok()
        }
    }
}
