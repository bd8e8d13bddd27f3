//! Request/response multiplexer over a backend's command stream.
//!
//! Both backends speak newline-delimited protocols, so one channel type
//! serves both. The protocol tag selects the line encoder and the reader's
//! line handler.
//!
//! # Architecture
//!
//! ```text
//! send(cmd) ──register──> PendingTable <──resolve── read_loop ──> events
//!     │                        ▲                       ▲
//!     └──line──> mpsc ──> write_loop ──> backend ──────┘
//! ```
//!
//! - A single write task drains an mpsc queue, so commands reach the
//!   backend in send order.
//! - The read task resolves replies by correlation id and forwards
//!   unsolicited lines as [`BridgeEvent`](crate::events::BridgeEvent)s.
//! - Every request has its own timeout; a slow reply blocks only its own
//!   caller.
//!
//! Rust guideline compliant 2026-02

pub mod pending;
pub mod socket;
pub mod text;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::codec::{self, Command};
use crate::constants::MAX_LINE_LENGTH;
use crate::error::BridgeError;
use crate::events::EventSender;

pub use pending::PendingTable;

/// A successful reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Payload returned by the backend, if any (player `get_property`).
    pub data: Option<serde_json::Value>,
}

/// Which line protocol a channel speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `<command> <id> <args>` / `result <id> ok|error`.
    Text,
    /// `{"command":[...],"request_id":n}` / `{"request_id":n,"error":..}`.
    Json,
}

impl Protocol {
    fn encode(self, command: &Command, id: u32) -> Result<String, BridgeError> {
        match self {
            Self::Text => codec::text::encode_command(command, id),
            Self::Json => codec::json::encode_request(command, id),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Everything a reader task needs to route one line.
#[derive(Debug, Clone)]
pub(crate) struct LineContext {
    pub(crate) backend_id: u64,
    pub(crate) pending: Arc<PendingTable>,
    pub(crate) events: EventSender,
}

/// Command channel to one backend.
pub struct CommandChannel {
    protocol: Protocol,
    backend_id: u64,
    pending: Arc<PendingTable>,
    line_tx: UnboundedSender<String>,
    timeout: Duration,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("protocol", &self.protocol)
            .field("backend_id", &self.backend_id)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl CommandChannel {
    /// Start reader and writer tasks over an established byte stream.
    pub fn spawn<R, W>(
        protocol: Protocol,
        reader: R,
        writer: W,
        backend_id: u64,
        events: EventSender,
        timeout: Duration,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = Arc::new(PendingTable::new());
        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();

        let ctx = LineContext {
            backend_id,
            pending: Arc::clone(&pending),
            events,
        };
        let read_handle = tokio::spawn(Self::read_loop(protocol, reader, ctx));
        let write_handle = tokio::spawn(Self::write_loop(
            protocol,
            backend_id,
            writer,
            line_rx,
            Arc::clone(&pending),
        ));

        Self {
            protocol,
            backend_id,
            pending,
            line_tx,
            timeout,
            read_handle,
            write_handle,
        }
    }

    /// Send a command and wait for its reply.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotConnected`] if the channel is closed
    /// - [`BridgeError::Protocol`] if the command cannot be encoded
    /// - [`BridgeError::Timeout`] if no reply arrives in time
    /// - [`BridgeError::CommandFailed`] if the backend rejects it
    /// - [`BridgeError::BackendStopped`] if the backend goes away first
    pub async fn send(&self, command: &Command) -> Result<Reply, BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let (id, rx) = self.pending.register()?;
        let line = match self.protocol.encode(command, id) {
            Ok(line) => line,
            Err(e) => {
                self.pending.cancel(id);
                return Err(e);
            }
        };

        log::debug!("[CommandChannel] #{} -> {}", self.backend_id, line);
        if self.line_tx.send(line).is_err() {
            self.pending.cancel(id);
            return Err(BridgeError::NotConnected);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BridgeError::BackendStopped),
            Err(_) => {
                self.pending.cancel(id);
                log::warn!(
                    "[CommandChannel] #{} '{}' timed out after {:?}",
                    self.backend_id,
                    command.name(),
                    self.timeout
                );
                Err(BridgeError::Timeout {
                    command: command.name().to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// Whether commands can still be sent.
    pub fn is_connected(&self) -> bool {
        !self.line_tx.is_closed() && !self.pending.is_closed()
    }

    /// Protocol spoken on this channel.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Shared pending table (used by the supervisor's teardown).
    pub fn pending(&self) -> Arc<PendingTable> {
        Arc::clone(&self.pending)
    }

    /// Reject everything in flight and stop both tasks.
    ///
    /// Dropping the writer closes the backend's command input.
    pub fn close(&self) {
        let rejected = self.pending.reject_all(&BridgeError::BackendStopped);
        if rejected > 0 {
            log::debug!(
                "[CommandChannel] #{} rejected {rejected} pending request(s)",
                self.backend_id
            );
        }
        self.read_handle.abort();
        self.write_handle.abort();
    }

    async fn write_loop<W>(
        protocol: Protocol,
        backend_id: u64,
        writer: W,
        mut line_rx: UnboundedReceiver<String>,
        pending: Arc<PendingTable>,
    ) where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        while let Some(line) = line_rx.recv().await {
            if let Err(e) = sink.send(line).await {
                log::error!(
                    "[CommandChannel] #{backend_id} {} write error: {e}",
                    protocol.label()
                );
                pending.reject_all(&BridgeError::BackendStopped);
                break;
            }
        }
    }

    async fn read_loop<R>(protocol: Protocol, reader: R, ctx: LineContext)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut lines =
            FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        loop {
            match lines.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match protocol {
                        Protocol::Text => text::handle_line(&line, &ctx),
                        Protocol::Json => socket::handle_line(&line, &ctx),
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    log::warn!(
                        "[CommandChannel] #{} skipped line longer than {MAX_LINE_LENGTH} bytes",
                        ctx.backend_id
                    );
                }
                Some(Err(LinesCodecError::Io(e))) => {
                    log::warn!("[CommandChannel] #{} read error: {e}", ctx.backend_id);
                    break;
                }
                None => {
                    log::info!("[CommandChannel] #{} backend closed its output", ctx.backend_id);
                    break;
                }
            }
        }

        ctx.pending.reject_all(&BridgeError::BackendStopped);
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.read_handle.abort();
        self.write_handle.abort();
    }
}
