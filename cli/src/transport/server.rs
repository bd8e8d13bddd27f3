//! Unix domain socket server receiving the helper's frame stream.
//!
//! Created before the helper is spawned; the helper learns the path from
//! `TVBRIDGE_FRAME_SOCKET` and connects to it. Each accepted connection gets
//! its own decoder; decoded frames land in the shared [`FrameSlot`].
//! Connection readers are owned by the accept loop, so stopping the server
//! also drops every open producer connection.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::{JoinHandle, JoinSet};

use super::decoder::{DecoderStats, FrameDecoder};
use super::slot::FrameSlot;
use crate::constants::FRAME_READ_CHUNK;
use crate::error::BridgeError;
use crate::events::{BackendEvent, BridgeEvent, EventSender};

/// `sun_path` is 104 bytes on macOS and 108 on Linux; use the smaller.
pub const MAX_SOCKET_PATH: usize = 104;

/// Validate a socket path against the platform limit.
pub fn check_socket_path(path: &Path) -> Result<(), BridgeError> {
    let path_len = path.as_os_str().len();
    if path_len >= MAX_SOCKET_PATH {
        return Err(BridgeError::Io(format!(
            "socket path too long ({path_len} bytes, max {}): {}",
            MAX_SOCKET_PATH - 1,
            path.display()
        )));
    }
    Ok(())
}

/// Frame socket listener.
#[derive(Debug)]
pub struct FrameServer {
    socket_path: PathBuf,
    slot: FrameSlot,
    stats: Arc<Mutex<DecoderStats>>,
    accept_handle: JoinHandle<()>,
}

impl FrameServer {
    /// Bind the frame socket and start accepting.
    ///
    /// Removes any stale socket file, binds the listener, sets permissions
    /// to 0600, and spawns the accept loop.
    pub fn start(
        socket_path: PathBuf,
        backend_id: u64,
        slot: FrameSlot,
        events: EventSender,
    ) -> Result<Self, BridgeError> {
        check_socket_path(&socket_path)?;

        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = std::os::unix::net::UnixListener::bind(&socket_path).map_err(|e| {
            BridgeError::Io(format!("failed to bind {}: {e}", socket_path.display()))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        listener.set_nonblocking(true)?;
        let listener = UnixListener::from_std(listener)?;

        log::info!("[FrameTransport] Listening on {}", socket_path.display());

        let stats = Arc::new(Mutex::new(DecoderStats::default()));
        let accept_handle = tokio::spawn(Self::accept_loop(
            listener,
            backend_id,
            slot.clone(),
            Arc::clone(&stats),
            events,
            socket_path.clone(),
        ));

        Ok(Self {
            socket_path,
            slot,
            stats,
            accept_handle,
        })
    }

    async fn accept_loop(
        listener: UnixListener,
        backend_id: u64,
        slot: FrameSlot,
        stats: Arc<Mutex<DecoderStats>>,
        events: EventSender,
        socket_path: PathBuf,
    ) {
        // Dropped with this future, which aborts every reader.
        let mut readers = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        log::info!("[FrameTransport] #{backend_id} producer connected");
                        let _ = events.send(BridgeEvent::new(
                            backend_id,
                            BackendEvent::FrameSource { connected: true },
                        ));
                        readers.spawn(Self::read_loop(
                            stream,
                            backend_id,
                            slot.clone(),
                            Arc::clone(&stats),
                            events.clone(),
                        ));
                    }
                    Err(e) => {
                        if !socket_path.exists() {
                            log::info!("[FrameTransport] Socket file removed, stopping accept loop");
                            break;
                        }
                        log::error!("[FrameTransport] Accept error: {e}");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                },
                Some(_) = readers.join_next(), if !readers.is_empty() => {}
            }
        }
    }

    async fn read_loop(
        mut stream: UnixStream,
        backend_id: u64,
        slot: FrameSlot,
        stats: Arc<Mutex<DecoderStats>>,
        events: EventSender,
    ) {
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; FRAME_READ_CHUNK];
        let mut reported = DecoderStats::default();

        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    for frame in decoder.feed(&buf[..n]) {
                        if slot.put(frame)
                            && events
                                .send(BridgeEvent::new(backend_id, BackendEvent::FrameReady))
                                .is_err()
                        {
                            return;
                        }
                    }
                    let now = decoder.stats();
                    if now != reported {
                        accumulate(&stats, &reported, &now);
                        reported = now;
                    }
                }
                Err(e) => {
                    log::warn!("[FrameTransport] #{backend_id} read error: {e}");
                    break;
                }
            }
        }

        log::info!(
            "[FrameTransport] #{backend_id} producer disconnected ({} frames, {} bytes resynced)",
            reported.frames,
            reported.discarded_bytes
        );
        let _ = events.send(BridgeEvent::new(
            backend_id,
            BackendEvent::FrameSource { connected: false },
        ));
    }

    /// Slot frames are delivered into.
    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Decoder counters summed over every connection.
    pub fn stats(&self) -> DecoderStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of the socket file.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting, close every producer connection, and remove the
    /// socket file.
    pub fn shutdown(&self) {
        self.accept_handle.abort();
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "[FrameTransport] Failed to remove {}: {e}",
                    self.socket_path.display()
                );
            }
        }
    }
}

impl Drop for FrameServer {
    fn drop(&mut self) {
        self.accept_handle.abort();
    }
}

fn accumulate(total: &Mutex<DecoderStats>, before: &DecoderStats, now: &DecoderStats) {
    let mut total = total.lock().unwrap_or_else(PoisonError::into_inner);
    total.frames += now.frames - before.frames;
    total.skipped_format += now.skipped_format - before.skipped_format;
    total.discarded_bytes += now.discarded_bytes - before.discarded_bytes;
    total.false_positives += now.false_positives - before.false_positives;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame::FramePacket;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    async fn wait(rx: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> BridgeEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for event")
            .expect("Channel closed")
    }

    #[tokio::test]
    async fn test_frames_arrive_in_slot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frames.sock");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slot = FrameSlot::new();
        let server = FrameServer::start(path.clone(), 1, slot.clone(), tx).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let mut producer = UnixStream::connect(&path).await.unwrap();
        let mut wire = vec![0x55; 9];
        wire.extend(FramePacket::rgba(2, 1, 8, 0, 1, Bytes::from(vec![1; 8])).encode());
        producer.write_all(&wire).await.unwrap();

        assert_eq!(wait(&mut rx).await.kind, BackendEvent::FrameSource { connected: true });
        assert_eq!(wait(&mut rx).await.kind, BackendEvent::FrameReady);

        let (info, frame) = slot.take_latest().unwrap();
        assert_eq!(info.unwrap().width, 2);
        assert_eq!(frame.header.frame_id, 1);

        drop(producer);
        assert_eq!(wait(&mut rx).await.kind, BackendEvent::FrameSource { connected: false });
        assert_eq!(server.stats().discarded_bytes, 9);

        server.shutdown();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frames.sock");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = FrameServer::start(path.clone(), 3, FrameSlot::new(), tx).unwrap();

        let mut producer = UnixStream::connect(&path).await.unwrap();
        assert_eq!(wait(&mut rx).await.kind, BackendEvent::FrameSource { connected: true });

        server.shutdown();

        // The reader side is gone, so the producer sees EOF.
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(2), producer.read(&mut buf))
            .await
            .expect("connection left open after shutdown")
            .unwrap();
        assert_eq!(read, 0);

        // No task is left holding an event sender.
        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event channel still held after shutdown");
        assert!(closed.is_none());
    }

    #[test]
    fn test_rejects_long_path() {
        let long = PathBuf::from(format!("/tmp/{}.sock", "x".repeat(120)));
        assert!(matches!(check_socket_path(&long), Err(BridgeError::Io(_))));
    }
}
