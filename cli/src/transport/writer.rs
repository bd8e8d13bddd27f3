//! Producer half of the frame transport.
//!
//! Frame production must never block on a slow reader, so frames pass
//! through a small bounded queue to a dedicated writer thread that owns the
//! socket. When the queue is full the oldest frame is discarded.
//!
//! ```text
//! producer ──submit──> FrameQueue (depth 3, drop-oldest) ──> writer thread ──> socket
//! ```

use std::collections::VecDeque;
use std::io::Write;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::codec::frame::FramePacket;
use crate::constants::{FRAME_QUEUE_DEPTH, FRAME_WRITER_DRAIN_TIMEOUT};

#[derive(Debug, Default)]
struct QueueInner {
    frames: VecDeque<Vec<u8>>,
    closed: bool,
    dropped: u64,
}

/// Bounded drop-oldest queue between producer and writer thread.
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
    depth: usize,
}

impl FrameQueue {
    /// Queue holding at most `depth` frames.
    pub fn new(depth: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            ready: Condvar::new(),
            depth: depth.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a frame, discarding the oldest one if full.
    ///
    /// Returns `false` once the queue is closed.
    pub fn push(&self, frame: Vec<u8>) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        while inner.frames.len() >= self.depth {
            inner.frames.pop_front();
            inner.dropped += 1;
        }
        inner.frames.push_back(frame);
        drop(inner);
        self.ready.notify_one();
        true
    }

    /// Block until a frame is available. `None` once closed and drained.
    pub fn pop(&self) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuse new frames and wake the writer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Frames waiting to be written.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Socket writer fed by a [`FrameQueue`].
///
/// Dropping the writer lets queued frames drain for a short while, then
/// shuts the socket down so a reader that stopped reading cannot hold the
/// drop hostage.
#[derive(Debug)]
pub struct FrameWriter {
    queue: Arc<FrameQueue>,
    thread: Option<JoinHandle<()>>,
    // Second handle on the writer thread's socket, used to unblock it.
    shutdown: UnixStream,
}

impl FrameWriter {
    /// Connect to the frame socket and start the writer thread.
    pub fn connect(path: &Path) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        Self::from_stream(stream)
    }

    /// Start the writer thread on an existing stream.
    pub fn from_stream(mut stream: UnixStream) -> std::io::Result<Self> {
        let shutdown = stream.try_clone()?;
        let queue = Arc::new(FrameQueue::new(FRAME_QUEUE_DEPTH));
        let thread_queue = Arc::clone(&queue);

        let thread = std::thread::Builder::new()
            .name("frame-writer".to_string())
            .spawn(move || {
                while let Some(frame) = thread_queue.pop() {
                    if let Err(e) = stream.write_all(&frame) {
                        log::warn!("[FrameTransport] Frame socket write failed: {e}");
                        thread_queue.close();
                        break;
                    }
                }
            })?;

        Ok(Self {
            queue,
            thread: Some(thread),
            shutdown,
        })
    }

    /// Queue a frame for writing. Returns `false` if the writer has stopped.
    pub fn submit(&self, packet: &FramePacket) -> bool {
        self.queue.push(packet.encode())
    }

    /// Frames dropped by the producer-side queue.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Whether the writer thread is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.queue.lock().closed
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        self.queue.close();
        let Some(thread) = self.thread.take() else {
            return;
        };

        let deadline = Instant::now() + FRAME_WRITER_DRAIN_TIMEOUT;
        while !thread.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if !thread.is_finished() {
            log::warn!("[FrameTransport] Frame reader stalled; abandoning queued frames");
            let _ = self.shutdown.shutdown(Shutdown::Both);
        }
        let _ = thread.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::decoder::FrameDecoder;
    use bytes::Bytes;
    use std::io::Read;

    #[test]
    fn test_full_queue_drops_oldest() {
        let queue = FrameQueue::new(3);
        for id in 1..=5u8 {
            assert!(queue.push(vec![id]));
        }
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.pop(), Some(vec![3]));
        assert_eq!(queue.pop(), Some(vec![4]));
        assert_eq!(queue.pop(), Some(vec![5]));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_drains_then_ends() {
        let queue = FrameQueue::new(3);
        queue.push(vec![1]);
        queue.close();
        assert!(!queue.push(vec![2]));
        assert_eq!(queue.pop(), Some(vec![1]));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_writer_delivers_decodable_frames() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let writer = FrameWriter::from_stream(a).unwrap();
        let packet = FramePacket::rgba(2, 2, 8, 40, 11, Bytes::from(vec![3; 16]));
        assert!(writer.is_open());
        assert!(writer.submit(&packet));
        drop(writer);

        let mut wire = Vec::new();
        b.read_to_end(&mut wire).unwrap();
        let frames = FrameDecoder::new().feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet, packet);
    }

    #[test]
    fn test_drop_returns_when_reader_stalls() {
        let (a, b) = UnixStream::pair().unwrap();
        let writer = FrameWriter::from_stream(a).unwrap();
        // Several megabytes of frames overrun the socket buffer while `b`
        // is never read.
        let packet = FramePacket::rgba(512, 512, 2048, 0, 1, Bytes::from(vec![7; 512 * 2048]));
        for _ in 0..FRAME_QUEUE_DEPTH + 2 {
            writer.submit(&packet);
        }
        std::thread::sleep(Duration::from_millis(50));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(writer);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
            "drop blocked on a stalled reader"
        );
        drop(b);
    }
}
