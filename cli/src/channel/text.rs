//! Reader-side routing for the helper's text-line protocol.

use crate::codec::text::{parse_line, BackendLine};
use crate::error::BridgeError;
use crate::events::{BackendEvent, BridgeEvent};

use super::{LineContext, Reply};

/// Warning text the helper sends when the stream reaches its end.
pub const END_OF_STREAM_WARNING: &str = "Playback ended";

/// Route one line from the helper's stdout.
pub(crate) fn handle_line(line: &str, ctx: &LineContext) {
    let parsed = match parse_line(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("[CommandChannel] #{} {e}: {line:?}", ctx.backend_id);
            return;
        }
    };

    let event = match parsed {
        BackendLine::Result { id, outcome } => {
            let result = outcome
                .map(|()| Reply::default())
                .map_err(BridgeError::CommandFailed);
            if !ctx.pending.resolve(id, result) {
                log::debug!("[CommandChannel] #{} dropped late reply {id}", ctx.backend_id);
            }
            return;
        }
        BackendLine::Ready => BackendEvent::Ready,
        BackendLine::Status(delta) => BackendEvent::Status(delta),
        BackendLine::Error(message) => {
            log::warn!("[CommandChannel] #{} backend error: {message}", ctx.backend_id);
            BackendEvent::Error(message)
        }
        BackendLine::Warning(message) if message == END_OF_STREAM_WARNING => {
            BackendEvent::EndOfStream
        }
        BackendLine::Warning(message) => {
            log::warn!("[CommandChannel] #{} backend warning: {message}", ctx.backend_id);
            BackendEvent::Warning(message)
        }
        BackendLine::Debug(message) => {
            log::debug!("[CommandChannel] #{} {message}", ctx.backend_id);
            BackendEvent::Debug(message)
        }
    };

    let _ = ctx.events.send(BridgeEvent::new(ctx.backend_id, event));
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::sync::mpsc;

    use crate::channel::{CommandChannel, Protocol};
    use crate::codec::Command;
    use crate::error::BridgeError;
    use crate::events::{BackendEvent, BridgeEvent};

    fn channel_pair(
        timeout: Duration,
    ) -> (
        CommandChannel,
        tokio::io::DuplexStream,
        mpsc::UnboundedReceiver<BridgeEvent>,
    ) {
        let (ui, backend) = tokio::io::duplex(64 * 1024);
        let (read, write) = tokio::io::split(ui);
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = CommandChannel::spawn(Protocol::Text, read, write, 7, tx, timeout);
        (channel, backend, rx)
    }

    #[tokio::test]
    async fn test_reply_resolves_request() {
        let (channel, backend, _events) = channel_pair(Duration::from_secs(2));
        let (backend_read, mut backend_write) = tokio::io::split(backend);

        tokio::spawn(async move {
            let mut lines = BufReader::new(backend_read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, "play 1");
            backend_write.write_all(b"result 1 ok\n").await.unwrap();
            let line = lines.next_line().await.unwrap().unwrap();
            assert_eq!(line, "load 2 http://h/x.ts");
            backend_write
                .write_all(b"result 2 error could not open resource\n")
                .await
                .unwrap();
        });

        assert!(channel.send(&Command::Play).await.is_ok());
        let err = channel
            .send(&Command::Load("http://h/x.ts".into()))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::CommandFailed("could not open resource".into()));
    }

    #[tokio::test]
    async fn test_out_of_order_replies_match_by_id() {
        let (channel, backend, _events) = channel_pair(Duration::from_secs(2));
        let (backend_read, mut backend_write) = tokio::io::split(backend);

        tokio::spawn(async move {
            let mut lines = BufReader::new(backend_read).lines();
            lines.next_line().await.unwrap();
            lines.next_line().await.unwrap();
            backend_write
                .write_all(b"result 2 ok\nresult 1 error first failed\n")
                .await
                .unwrap();
        });

        let (first, second) = tokio::join!(channel.send(&Command::Pause), channel.send(&Command::Stop));
        assert_eq!(first.unwrap_err(), BridgeError::CommandFailed("first failed".into()));
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_removes_entry_and_drops_late_reply() {
        let (channel, backend, _events) = channel_pair(Duration::from_millis(50));
        let (backend_read, mut backend_write) = tokio::io::split(backend);
        let mut lines = BufReader::new(backend_read).lines();

        let err = channel.send(&Command::Status).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { ref command, .. } if command == "status"));
        assert!(channel.pending().is_empty());

        // Late reply is ignored; the next request still works.
        lines.next_line().await.unwrap();
        backend_write.write_all(b"result 1 ok\n").await.unwrap();
        let responder = tokio::spawn(async move {
            lines.next_line().await.unwrap();
            backend_write.write_all(b"result 2 ok\n").await.unwrap();
        });
        assert!(channel.send(&Command::Play).await.is_ok());
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_side_channel_lines_become_events() {
        let (channel, mut backend, mut events) = channel_pair(Duration::from_secs(2));
        backend
            .write_all(
                b"ready 1\nstatus playing=1 volume=45 muted=0 position=1.000 duration=0.000 buffering=0\nwarning Playback ended\ngarbage\n",
            )
            .await
            .unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first, BridgeEvent::new(7, BackendEvent::Ready));
        match events.recv().await.unwrap().kind {
            BackendEvent::Status(delta) => assert_eq!(delta.volume, Some(45)),
            other => panic!("Expected Status, got: {other:?}"),
        }
        assert_eq!(events.recv().await.unwrap().kind, BackendEvent::EndOfStream);
        assert!(channel.pending().is_empty());
    }

    #[tokio::test]
    async fn test_backend_eof_rejects_pending() {
        let (channel, backend, _events) = channel_pair(Duration::from_secs(5));
        let (backend_read, backend_write) = tokio::io::split(backend);

        tokio::spawn(async move {
            let mut lines = BufReader::new(backend_read).lines();
            lines.next_line().await.unwrap();
            drop(backend_write);
            drop(lines);
        });

        let err = channel.send(&Command::Play).await.unwrap_err();
        assert_eq!(err, BridgeError::BackendStopped);
        assert_eq!(channel.send(&Command::Play).await.unwrap_err(), BridgeError::NotConnected);
    }

    #[tokio::test]
    async fn test_bad_argument_never_written() {
        let (channel, _backend, _events) = channel_pair(Duration::from_secs(1));
        let err = channel
            .send(&Command::Load("http://h/a\r\nquit".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(channel.pending().is_empty());
    }
}
