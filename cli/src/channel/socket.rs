//! Player IPC socket: connection setup and reader-side routing.

use std::path::Path;
use std::time::Duration;

use tokio::net::UnixStream;

use crate::codec::json::{parse_message, property_delta, SocketMessage, OBSERVED_PROPERTIES};
use crate::codec::Command;
use crate::constants::{SOCKET_CONNECT_RETRY, SOCKET_CONNECT_TIMEOUT};
use crate::error::BridgeError;
use crate::events::{BackendEvent, BridgeEvent, EventSender};

use super::{CommandChannel, LineContext, Protocol, Reply};

/// Connect to the player's IPC socket, retrying while it starts up.
///
/// The player creates its socket some time after spawn, so connection
/// refusals and missing-file errors are retried every 100 ms until
/// `SOCKET_CONNECT_TIMEOUT` elapses.
pub async fn connect_with_retry(path: &Path) -> Result<UnixStream, BridgeError> {
    let deadline = tokio::time::Instant::now() + SOCKET_CONNECT_TIMEOUT;
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(e) if tokio::time::Instant::now() >= deadline => {
                return Err(BridgeError::Io(format!(
                    "could not connect to {}: {e}",
                    path.display()
                )));
            }
            Err(_) => tokio::time::sleep(SOCKET_CONNECT_RETRY).await,
        }
    }
}

impl CommandChannel {
    /// Open a JSON channel on a connected socket and subscribe to the
    /// properties that feed playback state.
    ///
    /// Emits [`BackendEvent::Ready`] once every subscription is acknowledged.
    pub async fn player(
        stream: UnixStream,
        backend_id: u64,
        events: EventSender,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let (read, write) = stream.into_split();
        let channel = Self::spawn(Protocol::Json, read, write, backend_id, events.clone(), timeout);

        for (id, property) in OBSERVED_PROPERTIES {
            let command = Command::Observe {
                id: *id,
                property: (*property).to_string(),
            };
            if let Err(e) = channel.send(&command).await {
                log::warn!("[CommandChannel] #{backend_id} observe {property} failed: {e}");
                if !e.is_retryable() && !matches!(e, BridgeError::CommandFailed(_)) {
                    return Err(e);
                }
            }
        }

        log::info!("[CommandChannel] #{backend_id} player IPC ready");
        let _ = events.send(BridgeEvent::new(backend_id, BackendEvent::Ready));
        Ok(channel)
    }
}

/// Route one JSON line from the player.
pub(crate) fn handle_line(line: &str, ctx: &LineContext) {
    let message = match parse_message(line) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("[CommandChannel] #{} {e}", ctx.backend_id);
            return;
        }
    };

    let event = match message {
        SocketMessage::Reply { request_id, outcome } => {
            let result = outcome
                .map(|data| Reply { data })
                .map_err(BridgeError::CommandFailed);
            if !ctx.pending.resolve(request_id, result) {
                log::debug!(
                    "[CommandChannel] #{} dropped late reply {request_id}",
                    ctx.backend_id
                );
            }
            return;
        }
        SocketMessage::PropertyChange { name, data } => {
            match property_delta(&name, data.as_ref()) {
                Some(delta) => BackendEvent::Status(delta),
                None => return,
            }
        }
        SocketMessage::Event { name, reason } => match (name.as_str(), reason.as_deref()) {
            ("end-file", Some("eof")) => BackendEvent::EndOfStream,
            ("end-file", Some("error")) => BackendEvent::Error("Playback error".to_string()),
            _ => {
                log::debug!("[CommandChannel] #{} event {name}", ctx.backend_id);
                return;
            }
        },
    };

    let _ = ctx.events.send(BridgeEvent::new(ctx.backend_id, event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;
    use tokio::sync::mpsc;

    /// Minimal stand-in for the player: acks every request, answers
    /// `get_property time-pos` with 42.5, and emits one property change.
    async fn fake_player(listener: UnixListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["request_id"].clone();
            let reply = if request["command"][0] == "get_property" {
                json!({"request_id": id, "error": "success", "data": 42.5})
            } else {
                json!({"request_id": id, "error": "success"})
            };
            write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
            if request["command"][0] == "set_property" {
                write
                    .write_all(b"{\"event\":\"property-change\",\"id\":1,\"name\":\"pause\",\"data\":true}\n")
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_player_channel_subscribes_and_replies() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mpv.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(fake_player(listener));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let stream = connect_with_retry(&path).await.unwrap();
        let channel = CommandChannel::player(stream, 3, tx, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, BackendEvent::Ready);

        let reply = channel
            .send(&Command::GetProperty("time-pos".into()))
            .await
            .unwrap();
        assert_eq!(reply.data, Some(json!(42.5)));

        channel.send(&Command::Pause).await.unwrap();
        match rx.recv().await.unwrap().kind {
            BackendEvent::Status(delta) => assert_eq!(delta.playing, Some(false)),
            other => panic!("Expected Status, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_retries_until_socket_appears() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("late.sock");
        let bind_path = path.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let listener = UnixListener::bind(&bind_path).unwrap();
            let _conn = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        assert!(connect_with_retry(&path).await.is_ok());
    }

    #[test]
    fn test_end_file_routing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = LineContext {
            backend_id: 1,
            pending: std::sync::Arc::new(super::super::PendingTable::new()),
            events: tx,
        };
        handle_line(r#"{"event":"end-file","reason":"eof"}"#, &ctx);
        handle_line(r#"{"event":"end-file","reason":"stop"}"#, &ctx);
        handle_line(r#"{"event":"start-file"}"#, &ctx);
        assert_eq!(rx.try_recv().unwrap().kind, BackendEvent::EndOfStream);
        assert!(rx.try_recv().is_err());
    }
}
