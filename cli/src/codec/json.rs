//! JSON IPC protocol spoken by the player over its Unix socket.
//!
//! One JSON object per line in each direction. Requests carry a command
//! array and a `request_id`; replies echo the id with an `error` field whose
//! value is `"success"` on success. Events carry an `event` name instead.
//!
//! ```text
//! → {"command":["set_property","pause",true],"request_id":7}
//! ← {"request_id":7,"error":"success"}
//! ← {"event":"property-change","id":1,"name":"pause","data":true}
//! ```

use serde::Deserialize;
use serde_json::{json, Value};

use super::{Command, StatusDelta};
use crate::error::BridgeError;

/// Value of `error` on a successful reply.
pub const SUCCESS: &str = "success";

/// Properties observed on every player connection, with their observer ids.
pub const OBSERVED_PROPERTIES: &[(u32, &str)] = &[
    (1, "pause"),
    (2, "volume"),
    (3, "mute"),
    (4, "time-pos"),
    (5, "duration"),
    (6, "paused-for-cache"),
];

/// A decoded message from the player.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketMessage {
    /// Reply to a request.
    Reply {
        /// Correlation id echoed from the request.
        request_id: u32,
        /// Reply payload, or the player's error string.
        outcome: Result<Option<Value>, String>,
    },
    /// An observed property changed.
    PropertyChange {
        /// Property name.
        name: String,
        /// New value; `None` when the property became unavailable.
        data: Option<Value>,
    },
    /// Any other named event.
    Event {
        /// Event name (e.g. `end-file`).
        name: String,
        /// `reason` field when present (e.g. `eof`, `error`).
        reason: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    request_id: Option<u32>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

fn command_array(command: &Command) -> Result<Value, BridgeError> {
    let array = match command {
        Command::Load(url) => json!(["loadfile", url, "replace"]),
        Command::Play => json!(["set_property", "pause", false]),
        Command::Pause => json!(["set_property", "pause", true]),
        Command::TogglePause => json!(["cycle", "pause"]),
        Command::Stop => json!(["stop"]),
        Command::Seek { seconds, absolute } => {
            let mode = if *absolute { "absolute" } else { "relative" };
            json!(["seek", seconds, mode])
        }
        Command::Volume(percent) => json!(["set_property", "volume", (*percent).min(100)]),
        Command::Mute(muted) => json!(["set_property", "mute", muted]),
        Command::ToggleMute => json!(["cycle", "mute"]),
        Command::Quit => json!(["quit"]),
        Command::Observe { id, property } => json!(["observe_property", id, property]),
        Command::GetProperty(name) => json!(["get_property", name]),
        Command::Window(_) | Command::Rect { .. } | Command::Status => {
            return Err(BridgeError::Protocol(format!(
                "'{}' is not supported by the player backend",
                command.name()
            )));
        }
    };
    Ok(array)
}

/// Serialize a request line (without the trailing newline).
pub fn encode_request(command: &Command, request_id: u32) -> Result<String, BridgeError> {
    let request = json!({
        "command": command_array(command)?,
        "request_id": request_id,
    });
    serde_json::to_string(&request).map_err(|e| BridgeError::Protocol(e.to_string()))
}

/// Decode one line received from the player.
pub fn parse_message(line: &str) -> Result<SocketMessage, BridgeError> {
    let raw: RawMessage = serde_json::from_str(line)
        .map_err(|e| BridgeError::Protocol(format!("invalid JSON from player: {e}")))?;

    if let Some(event) = raw.event {
        if event == "property-change" {
            let name = raw
                .name
                .ok_or_else(|| BridgeError::Protocol("property-change without name".to_string()))?;
            return Ok(SocketMessage::PropertyChange {
                name,
                data: raw.data.filter(|v| !v.is_null()),
            });
        }
        return Ok(SocketMessage::Event {
            name: event,
            reason: raw.reason,
        });
    }

    let request_id = raw
        .request_id
        .ok_or_else(|| BridgeError::Protocol("message has neither event nor request_id".to_string()))?;
    let outcome = match raw.error.as_deref() {
        None | Some(SUCCESS) => Ok(raw.data.filter(|v| !v.is_null())),
        Some(message) => Err(message.to_string()),
    };
    Ok(SocketMessage::Reply { request_id, outcome })
}

/// Map an observed property value onto a status delta.
///
/// Returns `None` for properties that do not feed playback state or values
/// of the wrong type.
pub fn property_delta(name: &str, data: Option<&Value>) -> Option<StatusDelta> {
    let data = data?;
    let mut delta = StatusDelta::default();
    match name {
        "pause" => delta.playing = Some(!data.as_bool()?),
        "volume" => delta.volume = Some(data.as_f64()?.round() as i64),
        "mute" => delta.muted = Some(data.as_bool()?),
        "time-pos" => delta.position = Some(data.as_f64()?),
        "duration" => delta.duration = Some(data.as_f64()?),
        "paused-for-cache" => delta.buffering = Some(data.as_bool()?),
        _ => return None,
    }
    Some(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &Command) -> Value {
        serde_json::from_str(&encode_request(command, 7).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_request_shapes() {
        assert_eq!(
            request(&Command::Load("http://h/a.m3u8".into())),
            json!({"command": ["loadfile", "http://h/a.m3u8", "replace"], "request_id": 7})
        );
        assert_eq!(
            request(&Command::Pause)["command"],
            json!(["set_property", "pause", true])
        );
        assert_eq!(
            request(&Command::Seek { seconds: -10.0, absolute: false })["command"],
            json!(["seek", -10.0, "relative"])
        );
        assert_eq!(
            request(&Command::Observe { id: 4, property: "time-pos".into() })["command"],
            json!(["observe_property", 4, "time-pos"])
        );
        assert_eq!(request(&Command::ToggleMute)["command"], json!(["cycle", "mute"]));
    }

    #[test]
    fn test_encode_escapes_newlines_inside_strings() {
        let line = encode_request(&Command::Load("http://h/a\nb".into()), 1).unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_window_commands_unsupported() {
        assert!(encode_request(&Command::Rect { x: 0, y: 0, width: 1, height: 1 }, 1).is_err());
        assert!(encode_request(&Command::Window(1), 1).is_err());
    }

    #[test]
    fn test_parse_replies() {
        assert_eq!(
            parse_message(r#"{"request_id":3,"error":"success"}"#).unwrap(),
            SocketMessage::Reply { request_id: 3, outcome: Ok(None) }
        );
        assert_eq!(
            parse_message(r#"{"request_id":4,"error":"success","data":12.5}"#).unwrap(),
            SocketMessage::Reply { request_id: 4, outcome: Ok(Some(json!(12.5))) }
        );
        assert_eq!(
            parse_message(r#"{"request_id":5,"error":"property unavailable"}"#).unwrap(),
            SocketMessage::Reply {
                request_id: 5,
                outcome: Err("property unavailable".to_string())
            }
        );
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_message(r#"{"event":"property-change","id":1,"name":"pause","data":false}"#)
                .unwrap(),
            SocketMessage::PropertyChange {
                name: "pause".to_string(),
                data: Some(json!(false))
            }
        );
        assert_eq!(
            parse_message(r#"{"event":"end-file","reason":"eof","playlist_entry_id":1}"#).unwrap(),
            SocketMessage::Event {
                name: "end-file".to_string(),
                reason: Some("eof".to_string())
            }
        );
        assert!(parse_message("not json").is_err());
        assert!(parse_message("{}").is_err());
    }

    #[test]
    fn test_property_delta_mapping() {
        let delta = property_delta("pause", Some(&json!(true))).unwrap();
        assert_eq!(delta.playing, Some(false));
        let delta = property_delta("volume", Some(&json!(44.6))).unwrap();
        assert_eq!(delta.volume, Some(45));
        let delta = property_delta("paused-for-cache", Some(&json!(true))).unwrap();
        assert_eq!(delta.buffering, Some(true));
        assert!(property_delta("time-pos", None).is_none());
        assert!(property_delta("time-pos", Some(&json!("x"))).is_none());
        assert!(property_delta("chapter", Some(&json!(1))).is_none());
    }
}
