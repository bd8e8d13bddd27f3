//! Text-line protocol spoken by the helper backend over stdin/stdout.
//!
//! Requests (UI → helper), one per line:
//!
//! ```text
//! <command> <id> <arg>...
//! ```
//!
//! Replies and unsolicited lines (helper → UI):
//!
//! ```text
//! result <id> ok
//! result <id> error <message>
//! ready 1
//! status playing=1 volume=45 muted=0 position=12.340 duration=600.000 buffering=0
//! error <message>
//! warning <message>
//! debug <message>
//! ```
//!
//! Both directions are implemented here: the UI side formats commands and
//! parses replies, the helper side (see `crate::helper`) does the reverse.

use super::{Command, StatusDelta};
use crate::error::BridgeError;

/// A classified line received from the helper.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendLine {
    /// Reply to a numbered request.
    Result {
        /// Correlation id echoed from the request.
        id: u32,
        /// `Ok` or the backend's error message.
        outcome: Result<(), String>,
    },
    /// Helper finished initialising.
    Ready,
    /// Periodic or triggered state report.
    Status(StatusDelta),
    /// Playback error (pipeline failure, bad stream, ...).
    Error(String),
    /// Non-fatal condition, including end of stream.
    Warning(String),
    /// Diagnostic output, only sent when debug flags are on.
    Debug(String),
}

/// Format a command line for the helper (without the trailing newline).
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] for commands the helper does not speak
/// and for arguments that would break line framing.
pub fn encode_command(command: &Command, id: u32) -> Result<String, BridgeError> {
    let line = match command {
        Command::Window(handle) => format!("window {id} {handle}"),
        Command::Rect { x, y, width, height } => format!("rect {id} {x} {y} {width} {height}"),
        Command::Load(url) => {
            if url.is_empty() {
                return Err(BridgeError::Protocol("empty url".to_string()));
            }
            format!("load {id} {url}")
        }
        Command::Play => format!("play {id}"),
        Command::Pause => format!("pause {id}"),
        Command::TogglePause => format!("toggle {id}"),
        Command::Stop => format!("stop {id}"),
        Command::Seek { seconds, absolute: true } => format!("seek {id} {seconds:.3}"),
        Command::Volume(percent) => format!("volume {id} {}", (*percent).min(1000)),
        Command::Mute(muted) => format!("mute {id} {}", u8::from(*muted)),
        Command::Status => format!("status {id}"),
        Command::Quit => format!("quit {id}"),
        Command::Seek { absolute: false, .. }
        | Command::ToggleMute
        | Command::Observe { .. }
        | Command::GetProperty(_) => {
            return Err(BridgeError::Protocol(format!(
                "'{}' is not supported by the helper backend",
                command.name()
            )));
        }
    };

    if line.contains(['\n', '\r']) {
        return Err(BridgeError::Protocol(format!(
            "'{}' argument contains a line break",
            command.name()
        )));
    }
    Ok(line)
}

/// Classify one line received from the helper.
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] for empty, unknown, or malformed lines.
pub fn parse_line(line: &str) -> Result<BackendLine, BridgeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (kind, rest) = line.split_once(' ').unwrap_or((line, ""));

    match kind {
        "result" => parse_result(rest),
        "ready" => Ok(BackendLine::Ready),
        "status" => Ok(BackendLine::Status(parse_status_fields(rest))),
        "error" => Ok(BackendLine::Error(rest.to_string())),
        "warning" => Ok(BackendLine::Warning(rest.to_string())),
        "debug" => Ok(BackendLine::Debug(rest.to_string())),
        "" => Err(BridgeError::Protocol("empty line".to_string())),
        other => Err(BridgeError::Protocol(format!("unknown line kind '{other}'"))),
    }
}

fn parse_result(rest: &str) -> Result<BackendLine, BridgeError> {
    let mut parts = rest.splitn(3, ' ');
    let id = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| BridgeError::Protocol(format!("result without id: '{rest}'")))?;

    let outcome = match parts.next() {
        Some("ok") => Ok(()),
        Some("error") => Err(parts
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("unknown")
            .to_string()),
        other => {
            return Err(BridgeError::Protocol(format!(
                "result {id} has unknown outcome {other:?}"
            )));
        }
    };
    Ok(BackendLine::Result { id, outcome })
}

/// Parse `key=value` pairs of a status line.
///
/// Unknown keys are ignored; unparseable values leave that field unset.
pub fn parse_status_fields(fields: &str) -> StatusDelta {
    let mut delta = StatusDelta::default();
    for pair in fields.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            log::debug!("[StatusFeed] Ignoring status token without '=': {pair}");
            continue;
        };
        match key {
            "playing" => delta.playing = parse_flag(value),
            "volume" => delta.volume = value.parse().ok(),
            "muted" => delta.muted = parse_flag(value),
            "position" => delta.position = value.parse().ok(),
            "duration" => delta.duration = value.parse().ok(),
            "buffering" => delta.buffering = parse_flag(value),
            _ => {}
        }
    }
    delta
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

// ============================================================================
// Helper side
// ============================================================================

/// A command line as parsed by the helper.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    /// Correlation id, if the sender supplied one.
    pub id: Option<u32>,
    /// The command, or the error message to reply with.
    pub command: Result<Command, String>,
}

/// Parse a request line on the helper side.
///
/// The id is the second token when it consists only of digits. Returns
/// `None` for blank lines.
pub fn parse_command_line(line: &str) -> Option<CommandLine> {
    let line = line.trim_end();
    let mut parts: Vec<&str> = line.split(' ').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }

    let name = parts.remove(0);
    let id = match parts.first() {
        Some(token) if token.bytes().all(|b| b.is_ascii_digit()) => {
            let id = token.parse().ok();
            parts.remove(0);
            id
        }
        _ => None,
    };

    let command = match name {
        "window" => parts
            .first()
            .and_then(|h| h.parse().ok())
            .map(Command::Window)
            .ok_or_else(|| "missing window handle".to_string()),
        "rect" => {
            let nums: Vec<i32> = parts.iter().take(4).filter_map(|p| p.parse().ok()).collect();
            match nums.as_slice() {
                [x, y, width, height] => Ok(Command::Rect {
                    x: *x,
                    y: *y,
                    width: *width,
                    height: *height,
                }),
                _ => Err("missing rect args".to_string()),
            }
        }
        "load" => {
            if parts.is_empty() {
                Err("missing url".to_string())
            } else {
                Ok(Command::Load(parts.join(" ")))
            }
        }
        "play" => Ok(Command::Play),
        "pause" => Ok(Command::Pause),
        "toggle" => Ok(Command::TogglePause),
        "stop" => Ok(Command::Stop),
        "seek" => parts
            .first()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|seconds| Command::Seek { seconds, absolute: true })
            .ok_or_else(|| "missing seek time".to_string()),
        "volume" => parts
            .first()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| Command::Volume(v.clamp(0.0, 1000.0).round() as u16))
            .ok_or_else(|| "missing volume value".to_string()),
        "mute" => parts
            .first()
            .and_then(|m| m.parse::<i64>().ok())
            .map(|m| Command::Mute(m != 0))
            .ok_or_else(|| "missing mute value".to_string()),
        "status" => Ok(Command::Status),
        "quit" => Ok(Command::Quit),
        _ => Err("unknown command".to_string()),
    };

    Some(CommandLine { id, command })
}

/// Format a reply line on the helper side.
pub fn format_result(id: u32, outcome: &Result<(), String>) -> String {
    match outcome {
        Ok(()) => format!("result {id} ok"),
        Err(message) if message.is_empty() => format!("result {id} error unknown"),
        Err(message) => format!("result {id} error {message}"),
    }
}

/// A complete status report as emitted by the helper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    /// Pipeline is in the playing state.
    pub playing: bool,
    /// Volume in percent.
    pub volume: u32,
    /// Audio muted.
    pub muted: bool,
    /// Position in seconds.
    pub position: f64,
    /// Duration in seconds, 0 when unknown.
    pub duration: f64,
    /// Waiting on the network buffer.
    pub buffering: bool,
}

impl StatusReport {
    /// Format as a `status ...` line.
    pub fn to_line(&self) -> String {
        format!(
            "status playing={} volume={} muted={} position={:.3} duration={:.3} buffering={}",
            u8::from(self.playing),
            self.volume,
            u8::from(self.muted),
            self.position,
            self.duration,
            u8::from(self.buffering),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(encode_command(&Command::Play, 3).unwrap(), "play 3");
        assert_eq!(
            encode_command(&Command::Load("http://h/a b.ts".into()), 4).unwrap(),
            "load 4 http://h/a b.ts"
        );
        assert_eq!(
            encode_command(&Command::Rect { x: 10, y: 20, width: 640, height: 360 }, 5).unwrap(),
            "rect 5 10 20 640 360"
        );
        assert_eq!(
            encode_command(&Command::Seek { seconds: 12.5, absolute: true }, 6).unwrap(),
            "seek 6 12.500"
        );
        assert_eq!(encode_command(&Command::Volume(45), 7).unwrap(), "volume 7 45");
        assert_eq!(encode_command(&Command::Mute(true), 8).unwrap(), "mute 8 1");
        assert_eq!(encode_command(&Command::Window(777), 9).unwrap(), "window 9 777");
    }

    #[test]
    fn test_encode_rejects_line_breaks_and_unsupported() {
        let err = encode_command(&Command::Load("http://h/a\nquit".into()), 1).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(encode_command(&Command::ToggleMute, 1).is_err());
        assert!(encode_command(&Command::Seek { seconds: 5.0, absolute: false }, 1).is_err());
    }

    #[test]
    fn test_parse_status_line_merges_all_fields() {
        let line = "status playing=1 volume=45 muted=0 position=12.340 duration=600.000 buffering=0";
        match parse_line(line).unwrap() {
            BackendLine::Status(delta) => {
                assert_eq!(delta.playing, Some(true));
                assert_eq!(delta.volume, Some(45));
                assert_eq!(delta.muted, Some(false));
                assert_eq!(delta.position, Some(12.34));
                assert_eq!(delta.duration, Some(600.0));
                assert_eq!(delta.buffering, Some(false));
            }
            other => panic!("Expected Status, got: {other:?}"),
        }
    }

    #[test]
    fn test_parse_status_skips_bad_values() {
        let delta = parse_status_fields("playing=yes volume=abc position=3.5 junk extra=1");
        assert_eq!(delta.playing, None);
        assert_eq!(delta.volume, None);
        assert_eq!(delta.position, Some(3.5));
    }

    #[test]
    fn test_parse_results() {
        assert_eq!(
            parse_line("result 12 ok").unwrap(),
            BackendLine::Result { id: 12, outcome: Ok(()) }
        );
        assert_eq!(
            parse_line("result 13 error could not open resource").unwrap(),
            BackendLine::Result {
                id: 13,
                outcome: Err("could not open resource".to_string())
            }
        );
        assert!(parse_line("result x ok").is_err());
        assert!(parse_line("result 1 maybe").is_err());
    }

    #[test]
    fn test_parse_side_channel_lines() {
        assert_eq!(parse_line("ready 1").unwrap(), BackendLine::Ready);
        assert_eq!(
            parse_line("warning Playback ended").unwrap(),
            BackendLine::Warning("Playback ended".to_string())
        );
        assert_eq!(
            parse_line("debug state old=READY new=PAUSED").unwrap(),
            BackendLine::Debug("state old=READY new=PAUSED".to_string())
        );
        assert!(parse_line("").is_err());
        assert!(parse_line("hello world").is_err());
    }

    #[test]
    fn test_helper_parses_command_with_and_without_id() {
        let parsed = parse_command_line("seek 4 30.5").unwrap();
        assert_eq!(parsed.id, Some(4));
        assert_eq!(parsed.command, Ok(Command::Seek { seconds: 30.5, absolute: true }));

        let parsed = parse_command_line("play").unwrap();
        assert_eq!(parsed.id, None);
        assert_eq!(parsed.command, Ok(Command::Play));

        let parsed = parse_command_line("load 2 http://h/a b.ts").unwrap();
        assert_eq!(parsed.command, Ok(Command::Load("http://h/a b.ts".to_string())));

        let parsed = parse_command_line("rect 9 1 2").unwrap();
        assert_eq!(parsed.id, Some(9));
        assert_eq!(parsed.command, Err("missing rect args".to_string()));

        let parsed = parse_command_line("bogus 1").unwrap();
        assert_eq!(parsed.command, Err("unknown command".to_string()));

        assert!(parse_command_line("   ").is_none());
    }

    #[test]
    fn test_helper_output_lines_parse_back() {
        let report = StatusReport {
            playing: true,
            volume: 45,
            muted: false,
            position: 12.34,
            duration: 600.0,
            buffering: false,
        };
        assert_eq!(
            report.to_line(),
            "status playing=1 volume=45 muted=0 position=12.340 duration=600.000 buffering=0"
        );
        assert_eq!(format_result(3, &Ok(())), "result 3 ok");
        assert_eq!(format_result(3, &Err(String::new())), "result 3 error unknown");
    }
}
