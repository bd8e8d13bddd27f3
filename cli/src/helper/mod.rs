//! Synthetic helper backend (`tvbridge-testsrc`).
//!
//! Speaks the text-line protocol on stdin/stdout and streams a generated
//! test pattern over the frame socket named by `TVBRIDGE_FRAME_SOCKET`.
//! Playback is simulated: position advances in real time while playing,
//! loads can be made to fail by extension, each load can be followed by a
//! buffering period, and a finite duration ends with `warning Playback
//! ended`.
//!
//! The control loop runs on the tokio task that owns [`TestSource`]; frames
//! go to a [`FrameWriter`] thread through its latest-wins queue so a slow
//! reader never stalls command handling.
//!
//! Rust guideline compliant 2026-02

pub mod pattern;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use crate::codec::text::{format_result, parse_command_line, StatusReport};
use crate::codec::Command;
use crate::constants::{MAX_LINE_LENGTH, STATUS_POLL_INTERVAL};
use crate::env;
use crate::transport::FrameWriter;

pub use pattern::TestPattern;

/// Frames per second of the generated pattern.
const FRAME_RATE: u32 = 25;
/// Generated frame size.
const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 180;

/// Highest linear gain accepted by `volume` (wire value 1000).
const MAX_GAIN: f64 = 10.0;

/// Helper settings, read from the environment the supervisor prepares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelperOptions {
    /// Frame socket to connect to.
    pub frame_socket: Option<PathBuf>,
    /// Emit `debug` lines.
    pub debug: bool,
    /// Emit HTTP-level `debug` lines.
    pub http_debug: bool,
    /// User agent a real network source would send.
    pub user_agent: Option<String>,
    /// Referer a real network source would send.
    pub referer: Option<String>,
    /// Network timeout in seconds.
    pub http_timeout: Option<u64>,
    /// Lowercase extensions whose `load` fails.
    pub reject_extensions: Vec<String>,
    /// Simulated buffering after each load.
    pub buffer_time: Duration,
    /// Media duration in seconds; 0 plays forever.
    pub duration: f64,
}

impl HelperOptions {
    /// Read every option from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(env::non_empty)
    }

    /// Read options through `lookup`, which returns non-empty values only.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|v| env::is_truthy(&v));
        let number = |name: &str| lookup(name).and_then(|v| v.trim().parse::<f64>().ok());

        Self {
            frame_socket: lookup(env::FRAME_SOCKET).map(PathBuf::from),
            debug: flag(env::DEBUG),
            http_debug: flag(env::HTTP_DEBUG),
            user_agent: lookup(env::HTTP_USER_AGENT),
            referer: lookup(env::HTTP_REFERER),
            http_timeout: lookup(env::HTTP_TIMEOUT).and_then(|v| v.trim().parse().ok()),
            reject_extensions: lookup(env::TESTSRC_REJECT)
                .map(|v| {
                    v.split(',')
                        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                        .filter(|ext| !ext.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            buffer_time: number(env::TESTSRC_BUFFER_MS)
                .filter(|ms| ms.is_finite() && *ms > 0.0)
                .map_or(Duration::ZERO, |ms| Duration::from_secs_f64(ms / 1000.0)),
            duration: number(env::TESTSRC_DURATION)
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(0.0),
        }
    }
}

/// What the control loop should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Reply for the command's id.
    pub result: Result<(), String>,
    /// Unsolicited lines to write after the reply.
    pub lines: Vec<String>,
    /// The helper should exit.
    pub quit: bool,
}

impl Outcome {
    fn ok() -> Self {
        Self {
            result: Ok(()),
            lines: Vec::new(),
            quit: false,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            lines: Vec::new(),
            quit: false,
        }
    }

    fn with_line(mut self, line: String) -> Self {
        self.lines.push(line);
        self
    }
}

/// Simulated playback pipeline.
#[derive(Debug, Clone)]
pub struct TestSource {
    options: HelperOptions,
    url: Option<String>,
    /// What the user last asked for; buffering never changes it.
    want_playing: bool,
    playing: bool,
    gain: f64,
    muted: bool,
    position: f64,
    buffering_left: Option<Duration>,
    window: Option<u64>,
    rect: Option<(i32, i32, i32, i32)>,
}

impl TestSource {
    /// Idle pipeline.
    pub fn new(options: HelperOptions) -> Self {
        Self {
            options,
            url: None,
            want_playing: false,
            playing: false,
            gain: 1.0,
            muted: false,
            position: 0.0,
            buffering_left: None,
            window: None,
            rect: None,
        }
    }

    /// Whether frames should be produced right now.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the simulated network buffer is refilling.
    pub fn is_buffering(&self) -> bool {
        self.buffering_left.is_some()
    }

    /// Loaded URL.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Position in seconds.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Native window the video would be embedded in.
    pub fn window(&self) -> Option<u64> {
        self.window
    }

    /// Last placement rect.
    pub fn rect(&self) -> Option<(i32, i32, i32, i32)> {
        self.rect
    }

    /// Current state as a status report.
    pub fn report(&self) -> StatusReport {
        StatusReport {
            playing: self.playing,
            volume: (self.gain * 100.0).round() as u32,
            muted: self.muted,
            position: self.position,
            duration: self.options.duration,
            buffering: self.is_buffering(),
        }
    }

    fn debug(&self, message: impl std::fmt::Display) -> Option<String> {
        self.options.debug.then(|| format!("debug {message}"))
    }

    /// Apply one command.
    pub fn handle(&mut self, command: &Command) -> Outcome {
        let mut outcome = match command {
            Command::Window(handle) => {
                self.window = Some(*handle);
                Outcome::ok()
            }
            Command::Rect {
                x,
                y,
                width,
                height,
            } => {
                self.rect = Some((*x, *y, *width, *height));
                Outcome::ok()
            }
            Command::Load(url) => return self.load(url),
            Command::Play => {
                if self.url.is_none() {
                    return Outcome::err("no media loaded");
                }
                self.want_playing = true;
                self.playing = !self.is_buffering();
                Outcome::ok().with_line(self.report().to_line())
            }
            Command::Pause => {
                self.want_playing = false;
                self.playing = false;
                Outcome::ok().with_line(self.report().to_line())
            }
            Command::TogglePause => {
                let command = if self.want_playing {
                    Command::Pause
                } else {
                    Command::Play
                };
                return self.handle(&command);
            }
            Command::Stop => {
                self.url = None;
                self.want_playing = false;
                self.playing = false;
                self.position = 0.0;
                self.buffering_left = None;
                Outcome::ok().with_line(self.report().to_line())
            }
            Command::Seek { seconds, .. } => {
                if self.url.is_none() {
                    return Outcome::err("no media loaded");
                }
                let mut target = seconds.max(0.0);
                if self.options.duration > 0.0 {
                    target = target.min(self.options.duration);
                }
                self.position = target;
                Outcome::ok().with_line(self.report().to_line())
            }
            Command::Volume(value) => {
                self.gain = (f64::from(*value) / 100.0).clamp(0.0, MAX_GAIN);
                Outcome::ok().with_line(self.report().to_line())
            }
            Command::Mute(muted) => {
                self.muted = *muted;
                Outcome::ok().with_line(self.report().to_line())
            }
            Command::Status => Outcome::ok().with_line(self.report().to_line()),
            Command::Quit => Outcome {
                quit: true,
                ..Outcome::ok()
            },
            other => Outcome::err(format!("unsupported command {}", other.name())),
        };
        if let Some(line) = self.debug(format_args!("handled {}", command.name())) {
            outcome.lines.insert(0, line);
        }
        outcome
    }

    fn load(&mut self, url: &str) -> Outcome {
        let mut outcome = Outcome::ok();
        if self.options.http_debug {
            outcome.lines.push(format!(
                "debug http get {url} user-agent={} referer={} timeout={}",
                self.options.user_agent.as_deref().unwrap_or("-"),
                self.options.referer.as_deref().unwrap_or("-"),
                self.options.http_timeout.map_or_else(|| "-".to_string(), |t| t.to_string()),
            ));
        }

        if let Some(ext) = url_extension(url) {
            if self.options.reject_extensions.iter().any(|r| *r == ext) {
                return Outcome {
                    result: Err(format!("could not open {url}")),
                    ..outcome
                };
            }
        }

        self.url = Some(url.to_string());
        self.position = 0.0;
        self.want_playing = true;
        if self.options.buffer_time.is_zero() {
            self.buffering_left = None;
            self.playing = true;
        } else {
            self.buffering_left = Some(self.options.buffer_time);
            self.playing = false;
        }
        if let Some(line) = self.debug(format_args!("loaded {url}")) {
            outcome.lines.push(line);
        }
        outcome.lines.push(self.report().to_line());
        outcome
    }

    /// Advance simulated time. Returns lines to emit.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(left) = self.buffering_left {
            match left.checked_sub(elapsed).filter(|d| !d.is_zero()) {
                Some(left) => self.buffering_left = Some(left),
                None => {
                    self.buffering_left = None;
                    self.playing = self.want_playing;
                    lines.push(self.report().to_line());
                }
            }
            return lines;
        }

        if !self.playing {
            return lines;
        }
        self.position += elapsed.as_secs_f64();
        let duration = self.options.duration;
        if duration > 0.0 && self.position >= duration {
            self.position = duration;
            self.playing = false;
            self.want_playing = false;
            lines.push(self.report().to_line());
            lines.push("warning Playback ended".to_string());
        }
        lines
    }
}

/// Lowercase extension of the URL's last path segment, ignoring the query.
fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Run the helper on this process's stdin/stdout.
pub async fn run(options: HelperOptions) -> Result<()> {
    let socket = options
        .frame_socket
        .clone()
        .with_context(|| format!("{} is not set", env::FRAME_SOCKET))?;
    let frames = FrameWriter::connect(&socket)
        .with_context(|| format!("failed to connect frame socket {}", socket.display()))?;
    log::info!("[TestSrc] Connected frame socket {}", socket.display());

    serve(options, tokio::io::stdin(), tokio::io::stdout(), Some(frames)).await
}

/// Control loop over arbitrary streams.
///
/// Returns on `quit` or when the command stream closes.
pub async fn serve<R, W>(
    options: HelperOptions,
    reader: R,
    writer: W,
    frames: Option<FrameWriter>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut commands = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let mut out = FramedWrite::new(writer, LinesCodec::new());
    let mut source = TestSource::new(options);
    let pattern = TestPattern::new(FRAME_WIDTH, FRAME_HEIGHT);
    let mut frame_index: u32 = 0;

    out.send("ready 1").await.context("failed to write ready")?;

    let mut status_tick = tokio::time::interval(STATUS_POLL_INTERVAL);
    status_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut frame_tick = tokio::time::interval(Duration::from_secs(1) / FRAME_RATE);
    frame_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_advance = tokio::time::Instant::now();

    loop {
        tokio::select! {
            line = commands.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        log::warn!("[TestSrc] Dropping overlong command line");
                        continue;
                    }
                    Some(Err(LinesCodecError::Io(e))) => {
                        log::warn!("[TestSrc] Command stream error: {e}");
                        break;
                    }
                    None => {
                        log::info!("[TestSrc] Command stream closed");
                        break;
                    }
                };
                let Some(parsed) = parse_command_line(&line) else {
                    continue;
                };
                let outcome = match parsed.command {
                    Ok(command) => source.handle(&command),
                    Err(message) => Outcome::err(message),
                };
                if let Some(id) = parsed.id {
                    out.send(format_result(id, &outcome.result)).await?;
                }
                for extra in &outcome.lines {
                    out.send(extra.as_str()).await?;
                }
                if outcome.quit {
                    log::info!("[TestSrc] Quit requested");
                    break;
                }
            }

            _ = status_tick.tick() => {
                let now = tokio::time::Instant::now();
                for line in source.advance(now - last_advance) {
                    out.send(line).await?;
                }
                last_advance = now;
                if source.url().is_some() {
                    out.send(source.report().to_line()).await?;
                }
            }

            _ = frame_tick.tick() => {
                let Some(frames) = frames.as_ref() else { continue };
                if !source.is_playing() {
                    continue;
                }
                let pts = (source.position() * 1e9) as u64;
                let packet = pattern.render(frame_index, pts);
                frame_index = frame_index.wrapping_add(1);
                if !frames.submit(&packet) {
                    log::warn!("[TestSrc] Frame writer stopped");
                    out.send("error Frame socket closed").await?;
                    break;
                }
            }
        }
    }

    if let Some(frames) = frames.as_ref() {
        log::info!("[TestSrc] Exiting ({} frames dropped)", frames.dropped());
    }
    Ok(())
}
