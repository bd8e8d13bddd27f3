//! Playback façade: the one contract the UI talks to.
//!
//! A [`Session`] owns at most one backend at a time, the merged playback
//! state, the status throttle, the viewport translator, and the listener
//! lists. Background tasks only send events; all state changes happen on
//! the task that calls [`Session::dispatch_next`] or
//! [`Session::dispatch_pending`].
//!
//! # Usage
//!
//! ```ignore
//! let mut session = Session::new(BridgeConfig::load()?);
//! session.listeners_mut().status.add(|state| println!("{state:?}"));
//! session.load("http://host/live/1234.ts").await?;
//! loop {
//!     session.dispatch_next().await;
//! }
//! ```
//!
//! Rust guideline compliant 2026-02

pub mod fallback;
pub mod listeners;
pub mod phase;

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channel::Reply;
use crate::codec::json::{property_delta, OBSERVED_PROPERTIES};
use crate::codec::{Command, StatusDelta};
use crate::config::{BackendKind, BridgeConfig};
use crate::error::BridgeError;
use crate::events::{BackendEvent, BridgeEvent, EventReceiver, EventSender, ExitReport};
use crate::status::{BufferingTransition, Intent, PlaybackState, StatusFeed, StatusThrottle};
use crate::supervisor::{BackendHandle, LaunchSpec, Supervisor};
use crate::transport::{DecoderStats, FrameServer, FrameSlot};
use crate::viewport::{translate, LayoutGeometry, ViewportRect, ViewportTranslator};

pub use fallback::{fallback_candidates, ContentKind};
pub use listeners::{BackendFault, Listeners, SessionListeners};
pub use phase::PlaybackPhase;

/// Playback session for one window.
pub struct Session {
    config: BridgeConfig,
    backend_kind: BackendKind,
    supervisor: Supervisor,
    events_tx: EventSender,
    events_rx: EventReceiver,
    handle: Option<BackendHandle>,
    frame_server: Option<FrameServer>,
    slot: FrameSlot,
    feed: StatusFeed,
    throttle: StatusThrottle,
    phase: PlaybackPhase,
    viewport: ViewportTranslator,
    desired_viewport: Option<ViewportRect>,
    window: Option<u64>,
    current_url: Option<String>,
    listeners: SessionListeners,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend_kind", &self.backend_kind)
            .field("handle", &self.handle)
            .field("phase", &self.phase)
            .field("current_url", &self.current_url)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session using the configured backend.
    pub fn new(config: BridgeConfig) -> Self {
        let kind = config.backend;
        Self::with_backend(config, kind)
    }

    /// Session using an explicit backend.
    pub fn with_backend(config: BridgeConfig, backend_kind: BackendKind) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(events_tx.clone(), config.request_timeout());
        let throttle = StatusThrottle::new(config.throttle_interval());
        Self {
            config,
            backend_kind,
            supervisor,
            events_tx,
            events_rx,
            handle: None,
            frame_server: None,
            slot: FrameSlot::new(),
            feed: StatusFeed::new(),
            throttle,
            phase: PlaybackPhase::Idle,
            viewport: ViewportTranslator::new(),
            desired_viewport: None,
            window: None,
            current_url: None,
            listeners: SessionListeners::default(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Snapshot of the merged playback state.
    pub fn status(&self) -> PlaybackState {
        self.feed.snapshot()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// URL accepted by the last successful load.
    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Backend variant this session drives.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend_kind
    }

    /// Whether a backend process is running.
    pub fn is_backend_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(BackendHandle::is_alive)
    }

    /// Generation id of the current backend.
    pub fn backend_id(&self) -> Option<u64> {
        self.handle.as_ref().map(BackendHandle::id)
    }

    /// Process id of the current backend, if it is running.
    pub fn backend_pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(BackendHandle::pid)
    }

    /// Listener lists, for registration.
    pub fn listeners_mut(&mut self) -> &mut SessionListeners {
        &mut self.listeners
    }

    /// Slot holding the newest decoded frame.
    pub fn frame_slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Frame decoder counters for the current backend.
    pub fn frame_stats(&self) -> Option<DecoderStats> {
        self.frame_server.as_ref().map(FrameServer::stats)
    }

    // ========================================================================
    // Backend lifecycle
    // ========================================================================

    async fn ensure_backend(&mut self) -> Result<(), BridgeError> {
        if self.is_backend_alive() {
            return Ok(());
        }
        if self.handle.is_some() {
            self.release_backend().await;
        }

        let id = self.supervisor.reserve_id();
        let socket_path = self.socket_path(id);
        let spec = match self.backend_kind {
            BackendKind::Helper => {
                let server = FrameServer::start(
                    socket_path.clone(),
                    id,
                    self.slot.clone(),
                    self.events_tx.clone(),
                )?;
                self.frame_server = Some(server);
                LaunchSpec::helper(&self.config, &socket_path)
            }
            BackendKind::Player => LaunchSpec::player(&self.config, &socket_path, self.window),
        };

        let handle = match self.supervisor.start(id, spec).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(server) = self.frame_server.take() {
                    server.shutdown();
                }
                return Err(e);
            }
        };

        log::info!(
            "[Playback] {} backend #{id} started (pid {:?})",
            self.backend_kind,
            handle.pid()
        );
        self.handle = Some(handle);
        self.feed.reset();
        self.throttle.reset();
        self.slot.clear();
        self.viewport.invalidate();
        self.phase = PlaybackPhase::Idle;

        if self.backend_kind == BackendKind::Helper {
            if let Some(window) = self.window {
                self.send(&Command::Window(window)).await?;
            }
            if let Some(rect) = self.desired_viewport {
                self.apply_viewport(rect).await?;
            }
        }
        Ok(())
    }

    fn socket_path(&self, id: u64) -> PathBuf {
        let suffix: u16 = rand::random();
        let name = match self.backend_kind {
            BackendKind::Helper => "frames",
            BackendKind::Player => "ipc",
        };
        self.config.runtime_dir().join(format!(
            "tvbridge-{}-{id}-{suffix:04x}-{name}.sock",
            std::process::id()
        ))
    }

    /// Drop the current backend after it died or before replacing it.
    async fn release_backend(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop().await;
        }
        if let Some(server) = self.frame_server.take() {
            server.shutdown();
        }
        self.slot.clear();
    }

    async fn send(&self, command: &Command) -> Result<Reply, BridgeError> {
        let handle = self.handle.as_ref().ok_or(BridgeError::NotReady)?;
        handle.send(command).await
    }

    /// Stop the backend process and release its sockets (window close or
    /// app quit).
    pub async fn shutdown(&mut self) {
        if self.handle.is_some() {
            log::info!("[Playback] Shutting down backend");
        }
        self.release_backend().await;
        self.phase = PlaybackPhase::Idle;
        self.current_url = None;
        self.feed.set_intent(Intent::Pause);
    }

    // ========================================================================
    // Playback commands
    // ========================================================================

    /// Load `url`, inferring live vs on-demand from its path.
    pub async fn load(&mut self, url: &str) -> Result<(), BridgeError> {
        self.load_with(url, ContentKind::infer(url)).await
    }

    /// Load `url`, trying fallback candidates until one is accepted.
    ///
    /// On failure the phase is restored and the primary candidate's error
    /// is returned.
    pub async fn load_with(&mut self, url: &str, kind: ContentKind) -> Result<(), BridgeError> {
        self.ensure_backend().await?;

        let previous = self.phase;
        self.phase = PlaybackPhase::Loading;
        let mut primary_error: Option<BridgeError> = None;

        for candidate in fallback_candidates(url, kind) {
            log::info!("[Playback] Loading {candidate}");
            match self.send(&Command::Load(candidate.clone())).await {
                Ok(_) => {
                    self.current_url = Some(candidate);
                    self.feed.reset_media();
                    self.feed.set_intent(Intent::Play);
                    self.phase = PlaybackPhase::Playing;
                    self.mark_status_changed();
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("[Playback] {candidate} rejected: {e}");
                    let fatal = matches!(
                        e,
                        BridgeError::BackendStopped | BridgeError::NotConnected | BridgeError::NotReady
                    );
                    primary_error.get_or_insert(e);
                    if fatal {
                        break;
                    }
                }
            }
        }

        self.phase = previous;
        let message = primary_error.map_or_else(|| "no candidates".to_string(), |e| e.to_string());
        Err(BridgeError::LoadFailed {
            url: url.to_string(),
            message,
        })
    }

    /// Resume playback.
    pub async fn play(&mut self) -> Result<(), BridgeError> {
        self.send(&Command::Play).await?;
        self.feed.set_intent(Intent::Play);
        self.phase = if self.feed.is_buffering() {
            PlaybackPhase::Buffering { resume: true }
        } else {
            PlaybackPhase::Playing
        };
        Ok(())
    }

    /// Pause playback.
    pub async fn pause(&mut self) -> Result<(), BridgeError> {
        self.send(&Command::Pause).await?;
        self.feed.set_intent(Intent::Pause);
        self.phase = if self.feed.is_buffering() {
            PlaybackPhase::Buffering { resume: false }
        } else {
            PlaybackPhase::Paused
        };
        Ok(())
    }

    /// Flip between play and pause.
    pub async fn toggle_pause(&mut self) -> Result<(), BridgeError> {
        match self.feed.intent() {
            Intent::Play => self.pause().await,
            Intent::Pause => self.play().await,
        }
    }

    /// Stop playback. Without a backend or loaded media this is a no-op.
    pub async fn stop(&mut self) -> Result<(), BridgeError> {
        if self.handle.is_none() || self.phase == PlaybackPhase::Idle {
            return Ok(());
        }
        let result = self.send(&Command::Stop).await.map(|_| ());
        self.phase = PlaybackPhase::Idle;
        self.current_url = None;
        self.feed.set_intent(Intent::Pause);
        self.feed.reset_media();
        self.mark_status_changed();
        match result {
            Err(BridgeError::NotConnected | BridgeError::BackendStopped) => Ok(()),
            other => other,
        }
    }

    /// Set volume in percent (0..=100).
    pub async fn set_volume(&mut self, percent: u8) -> Result<(), BridgeError> {
        self.send(&Command::Volume(u16::from(percent.min(100))))
            .await
            .map(|_| ())
    }

    /// Flip mute.
    pub async fn toggle_mute(&mut self) -> Result<(), BridgeError> {
        let command = match self.backend_kind {
            BackendKind::Helper => Command::Mute(!self.feed.snapshot().muted),
            BackendKind::Player => Command::ToggleMute,
        };
        self.send(&command).await.map(|_| ())
    }

    /// Seek to `seconds` (absolute) or by `seconds` (relative).
    pub async fn seek(&mut self, seconds: f64, absolute: bool) -> Result<(), BridgeError> {
        if !seconds.is_finite() {
            return Err(BridgeError::Protocol("seek target is not a number".to_string()));
        }
        let command = match (self.backend_kind, absolute) {
            (BackendKind::Helper, false) => Command::Seek {
                seconds: (self.feed.snapshot().position + seconds).max(0.0),
                absolute: true,
            },
            _ => Command::Seek { seconds, absolute },
        };
        self.send(&command).await.map(|_| ())
    }

    /// Ask the backend for fresh state now.
    pub async fn refresh_status(&mut self) -> Result<(), BridgeError> {
        match self.backend_kind {
            BackendKind::Helper => self.send(&Command::Status).await.map(|_| ()),
            BackendKind::Player => {
                for (_, property) in OBSERVED_PROPERTIES {
                    let reply = match self.send(&Command::GetProperty((*property).to_string())).await {
                        Ok(reply) => reply,
                        Err(BridgeError::CommandFailed(_)) => continue,
                        Err(e) => return Err(e),
                    };
                    if let Some(delta) = property_delta(property, reply.data.as_ref()) {
                        self.apply_status(&delta).await;
                    }
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Viewport
    // ========================================================================

    /// Embed the helper's video into a native window.
    ///
    /// The player takes its embedding id at launch, so for the player this
    /// applies from the next backend start.
    pub async fn attach_window(&mut self, window: u64) -> Result<(), BridgeError> {
        self.window = Some(window);
        match (self.backend_kind, self.handle.is_some()) {
            (BackendKind::Helper, true) => self.send(&Command::Window(window)).await.map(|_| ()),
            (BackendKind::Player, true) => {
                log::info!("[Playback] Window {window} applies from the next player start");
                Ok(())
            }
            (_, false) => Ok(()),
        }
    }

    /// Place the video surface. Identical consecutive rects are sent once.
    pub async fn set_viewport(&mut self, rect: ViewportRect) -> Result<(), BridgeError> {
        self.desired_viewport = Some(rect);
        if self.handle.is_none() || self.backend_kind == BackendKind::Player {
            return Ok(());
        }
        self.apply_viewport(rect).await
    }

    /// Translate layout geometry and place the video surface.
    pub async fn update_layout(&mut self, geometry: &LayoutGeometry) -> Result<(), BridgeError> {
        self.set_viewport(translate(geometry)).await
    }

    async fn apply_viewport(&mut self, rect: ViewportRect) -> Result<(), BridgeError> {
        let Some(rect) = self.viewport.offer(rect) else {
            return Ok(());
        };
        let command = Command::Rect {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        };
        if let Err(e) = self.send(&command).await {
            self.viewport.invalidate();
            return Err(e);
        }
        Ok(())
    }

    // ========================================================================
    // Event pump
    // ========================================================================

    /// Wait for the next backend event or status deadline and handle it.
    pub async fn dispatch_next(&mut self) {
        let deadline = self.throttle.deadline();
        tokio::select! {
            event = self.events_rx.recv() => {
                if let Some(event) = event {
                    self.handle_event(event).await;
                }
            }
            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                self.flush_status(Instant::now());
            }
        }
    }

    /// Handle every queued event without waiting. Returns how many ran.
    pub async fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        self.flush_status(Instant::now());
        handled
    }

    async fn handle_event(&mut self, event: BridgeEvent) {
        if self.backend_id() != Some(event.backend_id) {
            log::debug!(
                "[Playback] Ignoring event from stale backend #{}: {:?}",
                event.backend_id,
                event.kind
            );
            return;
        }

        match event.kind {
            BackendEvent::Ready => {
                log::info!("[Playback] Backend #{} ready", event.backend_id);
                self.listeners.ready.emit(&());
            }
            BackendEvent::Status(delta) => self.apply_status(&delta).await,
            BackendEvent::Error(message) => {
                self.listeners.error.emit(&BackendFault {
                    message,
                    stderr_tail: Vec::new(),
                    recoverable: true,
                });
            }
            BackendEvent::Warning(message) => self.listeners.warning.emit(&message),
            BackendEvent::Debug(message) => self.listeners.diagnostic.emit(&message),
            BackendEvent::FrameSource { .. } => {}
            BackendEvent::EndOfStream => {
                log::info!("[Playback] End of stream");
                self.phase = PlaybackPhase::Stopped;
                self.feed.set_intent(Intent::Pause);
                self.listeners.warning.emit(&"Playback ended".to_string());
                self.mark_status_changed();
            }
            BackendEvent::FrameReady => {
                if let Some((info, frame)) = self.slot.take_latest() {
                    if let Some(info) = info {
                        self.listeners.video_info.emit(&info);
                    }
                    self.listeners.frame.emit(&frame);
                }
            }
            BackendEvent::Exited(report) => self.backend_exited(report).await,
        }
    }

    async fn backend_exited(&mut self, report: ExitReport) {
        log::warn!("[Playback] Backend {}", report.summary());
        self.release_backend().await;
        self.phase = PlaybackPhase::Idle;
        self.current_url = None;
        self.feed.reset();
        self.mark_status_changed();
        self.listeners.error.emit(&BackendFault {
            message: format!("Playback backend {}", report.summary()),
            stderr_tail: report.stderr_tail,
            recoverable: true,
        });
    }

    async fn apply_status(&mut self, delta: &StatusDelta) {
        let outcome = self.feed.merge(delta);
        if let Some(transition) = outcome.buffering {
            self.buffering_changed(transition).await;
        }
        if outcome.changed {
            self.mark_status_changed();
        }
    }

    async fn buffering_changed(&mut self, transition: BufferingTransition) {
        if !self.phase.has_media() {
            return;
        }
        let resume = self.feed.intent() == Intent::Play;
        match transition {
            BufferingTransition::Entered => {
                log::info!("[Playback] Buffering (resume={resume})");
                self.phase = PlaybackPhase::Buffering { resume };
                if self.feed.snapshot().playing {
                    if let Err(e) = self.send(&Command::Pause).await {
                        log::warn!("[Playback] Failed to hold playback while buffering: {e}");
                    }
                }
            }
            BufferingTransition::Exited => {
                log::info!("[Playback] Buffering finished");
                if resume {
                    self.phase = PlaybackPhase::Playing;
                    if !self.feed.snapshot().playing {
                        if let Err(e) = self.send(&Command::Play).await {
                            log::warn!("[Playback] Failed to resume after buffering: {e}");
                        }
                    }
                } else {
                    self.phase = PlaybackPhase::Paused;
                }
            }
        }
    }

    fn mark_status_changed(&mut self) {
        if self.throttle.offer(Instant::now()) {
            let state = self.feed.snapshot();
            self.listeners.status.emit(&state);
        }
    }

    fn flush_status(&mut self, now: Instant) {
        if self.throttle.poll(now) {
            let state = self.feed.snapshot();
            self.listeners.status.emit(&state);
        }
    }
}
