//! Bridge-wide constants for tvbridge.
//!
//! This module centralizes the timing and sizing constants shared by the
//! bridge components so the protocol contracts live in one place.
//!
//! # Categories
//!
//! - **Timeouts**: Command replies, process teardown, socket connection
//! - **Status**: Backend polling and UI throttling
//! - **Frames**: Wire format limits and queue depths
//! - **Viewport**: Off-screen placement

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Per-request timeout for backend commands.
///
/// Applies independently to every pending request on both command channel
/// variants. A reply arriving after this deadline is dropped.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period between closing the backend's pipes and killing it.
///
/// The helper exits on stdin EOF; the player exits on SIGTERM. Anything
/// still alive after this window gets SIGKILL.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long to keep retrying the player's IPC socket after spawn.
///
/// The player creates its socket asynchronously during startup.
pub const SOCKET_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between IPC socket connection attempts.
pub const SOCKET_CONNECT_RETRY: Duration = Duration::from_millis(100);

// ============================================================================
// Status
// ============================================================================

/// Interval at which the helper backend emits unsolicited status lines.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Minimum wall-clock spacing between status pushes to the UI.
///
/// Updates arriving faster than this are coalesced; the latest merged
/// state is delivered at the end of the window.
pub const STATUS_THROTTLE_INTERVAL: Duration = Duration::from_millis(100);

/// Number of trailing stderr lines retained for exit reports.
pub const STDERR_TAIL_LINES: usize = 6;

/// Longest line accepted from a backend on either text protocol.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

// ============================================================================
// Frames
// ============================================================================

/// Frame marker: the ASCII bytes `LTBS` read as a little-endian u32.
pub const FRAME_MAGIC: u32 = 0x5342_544C;

/// Only supported frame header version.
pub const FRAME_VERSION: u16 = 1;

/// Size of the fixed frame header on the wire.
pub const FRAME_HEADER_SIZE: usize = 40;

/// Pixel format code for packed 8-bit RGBA.
pub const FRAME_FORMAT_RGBA: u32 = 1;

/// Largest payload a header may announce before it is treated as noise.
///
/// 256 MB comfortably covers an 8K RGBA frame (~133 MB).
pub const MAX_FRAME_PAYLOAD: u32 = 256 * 1024 * 1024;

/// Depth of the producer-side queue between frame production and the
/// socket writer thread.
pub const FRAME_QUEUE_DEPTH: usize = 3;

/// How long a dropped frame writer may spend flushing queued frames before
/// its socket is shut down under it.
pub const FRAME_WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Read buffer size for the frame socket.
pub const FRAME_READ_CHUNK: usize = 256 * 1024;

// ============================================================================
// Viewport
// ============================================================================

/// Coordinate used to park a hidden video surface outside any display.
pub const HIDDEN_VIEWPORT_OFFSET: i32 = -32_000;
