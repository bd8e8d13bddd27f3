//! tvbridge - media backend bridge for a TV client.
//!
//! Drives an out-of-process media backend (an external player or a helper
//! wrapping a streaming framework), turns user intent into commands on its
//! IPC channel, folds its reports into one playback state, and pulls decoded
//! frames back over a private socket.
//!
//! # Architecture
//!
//! Leaf-first:
//!
//! - **Codec** - frame header and both line protocols, no I/O
//! - **Supervisor** - spawns, watches, and tears down backend processes
//! - **Channel** - correlated request/reply over text lines or JSON
//! - **Status** - merged playback state and the push throttle
//! - **Transport** - frame socket server, decoder, latest-wins slot
//! - **Viewport** - layout geometry to native pixel rects
//! - **Playback** - the [`Session`] façade the UI talks to
//!
//! # Modules
//!
//! - [`playback`] - session façade, listeners, URL fallback
//! - [`helper`] - synthetic helper backend behind `tvbridge-testsrc`
//! - [`config`] - configuration loading/saving

pub mod channel;
pub mod codec;
pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod events;
pub mod helper;
pub mod playback;
pub mod status;
pub mod supervisor;
pub mod transport;
pub mod viewport;

// Re-export commonly used types
pub use config::{BackendKind, BridgeConfig};
pub use error::BridgeError;
pub use playback::{BackendFault, ContentKind, PlaybackPhase, Session};
pub use status::PlaybackState;
pub use viewport::{LayoutGeometry, ViewportRect};
