//! Video frame transport from the helper to the UI.
//!
//! - [`server`] - UI-side socket listener and read loop
//! - [`decoder`] - resynchronizing byte-stream decoder
//! - [`slot`] - latest-wins handoff to the render path
//! - [`writer`] - helper-side bounded queue and writer thread
//!
//! Backpressure exists on both ends: the helper drops its oldest queued
//! frame when the writer falls behind, and the UI keeps only the newest
//! decoded frame.

pub mod decoder;
pub mod server;
pub mod slot;
pub mod writer;

pub use decoder::{DecodedFrame, DecoderStats, FrameDecoder};
pub use server::FrameServer;
pub use slot::FrameSlot;
pub use writer::FrameWriter;
