//! # Scanner
//!
//! Turns a live camera feed into [`ScanPayload`](crate::intent::ScanPayload)
//! values.
//!
//! ```text
//!   Camera ──open──► VideoStream ──frame every 100ms──► FrameDecoder
//!                                                          │
//!                                         non-empty text   ▼
//!                                  PayloadStream ◄── decode loop ──► cooldown
//! ```
//!
//! - [`camera`] — device abstraction and a directory-backed stand-in.
//! - [`decoder`] — QR decoding over greyscale frames.
//! - [`session`] — the activate/deactivate lifecycle and the decode loop.

pub mod camera;
pub mod decoder;
pub mod session;

use thiserror::Error;

pub use camera::{Camera, CameraError, Facing, Frame, FrameDirCamera, VideoStream};
pub use decoder::{FrameDecoder, QrDecoder};
pub use session::{PayloadStream, ScannerConfig, ScannerSession, ScannerState};

/// Errors surfaced by [`ScannerSession::activate`].
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied or no device. Terminal for this activation.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(#[source] CameraError),

    /// The session already has a running decode loop.
    #[error("scanner is already active")]
    AlreadyActive,
}
