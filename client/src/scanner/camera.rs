//! Camera and video stream abstractions.
//!
//! The scanner never talks to hardware directly. It asks a [`Camera`] for a
//! [`VideoStream`] and pulls [`Frame`]s from it. The stream owns the device
//! handle; [`VideoStream::stop`] releases it.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    /// Rear camera, pointed at the visitor's code. Always preferred.
    #[default]
    Environment,
    /// Front camera.
    User,
}

/// Why a camera could not be opened.
#[derive(Debug, Error)]
pub enum CameraError {
    /// The user or the platform refused access.
    #[error("camera permission denied")]
    PermissionDenied,
    /// No capture device matches the request.
    #[error("no camera available: {0}")]
    NoDevice(String),
    /// The device exists but failed while opening.
    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An 8-bit greyscale bitmap, row-major, one byte per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    luma: Bytes,
}

impl Frame {
    /// Wraps a luma buffer. Returns `None` if the buffer size does not match
    /// the dimensions.
    pub fn from_luma(width: u32, height: u32, luma: impl Into<Bytes>) -> Option<Self> {
        let luma = luma.into();
        if luma.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            luma,
        })
    }

    pub fn from_gray_image(img: image::GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            luma: Bytes::from(img.into_raw()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma(&self) -> &[u8] {
        &self.luma
    }
}

/// A live feed of frames.
pub trait VideoStream: Send {
    /// The current frame. `None` means the stream has ended and will not
    /// produce more frames.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Releases the underlying device. Must be idempotent.
    fn stop(&mut self);
}

/// A source of video streams.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError>;
}

// ---------------------------------------------------------------------------
// Directory-backed camera
// ---------------------------------------------------------------------------

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Replays still images from a directory, one file per sample, in file-name
/// order. Stands in for a capture device on machines without one.
#[derive(Debug, Clone)]
pub struct FrameDirCamera {
    dir: PathBuf,
}

impl FrameDirCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn frame_paths(&self) -> Result<VecDeque<PathBuf>, CameraError> {
        if !self.dir.is_dir() {
            return Err(CameraError::NoDevice(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(CameraError::NoDevice(format!(
                "no image frames in {}",
                self.dir.display()
            )));
        }
        Ok(paths.into())
    }
}

#[async_trait]
impl Camera for FrameDirCamera {
    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
        let pending = self.frame_paths()?;
        tracing::debug!(
            dir = %self.dir.display(),
            frames = pending.len(),
            ?facing,
            "frame directory opened"
        );
        Ok(Box::new(FrameDirStream {
            pending,
            stopped: false,
        }))
    }
}

struct FrameDirStream {
    pending: VecDeque<PathBuf>,
    stopped: bool,
}

impl VideoStream for FrameDirStream {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.stopped {
            return None;
        }
        while let Some(path) = self.pending.pop_front() {
            match image::open(&path) {
                Ok(img) => return Some(Frame::from_gray_image(img.to_luma8())),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable frame");
                }
            }
        }
        None
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.pending.clear();
    }
}
