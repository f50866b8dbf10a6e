use thiserror::Error;

use crate::shared::constants::{DEFAULT_CAMERA_FPS, DEFAULT_CAMERA_HEIGHT, DEFAULT_CAMERA_WIDTH};
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no capture device available")]
    NoDevice,
    #[error("failed to open capture source {source_name}: {reason}")]
    Open { source_name: String, reason: String },
    #[error("capture source is not open")]
    NotOpen,
    #[error("capture source was lost when its thread failed to stop")]
    SourceLost,
    #[error("failed to spawn capture thread")]
    Spawn(#[source] std::io::Error),
}

/// Requested capture format. Devices may silently pick the nearest mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Device-side buffer depth; 1 keeps device latency minimal.
    pub buffer_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            fps: DEFAULT_CAMERA_FPS,
            buffer_size: 1,
        }
    }
}

/// A live producer of frames, e.g. a camera or a network stream.
///
/// Owned exclusively by the capture thread once capture starts.
pub trait FrameSource: Send {
    /// Applies the capture format. Called before the first `read`.
    fn configure(&mut self, config: &SourceConfig) -> Result<(), CaptureError>;

    /// Blocks until the next frame is available. `None` is a transient
    /// failure; callers retry rather than give up.
    fn read(&mut self) -> Option<Frame>;

    /// Releases the underlying device. Further reads return `None`.
    fn release(&mut self);

    /// Human-readable name for logs.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}
