use std::path::PathBuf;

use thiserror::Error;

use crate::shared::detection::RawDetection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("invalid input frame: {0}")]
    InvalidFrame(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Domain interface for per-frame object detection.
///
/// Must accept frames of any size, repeatedly. Failures are reported as
/// errors, never panics; an empty list means nothing was found.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError>;
}
