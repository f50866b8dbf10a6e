use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::performance_metrics::PerformanceMetrics;
use crate::shared::detection::StableDetection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode frame {index}: {reason}")]
    Encode { index: usize, reason: String },
}

/// Figures drawn next to the detections for one displayed frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayMetrics {
    pub fps: f64,
    pub avg_detection_time_ms: f64,
    pub detection_count: usize,
    pub dropped_frames: u64,
    pub paused: bool,
    pub show_performance: bool,
    pub recording: bool,
}

impl OverlayMetrics {
    pub fn from_snapshot(
        metrics: &PerformanceMetrics,
        detection_count: usize,
        paused: bool,
        show_performance: bool,
        recording: bool,
    ) -> Self {
        Self {
            fps: metrics.fps,
            avg_detection_time_ms: metrics.avg_detection_time * 1000.0,
            detection_count,
            dropped_frames: metrics.dropped_frames,
            paused,
            show_performance,
            recording,
        }
    }

    /// Single-line text form used by log and overlay output.
    pub fn status_line(&self) -> String {
        let mut line = format!(
            "FPS {:.1} | detect {:.1}ms | objects {} | dropped {}",
            self.fps, self.avg_detection_time_ms, self.detection_count, self.dropped_frames
        );
        if self.paused {
            line.push_str(" | PAUSED");
        }
        if self.recording {
            line.push_str(" | REC");
        }
        line
    }
}

/// Receives every displayed frame with its stable detections.
///
/// Called once per frame from the consumer thread. The pipeline logs and
/// ignores errors, so a failing sink never stops detection.
pub trait RenderSink: Send {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[StableDetection],
        metrics: &OverlayMetrics,
    ) -> Result<(), RenderError>;

    /// Flushes and releases resources at shutdown.
    fn close(&mut self) {}
}
