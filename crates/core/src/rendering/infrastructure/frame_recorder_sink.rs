use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::rendering::domain::render_sink::{OverlayMetrics, RenderError, RenderSink};
use crate::shared::detection::StableDetection;
use crate::shared::frame::Frame;

use super::box_annotator::BoxAnnotator;

/// Saves annotated frames as PNG files while recording is switched on.
///
/// At most one frame is written per `min_interval`; files are named after
/// the frame index.
pub struct FrameRecorderSink {
    dir: PathBuf,
    min_interval: Duration,
    annotator: BoxAnnotator,
    last_saved: Option<Instant>,
    saved: usize,
}

impl FrameRecorderSink {
    pub fn new(dir: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            min_interval,
            annotator: BoxAnnotator::default(),
            last_saved: None,
            saved: 0,
        }
    }

    pub fn saved(&self) -> usize {
        self.saved
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn due(&self, now: Instant) -> bool {
        self.last_saved
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_interval)
    }

    fn write(&self, frame: &Frame) -> Result<PathBuf, RenderError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| RenderError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(format!("frame_{:06}.png", frame.index()));
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or_else(|| RenderError::Encode {
                index: frame.index(),
                reason: "frame buffer does not match its dimensions".to_string(),
            })?;
        img.save(&path).map_err(|e| RenderError::Encode {
            index: frame.index(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }
}

impl RenderSink for FrameRecorderSink {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[StableDetection],
        metrics: &OverlayMetrics,
    ) -> Result<(), RenderError> {
        let now = Instant::now();
        if !metrics.recording || !self.due(now) {
            return Ok(());
        }
        let annotated = self.annotator.annotate(frame, detections, metrics.paused);
        let path = self.write(&annotated)?;
        self.last_saved = Some(now);
        self.saved += 1;
        log::debug!("Saved {}", path.display());
        Ok(())
    }

    fn close(&mut self) {
        if self.saved > 0 {
            log::info!("Saved {} frames to {}", self.saved, self.dir.display());
        }
    }
}
