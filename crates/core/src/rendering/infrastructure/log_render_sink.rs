use crate::rendering::domain::render_sink::{OverlayMetrics, RenderError, RenderSink};
use crate::shared::detection::StableDetection;
use crate::shared::frame::Frame;

/// Headless sink: logs one line every `every_frames` rendered frames.
///
/// Detections go to `debug`; the status line goes to `info` when the
/// performance overlay is enabled.
pub struct LogRenderSink {
    every_frames: u64,
    rendered: u64,
}

impl LogRenderSink {
    pub fn new(every_frames: u64) -> Self {
        Self {
            every_frames: every_frames.max(1),
            rendered: 0,
        }
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl Default for LogRenderSink {
    fn default() -> Self {
        Self::new(30)
    }
}

impl RenderSink for LogRenderSink {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[StableDetection],
        metrics: &OverlayMetrics,
    ) -> Result<(), RenderError> {
        self.rendered += 1;
        if (self.rendered - 1) % self.every_frames != 0 {
            return Ok(());
        }

        if metrics.show_performance {
            log::info!("frame {}: {}", frame.index(), metrics.status_line());
        }
        for det in detections {
            log::debug!(
                "  {} {:.2} [{:.0},{:.0},{:.0},{:.0}] seen {}",
                det.label,
                det.confidence,
                det.bbox.x1,
                det.bbox.y1,
                det.bbox.x2,
                det.bbox.y2,
                det.stability_count
            );
        }
        Ok(())
    }

    fn close(&mut self) {
        log::info!("Rendered {} frames", self.rendered);
    }
}
