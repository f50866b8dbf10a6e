use crate::rendering::domain::render_sink::{OverlayMetrics, RenderError, RenderSink};
use crate::shared::detection::StableDetection;
use crate::shared::frame::Frame;

/// Fans each frame out to several sinks.
///
/// A failing sink is logged and skipped; the others still render. The first
/// error is returned after every sink has run.
pub struct CompositeRenderSink {
    sinks: Vec<Box<dyn RenderSink>>,
}

impl CompositeRenderSink {
    pub fn new(sinks: Vec<Box<dyn RenderSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn RenderSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RenderSink for CompositeRenderSink {
    fn render(
        &mut self,
        frame: &Frame,
        detections: &[StableDetection],
        metrics: &OverlayMetrics,
    ) -> Result<(), RenderError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.render(frame, detections, metrics) {
                log::warn!("Render sink failed on frame {}: {e}", frame.index());
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn close(&mut self) {
        for sink in &mut self.sinks {
            sink.close();
        }
    }
}
