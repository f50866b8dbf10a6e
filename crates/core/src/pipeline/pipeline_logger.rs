use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting logger for live pipeline events.
///
/// Keeps the consumer loop independent of where its diagnostics go
/// (stdout, log crate, nowhere).
pub trait PipelineLogger: Send {
    /// Report that `frames` frames have been consumed so far.
    fn progress(&mut self, frames: u64);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (queue depth, detection count).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used by tests.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count/total/max for one series. A live run has no end, so
/// individual samples are not kept.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SeriesStats {
    pub count: u64,
    pub total: f64,
    pub max: f64,
}

impl SeriesStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 { value } else { self.max.max(value) };
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// CLI-oriented logger that aggregates per-stage timings and metrics and
/// prints a summary when the run ends.
///
/// Progress lines are throttled to one every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: u64,
    timings: BTreeMap<String, SeriesStats>,
    metrics: BTreeMap<String, SeriesStats>,
    start_time: Instant,
    frames: u64,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: u64) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames;
        let mut lines = vec![format!(
            "Run summary ({frames} frames, {:.1}s):",
            elapsed_ms / 1000.0
        )];

        for (stage, stats) in &self.timings {
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {:6.1}ms  n={}",
                stats.mean(),
                stats.max,
                stats.count
            ));
        }
        for (name, stats) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}", stats.mean()));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<SeriesStats> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<SeriesStats> {
        self.metrics.get(name).copied()
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, frames: u64) {
        self.frames = frames;
        if frames % self.throttle_frames == 0 {
            let secs = self.start_time.elapsed().as_secs_f64();
            log::info!("Processed {frames} frames in {secs:.1}s");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings.entry(stage.to_string()).or_default().push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    // --- NullPipelineLogger ---

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullPipelineLogger;
        logger.progress(1);
        logger.timing("detect", 5.0);
        logger.metric("queue_depth", 3.0);
        logger.info("hello");
        logger.summary();
    }

    // --- StdoutPipelineLogger ---

    #[test]
    fn test_timing_aggregates() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.count, 2);
        assert_relative_eq!(detect.mean(), 25.0);
        assert_relative_eq!(detect.max, 30.0);
        assert_eq!(logger.timings_for("render").unwrap().count, 1);
        assert!(logger.timings_for("stabilize").is_none());
    }

    #[test]
    fn test_metric_mean() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("queue_depth", 3.0);
        logger.metric("queue_depth", 4.0);
        assert_relative_eq!(logger.metrics_for("queue_depth").unwrap().mean(), 3.5);
    }

    #[test]
    fn test_max_tracks_negative_first_sample() {
        let mut stats = SeriesStats::default();
        stats.push(-2.0);
        stats.push(-5.0);
        assert_relative_eq!(stats.max, -2.0);
    }

    #[test]
    fn test_summary_contents() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(10);
        logger.timing("detect", 20.0);
        logger.metric("detections", 2.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Run summary (10 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("detections: avg 2.0"));
        assert!(summary.contains("fps"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutPipelineLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_zero_throttle_clamped() {
        let mut logger = StdoutPipelineLogger::new(0);
        assert_eq!(logger.throttle_frames, 1);
        logger.progress(7);
        assert_eq!(logger.frames, 7);
    }
}
