use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::shared::constants::{DEFAULT_DETECTION_TIME_WINDOW, DEFAULT_FPS_WINDOW};
use crate::shared::moving_average::MovingAverage;

/// How often the instantaneous frame rate is sampled.
const FPS_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsConfig {
    /// FPS samples averaged.
    pub fps_window: usize,
    /// Detection-time samples averaged.
    pub detection_time_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            fps_window: DEFAULT_FPS_WINDOW,
            detection_time_window: DEFAULT_DETECTION_TIME_WINDOW,
        }
    }
}

/// Value copy of the running performance figures.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub fps: f64,
    /// Seconds.
    pub avg_detection_time: f64,
    pub total_detections: u64,
    pub frame_count: u64,
    pub dropped_frames: u64,
    pub memory_usage_mb: f64,
    pub cpu_usage_percent: f64,
}

/// Mutable accumulator behind [`PerformanceMetrics`]. Every history it keeps
/// is bounded.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    config: MetricsConfig,
    current: PerformanceMetrics,
    fps_average: MovingAverage,
    detection_time_average: MovingAverage,
    recent_frames: VecDeque<Instant>,
    last_fps_sample: Instant,
}

impl MetricsAccumulator {
    pub(crate) fn new(config: MetricsConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    fn starting_at(config: MetricsConfig, now: Instant) -> Self {
        Self {
            config,
            current: PerformanceMetrics::default(),
            fps_average: MovingAverage::new(config.fps_window),
            detection_time_average: MovingAverage::new(config.detection_time_window),
            recent_frames: VecDeque::new(),
            last_fps_sample: now,
        }
    }

    pub(crate) fn snapshot(&self) -> PerformanceMetrics {
        self.current.clone()
    }

    /// Counts a displayed frame. Only frames from the last second are kept;
    /// once per second their count becomes a new FPS sample.
    pub(crate) fn record_frame(&mut self, now: Instant) {
        self.recent_frames.push_back(now);
        self.current.frame_count += 1;
        while self
            .recent_frames
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= FPS_SAMPLE_PERIOD)
        {
            self.recent_frames.pop_front();
        }

        if now.saturating_duration_since(self.last_fps_sample) >= FPS_SAMPLE_PERIOD {
            self.current.fps = self.fps_average.push(self.recent_frames.len() as f64);
            self.last_fps_sample = now;
        }
    }

    pub(crate) fn record_detection_time(&mut self, elapsed: Duration) {
        self.current.avg_detection_time = self.detection_time_average.push(elapsed.as_secs_f64());
    }

    pub(crate) fn add_detections(&mut self, count: u64) {
        self.current.total_detections += count;
    }

    pub(crate) fn add_dropped_frames(&mut self, count: u64) {
        self.current.dropped_frames += count;
    }

    pub(crate) fn set_system_metrics(&mut self, memory_usage_mb: f64, cpu_usage_percent: f64) {
        self.current.memory_usage_mb = memory_usage_mb;
        self.current.cpu_usage_percent = cpu_usage_percent;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    #[cfg(test)]
    pub(crate) fn history_lengths(&self) -> (usize, usize, usize) {
        (
            self.fps_average.len(),
            self.detection_time_average.len(),
            self.recent_frames.len(),
        )
    }
}
