//! Static configuration bundle, loaded once at startup and projected into
//! the per-component config values each constructor takes.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::capture_loop::CaptureConfig;
use crate::capture::domain::frame_source::SourceConfig;
use crate::detection::domain::stabilizer::StabilizerConfig;
use crate::detection::infrastructure::onnx_yolo_detector::YoloConfig;
use crate::pipeline::live_detection_use_case::LiveDetectionConfig;
use crate::pipeline::performance_metrics::MetricsConfig;
use crate::shared::constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} = {value} is out of range (expected {expected})")]
    Invalid {
        field: &'static str,
        value: String,
        expected: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CameraSettings {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub buffer_size: usize,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            index: 0,
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            fps: DEFAULT_CAMERA_FPS,
            buffer_size: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ModelSettings {
    pub path: Option<PathBuf>,
    /// Where to fetch the model from when it is not cached locally.
    pub url: Option<String>,
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub max_detections: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Settings {
    pub frame_buffer_size: usize,
    pub skip_frames: usize,
    pub window_size: usize,
    pub position_tolerance: f64,
    pub confidence_smoothing: f64,
    pub min_stable_frames: usize,
    pub fps_window: usize,
    pub detection_time_window: usize,
    pub capture_retry_ms: u64,
    pub stop_timeout_ms: u64,
    pub pop_timeout_ms: u64,
    pub camera: CameraSettings,
    pub model: ModelSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_buffer_size: DEFAULT_FRAME_BUFFER_SIZE,
            skip_frames: 0,
            window_size: DEFAULT_WINDOW_SIZE,
            position_tolerance: DEFAULT_POSITION_TOLERANCE,
            confidence_smoothing: DEFAULT_CONFIDENCE_SMOOTHING,
            min_stable_frames: DEFAULT_MIN_STABLE_FRAMES,
            fps_window: DEFAULT_FPS_WINDOW,
            detection_time_window: DEFAULT_DETECTION_TIME_WINDOW,
            capture_retry_ms: CAPTURE_RETRY_BACKOFF.as_millis() as u64,
            stop_timeout_ms: CAPTURE_STOP_TIMEOUT.as_millis() as u64,
            pop_timeout_ms: FRAME_POP_TIMEOUT.as_millis() as u64,
            camera: CameraSettings::default(),
            model: ModelSettings::default(),
        }
    }
}

impl Settings {
    /// `<config dir>/LiveDetect/settings.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// Reads, parses and validates a JSON settings file. Unknown keys are an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&json)?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check("frameBufferSize", self.frame_buffer_size, 1..=10)?;
        check("skipFrames", self.skip_frames, 0..=10)?;
        check("windowSize", self.window_size, 1..=10)?;
        check("positionTolerance", self.position_tolerance, 5.0..=100.0)?;
        check("confidenceSmoothing", self.confidence_smoothing, 0.0..=1.0)?;
        check("minStableFrames", self.min_stable_frames, 1..=10)?;
        check("fpsWindow", self.fps_window, 1..=usize::MAX)?;
        check("detectionTimeWindow", self.detection_time_window, 1..=usize::MAX)?;
        check("camera.width", self.camera.width, 1..=u32::MAX)?;
        check("camera.height", self.camera.height, 1..=u32::MAX)?;
        check("camera.fps", self.camera.fps, 1..=120)?;
        check("camera.bufferSize", self.camera.buffer_size, 1..=10)?;
        check("model.confidenceThreshold", self.model.confidence_threshold, 0.0..=1.0)?;
        check("model.iouThreshold", self.model.iou_threshold, 0.0..=1.0)?;
        check("model.maxDetections", self.model.max_detections, 1..=1000)?;
        check("captureRetryMs", self.capture_retry_ms, 1..=1000)?;
        check("popTimeoutMs", self.pop_timeout_ms, 1..=5000)?;
        check("stopTimeoutMs", self.stop_timeout_ms, 1..=60000)?;
        Ok(())
    }

    pub fn stabilizer_config(&self) -> StabilizerConfig {
        StabilizerConfig {
            window_size: self.window_size,
            position_tolerance: self.position_tolerance,
            confidence_smoothing: self.confidence_smoothing,
            min_stable_frames: self.min_stable_frames,
        }
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            fps_window: self.fps_window,
            detection_time_window: self.detection_time_window,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            buffer_size: self.frame_buffer_size,
            retry_backoff: Duration::from_millis(self.capture_retry_ms),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            width: self.camera.width,
            height: self.camera.height,
            fps: self.camera.fps,
            buffer_size: self.camera.buffer_size,
        }
    }

    pub fn live_config(&self) -> LiveDetectionConfig {
        LiveDetectionConfig {
            skip_frames: self.skip_frames,
            pop_timeout: Duration::from_millis(self.pop_timeout_ms),
            max_frames: None,
        }
    }

    pub fn yolo_config(&self) -> YoloConfig {
        YoloConfig {
            confidence_threshold: self.model.confidence_threshold,
            iou_threshold: self.model.iou_threshold,
            max_detections: self.model.max_detections,
        }
    }
}

fn check<T>(field: &'static str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected: format!("{}..={}", range.start(), range.end()),
        })
    }
}
