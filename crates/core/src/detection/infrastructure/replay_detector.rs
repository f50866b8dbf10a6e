use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::shared::detection::RawDetection;
use crate::shared::frame::Frame;

/// Replays pre-recorded detections by frame index.
///
/// Useful for exercising the live pipeline without a model: a recording
/// of a short clip can be looped over any live source by setting a period.
pub struct ReplayDetector {
    recording: Arc<HashMap<usize, Vec<RawDetection>>>,
    period: Option<usize>,
}

impl ReplayDetector {
    pub fn new(recording: Arc<HashMap<usize, Vec<RawDetection>>>) -> Self {
        Self {
            recording,
            period: None,
        }
    }

    /// Loads a JSON object mapping frame indices to detection lists, e.g.
    /// `{"0": [{"x1": 10, "y1": 10, "x2": 50, "y2": 50, "label": "person", "confidence": 0.9}]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, DetectionError> {
        let load_err = |reason: String| DetectionError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let recording: HashMap<usize, Vec<RawDetection>> =
            serde_json::from_str(&json).map_err(|e| load_err(e.to_string()))?;
        log::info!(
            "Loaded {} recorded frames from {}",
            recording.len(),
            path.display()
        );
        Ok(Self::new(Arc::new(recording)))
    }

    /// Frame `i` replays the recording at `i % period`.
    pub fn looping(mut self, period: usize) -> Self {
        self.period = Some(period.max(1));
        self
    }
}

impl ObjectDetector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError> {
        let key = match self.period {
            Some(period) => frame.index() % period,
            None => frame.index(),
        };
        Ok(self.recording.get(&key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize) -> Frame {
        Frame::blank(100, 100, index)
    }

    fn person(x: f64) -> RawDetection {
        RawDetection::new(x, 20.0, x + 50.0, 70.0, "person", 0.9)
    }

    #[test]
    fn test_returns_recorded_detections_for_known_frame() {
        let recording = Arc::new(HashMap::from([(0, vec![person(10.0), person(60.0)])]));
        let mut detector = ReplayDetector::new(recording);
        assert_eq!(detector.detect(&frame(0)).unwrap(), vec![person(10.0), person(60.0)]);
    }

    #[test]
    fn test_unknown_frame_is_empty() {
        let recording = Arc::new(HashMap::from([(0, vec![person(10.0)])]));
        let mut detector = ReplayDetector::new(recording);
        assert!(detector.detect(&frame(7)).unwrap().is_empty());
    }

    #[test]
    fn test_looping_wraps_frame_index() {
        let recording = Arc::new(HashMap::from([(1, vec![person(10.0)])]));
        let mut detector = ReplayDetector::new(recording).looping(3);
        assert!(detector.detect(&frame(3)).unwrap().is_empty());
        assert_eq!(detector.detect(&frame(4)).unwrap().len(), 1);
        assert_eq!(detector.detect(&frame(7)).unwrap().len(), 1);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.json");
        std::fs::write(
            &path,
            r#"{"2": [{"x1": 10, "y1": 20, "x2": 60, "y2": 70, "label": "person", "confidence": 0.9}]}"#,
        )
        .unwrap();

        let mut detector = ReplayDetector::from_json_file(&path).unwrap();
        assert_eq!(detector.detect(&frame(2)).unwrap(), vec![person(10.0)]);
    }

    #[test]
    fn test_from_json_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ReplayDetector::from_json_file(&path),
            Err(DetectionError::ModelLoad { .. })
        ));
    }
}
