use crate::detection::domain::detection_window::DetectionWindow;
use crate::shared::constants::{
    DEFAULT_CONFIDENCE_SMOOTHING, DEFAULT_MIN_STABLE_FRAMES, DEFAULT_POSITION_TOLERANCE,
    DEFAULT_WINDOW_SIZE,
};
use crate::shared::detection::{RawDetection, StableDetection};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilizerConfig {
    /// Frames kept in the window, the current one included.
    pub window_size: usize,
    /// Max per-axis distance (px) between top-left corners of a match.
    pub position_tolerance: f64,
    /// Weight of the current confidence against the window average.
    pub confidence_smoothing: f64,
    pub min_stable_frames: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            position_tolerance: DEFAULT_POSITION_TOLERANCE,
            confidence_smoothing: DEFAULT_CONFIDENCE_SMOOTHING,
            min_stable_frames: DEFAULT_MIN_STABLE_FRAMES,
        }
    }
}

/// Domain interface for turning raw per-frame detections into stable ones.
pub trait DetectionStabilizer: Send {
    fn stabilize(&mut self, current: &[RawDetection]) -> Vec<StableDetection>;

    /// Forgets all history.
    fn reset(&mut self);
}

/// Sliding-window stabilizer that suppresses one-frame flicker.
///
/// Each current detection is matched against older window entries, oldest
/// first. A match shares the label and has its top-left corner within the
/// tolerance of the running box; the running box then moves to the midpoint
/// of itself and the match. This is progressive averaging, so later (newer)
/// matches weigh more than a plain mean would give them.
///
/// Detections matched in fewer than `min_stable_frames` frames are hidden
/// but still enter the window. Until the window holds two frames, input is
/// passed through unchanged.
pub struct WindowStabilizer {
    config: StabilizerConfig,
    window: DetectionWindow,
}

impl WindowStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            window: DetectionWindow::new(config.window_size),
            config,
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn buffered_frames(&self) -> usize {
        self.window.len()
    }

    fn stabilize_one(&self, detection: &RawDetection) -> Option<StableDetection> {
        let mut stability_count = 1;
        let mut confidence_sum = detection.confidence;
        let mut running = detection.bbox;

        for entry in self.window.history() {
            let matched = entry.iter().find(|prev| {
                prev.label == detection.label
                    && running.top_left_within(&prev.bbox, self.config.position_tolerance)
            });
            if let Some(prev) = matched {
                stability_count += 1;
                confidence_sum += prev.confidence;
                running = running.midpoint(&prev.bbox);
            }
        }

        if stability_count < self.config.min_stable_frames {
            return None;
        }

        let smoothing = self.config.confidence_smoothing;
        let average = confidence_sum / stability_count as f64;
        Some(StableDetection {
            bbox: running,
            label: detection.label.clone(),
            confidence: smoothing * detection.confidence + (1.0 - smoothing) * average,
            stability_count,
        })
    }
}

impl Default for WindowStabilizer {
    fn default() -> Self {
        Self::new(StabilizerConfig::default())
    }
}

impl DetectionStabilizer for WindowStabilizer {
    fn stabilize(&mut self, current: &[RawDetection]) -> Vec<StableDetection> {
        // Pushing first leaves exactly the older frames in `history()`.
        self.window.push(current.to_vec());

        if self.window.len() < 2 {
            return current.iter().map(StableDetection::unsmoothed).collect();
        }

        current
            .iter()
            .filter_map(|detection| self.stabilize_one(detection))
            .collect()
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;
    use crate::shared::detection::BoundingBox;

    fn person(x: f64, y: f64, confidence: f64) -> RawDetection {
        RawDetection::new(x, y, x + 40.0, y + 40.0, "person", confidence)
    }

    fn stabilizer(window_size: usize, min_stable_frames: usize) -> WindowStabilizer {
        WindowStabilizer::new(StabilizerConfig {
            window_size,
            min_stable_frames,
            ..StabilizerConfig::default()
        })
    }

    // --- pass-through ---

    #[test]
    fn test_first_frame_passes_through_unmodified() {
        let mut stab = WindowStabilizer::default();
        let out = stab.stabilize(&[person(10.0, 10.0, 0.9)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, BoundingBox::new(10.0, 10.0, 50.0, 50.0));
        assert_relative_eq!(out[0].confidence, 0.9);
        assert_eq!(out[0].stability_count, 1);
    }

    #[test]
    fn test_empty_input_is_valid() {
        let mut stab = WindowStabilizer::default();
        assert!(stab.stabilize(&[]).is_empty());
        assert!(stab.stabilize(&[]).is_empty());
        assert_eq!(stab.buffered_frames(), 2);
    }

    #[test]
    fn test_window_of_one_never_suppresses() {
        let mut stab = stabilizer(1, 2);
        for _ in 0..3 {
            let out = stab.stabilize(&[person(10.0, 10.0, 0.9)]);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].stability_count, 1);
        }
    }

    // --- suppression ---

    #[test]
    fn test_person_scenario_across_three_frames() {
        let mut stab = stabilizer(3, 2);
        let seen = person(10.0, 10.0, 0.9);

        stab.stabilize(&[seen.clone()]);
        let frame2 = stab.stabilize(&[seen.clone()]);
        assert_eq!(frame2.len(), 1);
        assert_eq!(frame2[0].label, "person");
        assert_eq!(frame2[0].stability_count, 2);

        let frame3 = stab.stabilize(&[]);
        assert!(frame3.is_empty());
    }

    #[test]
    fn test_history_ages_out_beyond_window() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(10.0, 10.0, 0.9)]);
        stab.stabilize(&[]);
        stab.stabilize(&[]);
        // Frame 1 has left the window, so this is a one-frame sighting again.
        assert!(stab.stabilize(&[person(10.0, 10.0, 0.9)]).is_empty());
    }

    #[test]
    fn test_single_sighting_never_emitted_once_history_exists() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[]);
        let out = stab.stabilize(&[person(100.0, 100.0, 0.95)]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_label_must_match() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[RawDetection::new(10.0, 10.0, 50.0, 50.0, "dog", 0.9)]);
        assert!(stab.stabilize(&[person(10.0, 10.0, 0.9)]).is_empty());
    }

    #[rstest]
    #[case(29.0, true)]
    #[case(30.0, false)]
    #[case(45.0, false)]
    fn test_position_tolerance(#[case] shift: f64, #[case] emitted: bool) {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(100.0, 100.0, 0.9)]);
        let out = stab.stabilize(&[person(100.0 + shift, 100.0, 0.9)]);
        assert_eq!(!out.is_empty(), emitted);
    }

    #[test]
    fn test_suppressed_detections_still_enter_window() {
        let mut stab = stabilizer(3, 3);
        stab.stabilize(&[]);
        assert!(stab.stabilize(&[person(10.0, 10.0, 0.9)]).is_empty());
        assert!(stab.stabilize(&[person(10.0, 10.0, 0.9)]).is_empty());
        let out = stab.stabilize(&[person(10.0, 10.0, 0.9)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stability_count, 3);
    }

    // --- smoothing ---

    #[test]
    fn test_confidence_blends_current_with_window_average() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(10.0, 10.0, 0.5)]);
        let out = stab.stabilize(&[person(10.0, 10.0, 0.9)]);
        // 0.8 * 0.9 + 0.2 * ((0.9 + 0.5) / 2)
        assert_relative_eq!(out[0].confidence, 0.86, epsilon = 1e-12);
    }

    #[test]
    fn test_box_is_progressive_midpoint_oldest_first() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(0.0, 0.0, 0.9)]);
        stab.stabilize(&[person(8.0, 0.0, 0.9)]);
        let out = stab.stabilize(&[person(16.0, 0.0, 0.9)]);

        // running = mid(16, 0) = 8, then mid(8, 8) = 8; a plain mean would also
        // be 8 here, so check the asymmetric case below too.
        assert_relative_eq!(out[0].bbox.x1, 8.0);
        assert_eq!(out[0].stability_count, 3);
    }

    #[test]
    fn test_progressive_midpoint_differs_from_mean() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(0.0, 0.0, 0.9)]);
        stab.stabilize(&[person(20.0, 0.0, 0.9)]);
        let out = stab.stabilize(&[person(20.0, 0.0, 0.9)]);

        // mid(20, 0) = 10, then mid(10, 20) = 15. The plain mean is 13.33.
        assert_relative_eq!(out[0].bbox.x1, 15.0);
        assert_relative_eq!(out[0].bbox.x2, 55.0);
    }

    #[test]
    fn test_match_compares_against_running_box() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(0.0, 0.0, 0.9)]);
        stab.stabilize(&[person(50.0, 0.0, 0.9)]);
        let out = stab.stabilize(&[person(25.0, 0.0, 0.9)]);

        // 25 matches 0 (running -> 12.5), and 12.5 is 37.5 away from 50: no match.
        assert_eq!(out[0].stability_count, 2);
        assert_relative_eq!(out[0].bbox.x1, 12.5);
    }

    #[test]
    fn test_first_matching_detection_per_entry_is_used() {
        let mut stab = stabilizer(2, 2);
        stab.stabilize(&[person(5.0, 5.0, 0.2), person(0.0, 0.0, 0.8)]);
        let out = stab.stabilize(&[person(0.0, 0.0, 0.6)]);
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].bbox.x1, 2.5);
        assert_relative_eq!(out[0].confidence, 0.8 * 0.6 + 0.2 * 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_each_current_detection_is_independent() {
        let mut stab = stabilizer(3, 2);
        let car = RawDetection::new(300.0, 200.0, 400.0, 260.0, "car", 0.7);
        stab.stabilize(&[person(10.0, 10.0, 0.9), car.clone()]);
        let out = stab.stabilize(&[person(12.0, 11.0, 0.9), car]);
        let labels: Vec<&str> = out.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "car"]);
    }

    // --- reset ---

    #[test]
    fn test_reset_clears_history() {
        let mut stab = stabilizer(3, 2);
        stab.stabilize(&[person(10.0, 10.0, 0.9)]);
        stab.stabilize(&[]);
        stab.reset();
        assert_eq!(stab.buffered_frames(), 0);

        let out = stab.stabilize(&[person(10.0, 10.0, 0.9)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].stability_count, 1);
    }
}
