use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixel coordinates.
///
/// A valid box has finite coordinates with `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Coordinate-wise average of two boxes.
    pub fn midpoint(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: (self.x1 + other.x1) / 2.0,
            y1: (self.y1 + other.y1) / 2.0,
            x2: (self.x2 + other.x2) / 2.0,
            y2: (self.y2 + other.y2) / 2.0,
        }
    }

    /// True when both top-left coordinates differ by strictly less than `tolerance`.
    pub fn top_left_within(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.x1 - other.x1).abs() < tolerance && (self.y1 - other.y1).abs() < tolerance
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let union = self.width() * self.height() + other.width() * other.height() - inter;
        inter / union
    }

    /// Clamps all coordinates into `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let w = width as f64;
        let h = height as f64;
        BoundingBox {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// One box reported by a detector for a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, label: impl Into<String>, confidence: f64) -> Self {
        Self {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            label: label.into(),
            confidence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bbox.is_valid() && (0.0..=1.0).contains(&self.confidence)
    }

    /// Clamps every box to the frame and discards the ones left degenerate,
    /// non-finite, or carrying an out-of-range confidence.
    pub fn retain_valid(detections: Vec<RawDetection>, width: u32, height: u32) -> Vec<RawDetection> {
        let before = detections.len();
        let kept: Vec<RawDetection> = detections
            .into_iter()
            .filter(|d| d.bbox.is_valid())
            .map(|d| RawDetection {
                bbox: d.bbox.clamp_to(width, height),
                ..d
            })
            .filter(RawDetection::is_valid)
            .collect();
        if kept.len() < before {
            log::trace!("Discarded {} invalid detections", before - kept.len());
        }
        kept
    }
}

/// A detection that survived temporal stabilization.
///
/// Recomputed every frame; position and confidence are smoothed values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StableDetection {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f64,
    /// Number of recent frames (current included) that agreed on this object.
    pub stability_count: usize,
}

impl StableDetection {
    /// Passes a raw detection through untouched, as seen in a single frame.
    pub fn unsmoothed(raw: &RawDetection) -> Self {
        Self {
            bbox: raw.bbox,
            label: raw.label.clone(),
            confidence: raw.confidence,
            stability_count: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(BoundingBox::new(0.0, 0.0, 10.0, 10.0), true)]
    #[case(BoundingBox::new(10.0, 0.0, 10.0, 10.0), false)]
    #[case(BoundingBox::new(0.0, 5.0, 10.0, 1.0), false)]
    #[case(BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0), false)]
    #[case(BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0), false)]
    fn test_box_validity(#[case] bbox: BoundingBox, #[case] expected: bool) {
        assert_eq!(bbox.is_valid(), expected);
    }

    #[test]
    fn test_midpoint_averages_each_coordinate() {
        let a = BoundingBox::new(10.0, 20.0, 50.0, 60.0);
        let b = BoundingBox::new(20.0, 30.0, 70.0, 80.0);
        assert_eq!(a.midpoint(&b), BoundingBox::new(15.0, 25.0, 60.0, 70.0));
    }

    #[rstest]
    #[case(29.9, 0.0, true)]
    #[case(0.0, -29.9, true)]
    #[case(30.0, 0.0, false)]
    #[case(0.0, 30.0, false)]
    #[case(31.0, 31.0, false)]
    fn test_top_left_tolerance_is_strict_per_axis(
        #[case] dx: f64,
        #[case] dy: f64,
        #[case] expected: bool,
    ) {
        let a = BoundingBox::new(100.0, 100.0, 150.0, 150.0);
        let b = BoundingBox::new(100.0 + dx, 100.0 + dy, 400.0, 400.0);
        assert_eq!(a.top_left_within(&b, 30.0), expected);
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert_relative_eq!(a.iou(&b), 50.0 / 150.0);
    }

    #[test]
    fn test_retain_valid_clamps_to_frame() {
        let kept = RawDetection::retain_valid(
            vec![RawDetection::new(-5.0, -5.0, 700.0, 50.0, "car", 0.7)],
            640,
            480,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox, BoundingBox::new(0.0, 0.0, 640.0, 50.0));
    }

    #[test]
    fn test_retain_valid_discards_bad_boxes() {
        let detections = vec![
            RawDetection::new(10.0, 10.0, 5.0, 20.0, "inverted", 0.9),
            RawDetection::new(700.0, 10.0, 800.0, 20.0, "offscreen", 0.9),
            RawDetection::new(10.0, 10.0, 20.0, 20.0, "overconfident", 1.5),
            RawDetection::new(10.0, 10.0, 20.0, 20.0, "person", 0.9),
        ];
        let kept = RawDetection::retain_valid(detections, 640, 480);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].label, "person");
    }

    #[test]
    fn test_raw_detection_json_is_flat() {
        let json = r#"{"x1":1.0,"y1":2.0,"x2":3.0,"y2":4.0,"label":"dog","confidence":0.5}"#;
        let det: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(det, RawDetection::new(1.0, 2.0, 3.0, 4.0, "dog", 0.5));
    }

    #[test]
    fn test_unsmoothed_has_count_one() {
        let raw = RawDetection::new(1.0, 2.0, 3.0, 4.0, "cat", 0.4);
        let stable = StableDetection::unsmoothed(&raw);
        assert_eq!(stable.stability_count, 1);
        assert_eq!(stable.bbox, raw.bbox);
        assert_relative_eq!(stable.confidence, 0.4);
    }
}
