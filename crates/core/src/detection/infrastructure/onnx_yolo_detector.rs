/// Multi-class YOLO object detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, class decoding, and
/// class-aware NMS for YOLOv8-style heads (`[1, 4 + classes, anchors]`).
use std::path::Path;

use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::shared::constants::{
    COCO_CLASSES, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS,
};
use crate::shared::detection::{BoundingBox, RawDetection};
use crate::shared::frame::Frame;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Box coordinates precede the class scores in each output row.
const BOX_VALUES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloConfig {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub max_detections: usize,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    class_names: Vec<String>,
    config: YoloConfig,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable. Labels default
    /// to the COCO classes.
    pub fn new(model_path: &Path, config: YoloConfig) -> Result<Self, DetectionError> {
        let load_err = |reason: String| DetectionError::ModelLoad {
            path: model_path.to_path_buf(),
            reason,
        };
        let session = ort::session::Session::builder()
            .map_err(|e| load_err(e.to_string()))?
            .with_execution_providers(preferred_execution_providers())
            .map_err(|e| load_err(format!("execution providers: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| load_err(e.to_string()))?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded {} (input {input_size}px, confidence {:.2})",
            model_path.display(),
            config.confidence_threshold
        );

        Ok(Self {
            session,
            class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
            config,
            input_size,
        })
    }

    /// Replaces the label list for models trained on other classes.
    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.class_names = class_names;
        self
    }

    /// Runs one inference on a blank frame so the first live frame does not
    /// pay session initialization costs.
    pub fn warm_up(&mut self, width: u32, height: u32) -> Result<(), DetectionError> {
        let started = std::time::Instant::now();
        self.detect(&Frame::blank(width, height, 0))?;
        log::debug!("Warm-up inference took {:?}", started.elapsed());
        Ok(())
    }
}

impl ObjectDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectionError> {
        if frame.width() == 0 || frame.height() == 0 || frame.channels() < 3 {
            return Err(DetectionError::InvalidFrame(format!(
                "{}x{}x{}",
                frame.width(),
                frame.height(),
                frame.channels()
            )));
        }

        // 1. Preprocess: letterbox + normalize → NCHW float32
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(DetectionError::Inference("model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(DetectionError::Inference(format!(
                "unexpected output shape: {shape:?}"
            )));
        }
        let data = tensor
            .as_slice()
            .ok_or_else(|| DetectionError::Inference("output tensor is not contiguous".into()))?;
        let layout = OutputLayout::from_shape(&shape);

        // 3. Decode rows above the confidence threshold
        let mut candidates = Vec::new();
        for i in 0..layout.num_dets {
            let row = layout.row(data, i);
            let Some((class_id, score)) = best_class(&row) else {
                continue;
            };
            if score < self.config.confidence_threshold {
                continue;
            }
            // Field access only: `outputs` still borrows the session.
            let Some(label) = self.class_names.get(class_id) else {
                continue;
            };

            let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
            let unpad = |v: f64, pad: u32| (v - pad as f64) / scale;
            candidates.push(RawDetection {
                bbox: BoundingBox::new(
                    unpad(cx - w / 2.0, pad_x),
                    unpad(cy - h / 2.0, pad_y),
                    unpad(cx + w / 2.0, pad_x),
                    unpad(cy + h / 2.0, pad_y),
                ),
                label: label.clone(),
                confidence: score,
            });
        }

        // 4. NMS, cap, and drop anything degenerate after clamping
        let mut kept = nms(candidates, self.config.iou_threshold);
        kept.truncate(self.config.max_detections);
        Ok(RawDetection::retain_valid(kept, frame.width(), frame.height()))
    }
}

/// Row access for both `[1, features, anchors]` and `[1, anchors, features]`.
struct OutputLayout {
    num_dets: usize,
    num_feats: usize,
    transposed: bool,
}

impl OutputLayout {
    fn from_shape(shape: &[usize]) -> Self {
        // Anchors always outnumber features for YOLO heads.
        if shape[1] < shape[2] {
            Self {
                num_dets: shape[2],
                num_feats: shape[1],
                transposed: true,
            }
        } else {
            Self {
                num_dets: shape[1],
                num_feats: shape[2],
                transposed: false,
            }
        }
    }

    fn row(&self, data: &[f32], i: usize) -> Vec<f32> {
        if self.transposed {
            (0..self.num_feats)
                .map(|f| data[f * self.num_dets + i])
                .collect()
        } else {
            data[i * self.num_feats..(i + 1) * self.num_feats].to_vec()
        }
    }
}

/// Highest-scoring class in a `[cx, cy, w, h, scores...]` row.
fn best_class(row: &[f32]) -> Option<(usize, f64)> {
    row.get(BOX_VALUES..)?
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(class_id, &score)| (class_id, score as f64))
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // 114/255 gray padding, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        let ty = pad_y as usize + y;
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

/// Greedy class-aware NMS: sort by confidence descending and suppress boxes
/// of the same label that overlap a kept box by more than `iou_thresh`.
fn nms(mut dets: Vec<RawDetection>, iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.label == det.label && k.bbox.iou(&det.bbox) > iou_thresh);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, label: &str, confidence: f64) -> RawDetection {
        RawDetection::new(x1, y1, x2, y2, label, confidence)
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → scale 3.2, content 640x320, 160px bars top and bottom
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let (tensor, scale, pad_x, pad_y) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((scale - 3.2).abs() < 0.01);
        assert_eq!((pad_x, pad_y), (0, 160));
    }

    #[test]
    fn test_letterbox_tall_frame_pads_sides() {
        let frame = Frame::new(vec![0u8; 100 * 200 * 3], 100, 200, 3, 0);
        let (_, scale, pad_x, pad_y) = letterbox(&frame, 640);
        assert!((scale - 3.2).abs() < 0.01);
        assert_eq!((pad_x, pad_y), (160, 0));
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let (tensor, _, pad_x, pad_y) = letterbox(&frame, 640);

        let inside = tensor[[0, 0, pad_y as usize + 1, pad_x as usize + 1]];
        assert!((inside - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn test_output_layout_transposed() {
        // [1, 84, 8400] is the YOLOv8 COCO head
        let layout = OutputLayout::from_shape(&[1, 6, 3]);
        assert!(!layout.transposed);
        let layout = OutputLayout::from_shape(&[1, 6, 10]);
        assert!(layout.transposed);
        assert_eq!((layout.num_dets, layout.num_feats), (10, 6));
    }

    #[test]
    fn test_output_layout_reads_columns_when_transposed() {
        // 2 anchors, 5 features, stored feature-major
        let data: Vec<f32> = vec![
            1.0, 2.0, // cx
            3.0, 4.0, // cy
            5.0, 6.0, // w
            7.0, 8.0, // h
            0.1, 0.9, // class 0
        ];
        let layout = OutputLayout {
            num_dets: 2,
            num_feats: 5,
            transposed: true,
        };
        assert_eq!(layout.row(&data, 1), vec![2.0, 4.0, 6.0, 8.0, 0.9]);
    }

    #[test]
    fn test_best_class_picks_argmax() {
        let row = [0.0, 0.0, 1.0, 1.0, 0.1, 0.7, 0.3];
        let (class_id, score) = best_class(&row).unwrap();
        assert_eq!(class_id, 1);
        assert!((score - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_best_class_none_without_scores() {
        assert!(best_class(&[0.0, 0.0, 1.0, 1.0]).is_none());
        assert!(best_class(&[0.0, 1.0]).is_none());
    }

    #[test]
    fn test_nms_suppresses_same_label_overlap() {
        let kept = nms(
            vec![
                det(0.0, 0.0, 100.0, 100.0, "person", 0.8),
                det(5.0, 5.0, 105.0, 105.0, "person", 0.9),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_labels() {
        let kept = nms(
            vec![
                det(0.0, 0.0, 100.0, 100.0, "person", 0.9),
                det(0.0, 0.0, 100.0, 100.0, "bicycle", 0.6),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let kept = nms(
            vec![
                det(0.0, 0.0, 50.0, 50.0, "car", 0.9),
                det(200.0, 200.0, 250.0, 250.0, "car", 0.8),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(Vec::new(), 0.5).is_empty());
    }

    #[test]
    fn test_nms_output_sorted_by_confidence() {
        let kept = nms(
            vec![
                det(0.0, 0.0, 10.0, 10.0, "a", 0.3),
                det(100.0, 0.0, 110.0, 10.0, "b", 0.9),
                det(200.0, 0.0, 210.0, 10.0, "c", 0.6),
            ],
            0.5,
        );
        let labels: Vec<&str> = kept.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_default_config() {
        let config = YoloConfig::default();
        assert!((config.confidence_threshold - 0.4).abs() < 1e-9);
        assert!((config.iou_threshold - 0.5).abs() < 1e-9);
        assert_eq!(config.max_detections, 50);
    }
}
