use ndarray::ArrayViewMut3;

use crate::shared::detection::StableDetection;
use crate::shared::frame::Frame;

use super::class_palette::ClassPalette;

const DEFAULT_THICKNESS: u32 = 2;
const PAUSED_BORDER: [u8; 3] = [255, 200, 0];

/// Draws detection outlines into a copy of the frame.
///
/// Boxes are clamped to the frame first; anything left degenerate is
/// skipped. A paused frame also gets a coloured border.
#[derive(Debug)]
pub struct BoxAnnotator {
    palette: ClassPalette,
    thickness: u32,
}

impl BoxAnnotator {
    pub fn new(thickness: u32) -> Self {
        Self {
            palette: ClassPalette::new(),
            thickness: thickness.max(1),
        }
    }

    pub fn annotate(&mut self, frame: &Frame, detections: &[StableDetection], paused: bool) -> Frame {
        let mut out = frame.clone();
        let (width, height) = (out.width(), out.height());
        if width == 0 || height == 0 || out.channels() < 3 {
            return out;
        }

        let mut view = out.as_ndarray_mut();
        for det in detections {
            let bbox = det.bbox.clamp_to(width, height);
            if !bbox.is_valid() {
                continue;
            }
            let color = self.palette.color_for(&det.label);
            let x1 = bbox.x1.floor() as u32;
            let y1 = bbox.y1.floor() as u32;
            let x2 = (bbox.x2.ceil() as u32).min(width) - 1;
            let y2 = (bbox.y2.ceil() as u32).min(height) - 1;
            draw_outline(&mut view, (x1, y1, x2, y2), self.thickness, color);
        }
        if paused {
            draw_outline(
                &mut view,
                (0, 0, width - 1, height - 1),
                self.thickness * 2,
                PAUSED_BORDER,
            );
        }
        out
    }
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new(DEFAULT_THICKNESS)
    }
}

/// Outlines the inclusive rectangle `(x1, y1, x2, y2)`, growing inwards.
fn draw_outline(
    view: &mut ArrayViewMut3<'_, u8>,
    (x1, y1, x2, y2): (u32, u32, u32, u32),
    thickness: u32,
    color: [u8; 3],
) {
    let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
    let t = thickness as usize;
    for y in y1..=y2 {
        for x in x1..=x2 {
            let on_edge = x < x1 + t || y < y1 + t || x + t > x2 || y + t > y2;
            if on_edge {
                for (c, &value) in color.iter().enumerate() {
                    view[[y, x, c]] = value;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::CLASS_PALETTE;
    use crate::shared::detection::RawDetection;

    fn stable(x1: f64, y1: f64, x2: f64, y2: f64, label: &str) -> StableDetection {
        StableDetection::unsmoothed(&RawDetection::new(x1, y1, x2, y2, label, 0.9))
    }

    fn pixel(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let view = frame.as_ndarray();
        [view[[y, x, 0]], view[[y, x, 1]], view[[y, x, 2]]]
    }

    #[test]
    fn test_outline_drawn_interior_untouched() {
        let frame = Frame::blank(40, 30, 0);
        let mut annotator = BoxAnnotator::new(1);
        let out = annotator.annotate(&frame, &[stable(10.0, 5.0, 20.0, 15.0, "person")], false);

        let color = CLASS_PALETTE[0];
        assert_eq!(pixel(&out, 10, 5), color);
        assert_eq!(pixel(&out, 19, 14), color);
        assert_eq!(pixel(&out, 15, 10), [0, 0, 0]);
        assert_eq!(pixel(&out, 25, 10), [0, 0, 0]);
    }

    #[test]
    fn test_source_frame_not_modified() {
        let frame = Frame::blank(20, 20, 0);
        let mut annotator = BoxAnnotator::default();
        annotator.annotate(&frame, &[stable(2.0, 2.0, 10.0, 10.0, "cup")], true);
        assert!(frame.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_box_outside_frame_clamped() {
        let frame = Frame::blank(20, 20, 0);
        let mut annotator = BoxAnnotator::new(1);
        let out = annotator.annotate(&frame, &[stable(-5.0, -5.0, 50.0, 50.0, "car")], false);
        assert_eq!(pixel(&out, 0, 0), CLASS_PALETTE[0]);
        assert_eq!(pixel(&out, 19, 19), CLASS_PALETTE[0]);
    }

    #[test]
    fn test_fully_outside_box_skipped() {
        let frame = Frame::blank(20, 20, 0);
        let mut annotator = BoxAnnotator::new(1);
        let out = annotator.annotate(&frame, &[stable(30.0, 30.0, 40.0, 40.0, "car")], false);
        assert!(out.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_paused_border() {
        let frame = Frame::blank(20, 20, 0);
        let mut annotator = BoxAnnotator::new(1);
        let out = annotator.annotate(&frame, &[], true);
        assert_eq!(pixel(&out, 0, 10), PAUSED_BORDER);
        assert_eq!(pixel(&out, 10, 10), [0, 0, 0]);
    }
}
