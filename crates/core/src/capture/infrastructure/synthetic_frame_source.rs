use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::{CaptureError, FrameSource, SourceConfig};
use crate::shared::detection::BoundingBox;
use crate::shared::frame::Frame;

const SQUARE_FRACTION: u32 = 6;
const SQUARE_COLOR: [u8; 3] = [230, 40, 40];

/// Generates a test pattern: a dark gradient with a red square bouncing
/// across it. Paced to the configured fps so it behaves like a camera.
pub struct SyntheticFrameSource {
    config: SourceConfig,
    next_index: usize,
    next_due: Option<Instant>,
    paced: bool,
    fail_every: Option<usize>,
    reads: usize,
    released: bool,
}

impl SyntheticFrameSource {
    pub fn new() -> Self {
        Self {
            config: SourceConfig::default(),
            next_index: 0,
            next_due: None,
            paced: true,
            fail_every: None,
            reads: 0,
            released: false,
        }
    }

    /// Deliver frames as fast as they are read.
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Every `n`-th read fails, to exercise retry paths.
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Where the square is drawn in frame `index`.
    pub fn square_at(&self, index: usize) -> BoundingBox {
        square_position(self.config.width, self.config.height, index)
    }

    fn wait_for_slot(&mut self) {
        if !self.paced || self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.fps as f64);
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Never accumulate debt after a slow consumer.
        self.next_due = Some(due.max(now) + interval);
    }
}

impl Default for SyntheticFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for SyntheticFrameSource {
    fn configure(&mut self, config: &SourceConfig) -> Result<(), CaptureError> {
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::Open {
                source_name: self.describe(),
                reason: format!("invalid resolution {}x{}", config.width, config.height),
            });
        }
        self.config = *config;
        self.released = false;
        Ok(())
    }

    fn read(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }
        self.wait_for_slot();
        self.reads += 1;
        if self.fail_every.is_some_and(|n| self.reads % n == 0) {
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;
        Some(render_pattern(self.config.width, self.config.height, index))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!(
            "synthetic source {}x{}@{}",
            self.config.width, self.config.height, self.config.fps
        )
    }
}

fn square_position(width: u32, height: u32, index: usize) -> BoundingBox {
    let side = (width.min(height) / SQUARE_FRACTION).max(1);
    let span_x = (width - side).max(1) as usize;
    let span_y = (height - side).max(1) as usize;
    // Triangle wave so the square bounces off the edges.
    let bounce = |t: usize, span: usize| {
        let phase = t % (2 * span);
        if phase < span {
            phase
        } else {
            2 * span - phase
        }
    };
    let x = bounce(index * 4, span_x) as f64;
    let y = bounce(index * 3, span_y) as f64;
    BoundingBox::new(x, y, x + side as f64, y + side as f64)
}

fn render_pattern(width: u32, height: u32, index: usize) -> Frame {
    let w = width as usize;
    let h = height as usize;
    let mut data = vec![0u8; w * h * 3];

    for row in 0..h {
        let shade = (row * 64 / h.max(1)) as u8;
        let row_offset = row * w * 3;
        for px in data[row_offset..row_offset + w * 3].chunks_exact_mut(3) {
            px.copy_from_slice(&[shade, shade, shade + 16]);
        }
    }

    let square = square_position(width, height, index);
    let (x1, y1) = (square.x1 as usize, square.y1 as usize);
    let (x2, y2) = ((square.x2 as usize).min(w), (square.y2 as usize).min(h));
    for row in y1..y2 {
        let row_offset = row * w * 3;
        for col in x1..x2 {
            let offset = row_offset + col * 3;
            data[offset..offset + 3].copy_from_slice(&SQUARE_COLOR);
        }
    }

    Frame::new(data, width, height, 3, index)
}
