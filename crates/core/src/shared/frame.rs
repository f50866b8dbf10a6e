use std::time::{Duration, Instant};

use ndarray::{ArrayView3, ArrayViewMut3};

/// A captured video frame: contiguous RGB bytes in row-major order plus the
/// monotonic instant at which it was acquired.
///
/// A frame is moved, never shared: the capture thread owns it until it is
/// pushed into the frame channel, and the consumer owns it after `pop`.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
    captured_at: Instant,
}

impl Frame {
    /// Builds a frame stamped with the current instant.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
            captured_at: Instant::now(),
        }
    }

    /// A black RGB frame, mostly useful for warm-up inference and tests.
    pub fn blank(width: u32, height: u32, index: usize) -> Self {
        Self::new(
            vec![0u8; (width as usize) * (height as usize) * 3],
            width,
            height,
            3,
            index,
        )
    }

    /// Re-stamps the frame, e.g. with the instant it entered the channel.
    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time elapsed since capture; the end-to-end latency when read by the consumer.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_report_construction_values() {
        let frame = Frame::new(vec![7u8; 2 * 3 * 3], 3, 2, 3, 42);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 42);
        assert!(frame.data().iter().all(|&b| b == 7));
    }

    #[test]
    fn test_blank_is_black_rgb() {
        let frame = Frame::blank(4, 2, 0);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 24);
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_with_captured_at_restamps() {
        let earlier = Instant::now();
        std::thread::sleep(Duration::from_millis(2));
        let frame = Frame::blank(1, 1, 0);
        assert!(frame.captured_at() > earlier);

        let restamped = frame.with_captured_at(earlier);
        assert_eq!(restamped.captured_at(), earlier);
        assert!(restamped.age() >= Duration::from_millis(2));
    }

    #[test]
    fn test_move_keeps_pixels_intact() {
        let mut frame = Frame::blank(2, 2, 1);
        frame.data_mut()[0] = 200;
        let moved = frame.with_captured_at(Instant::now());
        assert_eq!(moved.data()[0], 200);
        assert_eq!(moved.index(), 1);
    }

    #[test]
    fn test_as_ndarray_is_height_width_channels() {
        let mut data = vec![0u8; 2 * 4 * 3];
        data[(4 + 1) * 3 + 2] = 9; // row 1, col 1, B
        let frame = Frame::new(data, 4, 2, 3, 0);
        let view = frame.as_ndarray();
        assert_eq!(view.shape(), &[2, 4, 3]);
        assert_eq!(view[[1, 1, 2]], 9);
    }

    #[test]
    fn test_as_ndarray_mut_writes_through() {
        let mut frame = Frame::blank(2, 2, 0);
        frame.as_ndarray_mut()[[0, 1, 0]] = 255;
        assert_eq!(frame.data()[3], 255);
    }
}
