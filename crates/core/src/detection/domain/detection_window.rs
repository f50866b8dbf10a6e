use std::collections::VecDeque;

use crate::shared::detection::RawDetection;

/// Fixed-capacity FIFO of per-frame detection lists, oldest first.
///
/// Owned by the stabilizer on the consumer thread.
#[derive(Clone, Debug)]
pub struct DetectionWindow {
    capacity: usize,
    entries: VecDeque<Vec<RawDetection>>,
}

impl DetectionWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends one frame's detections, evicting the oldest entry when full.
    pub fn push(&mut self, detections: Vec<RawDetection>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(detections);
    }

    /// Every entry except the newest, oldest to newest.
    pub fn history(&self) -> impl Iterator<Item = &[RawDetection]> {
        let older = self.entries.len().saturating_sub(1);
        self.entries.iter().take(older).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
