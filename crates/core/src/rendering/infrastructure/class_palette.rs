use std::collections::HashMap;

use crate::shared::constants::CLASS_PALETTE;

/// Assigns each label a colour from [`CLASS_PALETTE`] in first-seen order,
/// so a class keeps its colour for the whole session.
///
/// Owned by the consumer thread; no locking.
#[derive(Debug, Default)]
pub struct ClassPalette {
    assigned: HashMap<String, [u8; 3]>,
}

impl ClassPalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color_for(&mut self, label: &str) -> [u8; 3] {
        if let Some(&color) = self.assigned.get(label) {
            return color;
        }
        let color = CLASS_PALETTE[self.assigned.len() % CLASS_PALETTE.len()];
        self.assigned.insert(label.to_string(), color);
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
