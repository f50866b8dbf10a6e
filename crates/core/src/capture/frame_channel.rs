use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::shared::frame::Frame;

/// Bounded frame buffer between the capture thread and the consumer with
/// drop-oldest backpressure.
///
/// `push` never blocks: when the buffer is full the oldest queued frame is
/// evicted and counted as dropped. With capacity 1 the consumer always sees
/// the freshest frame. Clones share the same buffer.
#[derive(Clone)]
pub struct FrameChannel {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl FrameChannel {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueues a frame, evicting older frames as needed. Returns how many
    /// frames were evicted to make room.
    pub fn push(&self, frame: Frame) -> u64 {
        let mut pending = frame;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    pending = returned;
                    // The consumer may have taken the frame in between; only
                    // count what we actually removed.
                    if self.rx.try_recv().is_ok() {
                        evicted += 1;
                    }
                }
                // Unreachable while `self` holds a receiver.
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
        if evicted > 0 {
            self.dropped.fetch_add(evicted, Ordering::Relaxed);
        }
        evicted
    }

    /// Waits up to `timeout` for the oldest queued frame.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Discards every queued frame without counting them as dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted by `push` since creation or the last reset.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }
}
