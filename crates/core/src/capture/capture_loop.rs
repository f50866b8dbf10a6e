use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::capture::frame_channel::FrameChannel;
use crate::pipeline::state_store::StateStore;
use crate::shared::constants::{
    CAPTURE_RETRY_BACKOFF, CAPTURE_STOP_TIMEOUT, DEFAULT_FRAME_BUFFER_SIZE,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureConfig {
    /// Capacity of the frame channel.
    pub buffer_size: usize,
    pub retry_backoff: Duration,
    pub stop_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_FRAME_BUFFER_SIZE,
            retry_backoff: CAPTURE_RETRY_BACKOFF,
            stop_timeout: CAPTURE_STOP_TIMEOUT,
        }
    }
}

/// Point-in-time copy of the capture counters.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureStats {
    pub total_frames: u64,
    /// Read failures plus frames evicted from the channel.
    pub dropped_frames: u64,
    pub read_failures: u64,
    pub drop_rate_percent: f64,
    pub queue_len: usize,
    pub is_running: bool,
    pub last_frame_age: Option<Duration>,
}

#[derive(Default)]
struct CaptureCounters {
    total_frames: AtomicU64,
    dropped_frames: AtomicU64,
    read_failures: AtomicU64,
    last_frame_at: Mutex<Option<Instant>>,
}

impl CaptureCounters {
    fn reset(&self) {
        self.total_frames.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);
        self.read_failures.store(0, Ordering::Relaxed);
        *self.last_frame_at.lock() = None;
    }
}

struct CaptureWorker {
    handle: JoinHandle<Box<dyn FrameSource>>,
    done_rx: Receiver<()>,
}

/// Drives a [`FrameSource`] on a dedicated thread, pushing every frame into a
/// drop-oldest [`FrameChannel`].
///
/// The source moves into the thread on `start` and comes back on a clean
/// `stop`. If the thread does not exit within the stop timeout it is
/// detached and the source is lost with it.
pub struct CaptureLoop {
    source: Option<Box<dyn FrameSource>>,
    channel: FrameChannel,
    config: CaptureConfig,
    counters: Arc<CaptureCounters>,
    state: Option<Arc<StateStore>>,
    running: Arc<AtomicBool>,
    worker: Option<CaptureWorker>,
}

impl CaptureLoop {
    pub fn new(source: Box<dyn FrameSource>, config: CaptureConfig) -> Self {
        Self {
            source: Some(source),
            channel: FrameChannel::new(config.buffer_size),
            config,
            counters: Arc::new(CaptureCounters::default()),
            state: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Also report dropped frames to the shared state store.
    pub fn with_state_store(mut self, state: Arc<StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    /// The consumer side of the frame buffer.
    pub fn channel(&self) -> &FrameChannel {
        &self.channel
    }

    /// False once the capture thread has exited, including by panicking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self
                .worker
                .as_ref()
                .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Starts the capture thread. Calling it while already running is a no-op.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_running() {
            log::warn!("Capture already running");
            return Ok(());
        }
        if self.worker.is_some() {
            // Reap a thread that died on its own so its source is recovered or reported lost.
            self.stop();
        }
        let source = self.source.take().ok_or(CaptureError::SourceLost)?;
        let name = source.describe();

        self.running.store(true, Ordering::Relaxed);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let channel = self.channel.clone();
        let counters = Arc::clone(&self.counters);
        let state = self.state.clone();
        let running = Arc::clone(&self.running);
        let backoff = self.config.retry_backoff;

        let spawned = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let mut source = source;
                run_capture(
                    source.as_mut(),
                    &channel,
                    &counters,
                    state.as_deref(),
                    &running,
                    backoff,
                );
                let _ = done_tx.send(());
                source
            });

        match spawned {
            Ok(handle) => {
                log::info!("Capture started from {name}");
                self.worker = Some(CaptureWorker { handle, done_rx });
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Relaxed);
                Err(CaptureError::Spawn(e))
            }
        }
    }

    /// Signals the capture thread to exit and waits up to the stop timeout.
    ///
    /// Queued frames are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        let Some(worker) = self.worker.take() else {
            return;
        };

        match worker.done_rx.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match worker.handle.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => log::error!("Capture thread panicked"),
            },
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "Capture thread did not stop within {:?}; detaching it",
                    self.config.stop_timeout
                );
            }
        }

        let discarded = self.channel.clear();
        log::debug!("Capture stopped, discarded {discarded} queued frames");
    }

    /// Stops capture and releases the source device.
    pub fn release(&mut self) {
        self.stop();
        if let Some(mut source) = self.source.take() {
            source.release();
            log::info!("Released {}", source.describe());
        }
    }

    pub fn statistics(&self) -> CaptureStats {
        let total_frames = self.counters.total_frames.load(Ordering::Relaxed);
        let dropped_frames = self.counters.dropped_frames.load(Ordering::Relaxed);
        let attempts = total_frames + dropped_frames;
        let drop_rate_percent = if attempts > 0 {
            dropped_frames as f64 / attempts as f64 * 100.0
        } else {
            0.0
        };
        CaptureStats {
            total_frames,
            dropped_frames,
            read_failures: self.counters.read_failures.load(Ordering::Relaxed),
            drop_rate_percent,
            queue_len: self.channel.len(),
            is_running: self.is_running(),
            last_frame_age: self.counters.last_frame_at.lock().map(|t| t.elapsed()),
        }
    }

    pub fn reset_statistics(&self) {
        self.counters.reset();
        self.channel.reset_dropped();
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        // The thread is daemonic: it notices the flag on its next iteration.
        self.running.store(false, Ordering::Relaxed);
    }
}

fn run_capture(
    source: &mut dyn FrameSource,
    channel: &FrameChannel,
    counters: &CaptureCounters,
    state: Option<&StateStore>,
    running: &AtomicBool,
    backoff: Duration,
) {
    while running.load(Ordering::Relaxed) {
        let Some(frame) = source.read() else {
            counters.read_failures.fetch_add(1, Ordering::Relaxed);
            counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
            if let Some(state) = state {
                state.increment_dropped_frames(1);
            }
            log::debug!("Frame read failed, retrying in {backoff:?}");
            std::thread::sleep(backoff);
            continue;
        };

        let now = Instant::now();
        counters.total_frames.fetch_add(1, Ordering::Relaxed);
        *counters.last_frame_at.lock() = Some(now);

        let evicted = channel.push(frame.with_captured_at(now));
        if evicted > 0 {
            counters.dropped_frames.fetch_add(evicted, Ordering::Relaxed);
            if let Some(state) = state {
                state.increment_dropped_frames(evicted);
            }
        }
    }
}
