use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::ReentrantMutex;
use serde::Serialize;

use crate::pipeline::performance_metrics::{MetricsAccumulator, MetricsConfig, PerformanceMetrics};

/// Application lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Initializing,
    Running,
    Paused,
    Stopping,
    Stopped,
    Error,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Initializing => "initializing",
            AppState::Running => "running",
            AppState::Paused => "paused",
            AppState::Stopping => "stopping",
            AppState::Stopped => "stopped",
            AppState::Error => "error",
        }
    }

    /// Whether `self -> next` is a permitted transition.
    pub fn can_transition_to(self, next: AppState) -> bool {
        use AppState::*;
        matches!(
            (self, next),
            (Initializing, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Initializing | Running | Paused, Stopping)
                | (Stopping, Stopped)
        ) || (next == Error && self != Error)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`StateStore::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Called with `(old, new)` after every transition.
pub type StateListener = Arc<dyn Fn(AppState, AppState) + Send + Sync>;

/// Serializable view of the whole store, for export and end-of-run reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StateSummary {
    pub state: AppState,
    pub uptime_secs: f64,
    pub show_performance: bool,
    pub recording: bool,
    pub debug_mode: bool,
    pub metrics: PerformanceMetrics,
    /// `avg_detection_time` in milliseconds, for display.
    pub avg_detection_time_ms: f64,
}

struct Inner {
    state: AppState,
    metrics: MetricsAccumulator,
    listeners: Vec<(ListenerId, StateListener)>,
    next_listener_id: u64,
    show_performance: bool,
    recording: bool,
    debug_mode: bool,
}

/// Thread-safe lifecycle state machine plus performance metrics.
///
/// Shared by the capture thread, the consumer thread and input handlers.
/// Everything sits behind one re-entrant lock, so compound operations such
/// as "pause if running" are atomic and listeners may call back into the
/// store. Readers always get value copies.
pub struct StateStore {
    inner: ReentrantMutex<RefCell<Inner>>,
    started_at: Instant,
}

impl StateStore {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                state: AppState::Initializing,
                metrics: MetricsAccumulator::new(config),
                listeners: Vec::new(),
                next_listener_id: 0,
                show_performance: true,
                recording: false,
                debug_mode: false,
            })),
            started_at: Instant::now(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        f(&inner)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        f(&mut inner)
    }

    // --- lifecycle ---

    pub fn state(&self) -> AppState {
        self.read(|inner| inner.state)
    }

    /// Moves to `next` and notifies listeners. Returns whether the state
    /// changed; setting the current state or a forbidden transition is a
    /// silent no-op.
    ///
    /// Listeners run on the calling thread while the lock is still held, so
    /// notifications are never interleaved with another transition.
    pub fn set_state(&self, next: AppState) -> bool {
        let guard = self.inner.lock();
        let (previous, listeners) = {
            let mut inner = guard.borrow_mut();
            let previous = inner.state;
            if previous == next {
                return false;
            }
            if !previous.can_transition_to(next) {
                log::debug!("Ignoring state change {previous} -> {next}");
                return false;
            }
            inner.state = next;
            let listeners: Vec<StateListener> =
                inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (previous, listeners)
        };

        log::info!("State changed: {previous} -> {next}");
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(previous, next))).is_err() {
                log::error!("State listener panicked on {previous} -> {next}");
            }
        }
        drop(guard);
        true
    }

    pub fn is_running(&self) -> bool {
        self.state() == AppState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state() == AppState::Paused
    }

    /// True once shutdown has begun or the store is in a terminal state.
    pub fn is_shutting_down(&self) -> bool {
        matches!(
            self.state(),
            AppState::Stopping | AppState::Stopped | AppState::Error
        )
    }

    pub fn start(&self) -> bool {
        self.set_state(AppState::Running)
    }

    /// Running → Paused; no-op from any other state.
    pub fn pause(&self) -> bool {
        self.transition_from(AppState::Running, AppState::Paused)
    }

    /// Paused → Running; no-op from any other state.
    pub fn resume(&self) -> bool {
        self.transition_from(AppState::Paused, AppState::Running)
    }

    pub fn toggle_pause(&self) -> bool {
        let _guard = self.inner.lock();
        match self.state() {
            AppState::Running => self.pause(),
            AppState::Paused => self.resume(),
            _ => false,
        }
    }

    /// Begins shutdown.
    pub fn stop(&self) -> bool {
        self.set_state(AppState::Stopping)
    }

    /// Completes shutdown once resources are released.
    pub fn mark_stopped(&self) -> bool {
        self.set_state(AppState::Stopped)
    }

    pub fn error(&self, message: &str) -> bool {
        log::error!("Application error: {message}");
        self.set_state(AppState::Error)
    }

    fn transition_from(&self, expected: AppState, next: AppState) -> bool {
        let _guard = self.inner.lock();
        self.state() == expected && self.set_state(next)
    }

    // --- listeners ---

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(AppState, AppState) + Send + Sync + 'static,
    {
        self.write(|inner| {
            let id = ListenerId(inner.next_listener_id);
            inner.next_listener_id += 1;
            inner.listeners.push((id, Arc::new(listener)));
            id
        })
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.write(|inner| {
            let before = inner.listeners.len();
            inner.listeners.retain(|(lid, _)| *lid != id);
            inner.listeners.len() < before
        })
    }

    // --- metrics ---

    pub fn snapshot(&self) -> PerformanceMetrics {
        self.read(|inner| inner.metrics.snapshot())
    }

    pub fn update_frame_count(&self) {
        self.record_frame_at(Instant::now());
    }

    pub fn record_frame_at(&self, now: Instant) {
        self.write(|inner| inner.metrics.record_frame(now));
    }

    pub fn update_detection_time(&self, elapsed: Duration) {
        self.write(|inner| inner.metrics.record_detection_time(elapsed));
    }

    pub fn increment_detections(&self, count: u64) {
        self.write(|inner| inner.metrics.add_detections(count));
    }

    pub fn increment_dropped_frames(&self, count: u64) {
        self.write(|inner| inner.metrics.add_dropped_frames(count));
    }

    pub fn update_system_metrics(&self, memory_usage_mb: f64, cpu_usage_percent: f64) {
        self.write(|inner| inner.metrics.set_system_metrics(memory_usage_mb, cpu_usage_percent));
    }

    pub fn reset_performance(&self) {
        self.write(|inner| inner.metrics.reset());
        log::info!("Performance metrics reset");
    }

    // --- flags ---

    pub fn show_performance(&self) -> bool {
        self.read(|inner| inner.show_performance)
    }

    /// Returns the new value.
    pub fn toggle_performance_display(&self) -> bool {
        self.write(|inner| {
            inner.show_performance = !inner.show_performance;
            inner.show_performance
        })
    }

    pub fn is_recording(&self) -> bool {
        self.read(|inner| inner.recording)
    }

    pub fn set_recording(&self, recording: bool) {
        self.write(|inner| inner.recording = recording);
        log::info!("Recording {}", if recording { "started" } else { "stopped" });
    }

    /// Returns the new value.
    pub fn toggle_recording(&self) -> bool {
        let _guard = self.inner.lock();
        let recording = !self.is_recording();
        self.set_recording(recording);
        recording
    }

    pub fn debug_mode(&self) -> bool {
        self.read(|inner| inner.debug_mode)
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.write(|inner| inner.debug_mode = enabled);
    }

    pub fn summary(&self) -> StateSummary {
        self.read(|inner| {
            let metrics = inner.metrics.snapshot();
            StateSummary {
                state: inner.state,
                uptime_secs: self.started_at.elapsed().as_secs_f64(),
                show_performance: inner.show_performance,
                recording: inner.recording,
                debug_mode: inner.debug_mode,
                avg_detection_time_ms: metrics.avg_detection_time * 1000.0,
                metrics,
            }
        })
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}
