use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::capture::capture_loop::CaptureLoop;
use crate::capture::domain::frame_source::CaptureError;
use crate::detection::domain::object_detector::{DetectionError, ObjectDetector};
use crate::detection::domain::stabilizer::DetectionStabilizer;
use crate::detection::infrastructure::model_resolver::ModelResolveError;
use crate::pipeline::control::ControlCommand;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::state_store::StateStore;
use crate::rendering::domain::render_sink::{OverlayMetrics, RenderSink};
use crate::shared::constants::FRAME_POP_TIMEOUT;
use crate::shared::detection::{RawDetection, StableDetection};
use crate::shared::frame::Frame;
use crate::shared::settings::ConfigError;

/// Errors that end a run before or during startup.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelResolveError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveDetectionConfig {
    /// Frames skipped between detections; 0 detects on every frame.
    pub skip_frames: usize,
    pub pop_timeout: Duration,
    /// Stop after this many consumed frames.
    pub max_frames: Option<u64>,
}

impl Default for LiveDetectionConfig {
    fn default() -> Self {
        Self {
            skip_frames: 0,
            pop_timeout: FRAME_POP_TIMEOUT,
            max_frames: None,
        }
    }
}

/// The consumer side of the pipeline.
///
/// Owns the capture loop, the detector, the stabilizer and the render sink,
/// and runs on a single thread. Only the [`StateStore`] is shared with other
/// threads.
///
/// Per frame: pop the freshest frame, detect (unless paused or skipped),
/// discard invalid boxes, stabilize, update metrics, render. Per-frame
/// failures are logged and the previous stable detections are shown
/// instead.
pub struct LiveDetectionUseCase {
    capture: CaptureLoop,
    detector: Box<dyn ObjectDetector>,
    stabilizer: Box<dyn DetectionStabilizer>,
    sink: Box<dyn RenderSink>,
    state: Arc<StateStore>,
    logger: Box<dyn PipelineLogger>,
    commands: Option<Receiver<ControlCommand>>,
    config: LiveDetectionConfig,
    last_stable: Vec<StableDetection>,
    frames_seen: u64,
    frames_active: u64,
}

impl LiveDetectionUseCase {
    pub fn new(
        capture: CaptureLoop,
        detector: Box<dyn ObjectDetector>,
        stabilizer: Box<dyn DetectionStabilizer>,
        sink: Box<dyn RenderSink>,
        state: Arc<StateStore>,
        logger: Box<dyn PipelineLogger>,
        config: LiveDetectionConfig,
    ) -> Self {
        Self {
            capture,
            detector,
            stabilizer,
            sink,
            state,
            logger,
            commands: None,
            config,
            last_stable: Vec::new(),
            frames_seen: 0,
            frames_active: 0,
        }
    }

    /// Attaches the receiving end of a control channel.
    pub fn with_commands(mut self, commands: Receiver<ControlCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Runs until `shutdown` is set, a quit command arrives, the state store
    /// enters shutdown, or the frame limit is reached.
    ///
    /// Only a capture start failure is returned as an error; the store is
    /// moved to `Error` first.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), PipelineError> {
        if let Err(e) = self.capture.start() {
            self.state.error(&e.to_string());
            return Err(e.into());
        }
        self.state.start();
        self.logger.info("Live detection started");

        loop {
            if shutdown.load(Ordering::Relaxed) || self.state.is_shutting_down() {
                break;
            }
            if self.drain_commands() {
                break;
            }
            if self
                .config
                .max_frames
                .is_some_and(|limit| self.frames_seen >= limit)
            {
                break;
            }
            let Some(frame) = self.capture.channel().pop(self.config.pop_timeout) else {
                continue;
            };
            self.process_frame(&frame);
        }

        self.shutdown();
        Ok(())
    }

    /// Clears metrics, the stabilization window and capture statistics.
    pub fn reset_statistics(&mut self) {
        self.state.reset_performance();
        self.stabilizer.reset();
        self.capture.reset_statistics();
    }

    fn process_frame(&mut self, frame: &Frame) {
        self.frames_seen += 1;
        let paused = self.state.is_paused();

        if !paused {
            self.frames_active += 1;
            if self.should_detect() {
                self.detect_and_stabilize(frame);
            }
            self.state.update_frame_count();
        }

        let overlay = OverlayMetrics::from_snapshot(
            &self.state.snapshot(),
            self.last_stable.len(),
            paused,
            self.state.show_performance(),
            self.state.is_recording(),
        );
        let started = Instant::now();
        if let Err(e) = self.sink.render(frame, &self.last_stable, &overlay) {
            log::debug!("Render failed on frame {}: {e}", frame.index());
        }
        self.logger.timing("render", ms_since(started));

        self.logger.metric("queue_depth", self.capture.channel().len() as f64);
        self.logger
            .metric("frame_age_ms", frame.age().as_secs_f64() * 1000.0);
        self.logger.progress(self.frames_seen);
    }

    /// Detect on the first active frame and then once every
    /// `skip_frames + 1` active frames.
    fn should_detect(&self) -> bool {
        (self.frames_active - 1) % (self.config.skip_frames as u64 + 1) == 0
    }

    fn detect_and_stabilize(&mut self, frame: &Frame) {
        let started = Instant::now();
        let raw = match self.detector.detect(frame) {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("Detection failed on frame {}: {e}", frame.index());
                return;
            }
        };
        let elapsed = started.elapsed();
        self.state.update_detection_time(elapsed);
        self.logger.timing("detect", elapsed.as_secs_f64() * 1000.0);

        let raw = RawDetection::retain_valid(raw, frame.width(), frame.height());
        let started = Instant::now();
        self.last_stable = self.stabilizer.stabilize(&raw);
        self.logger.timing("stabilize", ms_since(started));
        self.state.increment_detections(self.last_stable.len() as u64);
        self.logger.metric("detections", self.last_stable.len() as f64);
    }

    /// Applies queued commands. Returns true on quit.
    fn drain_commands(&mut self) -> bool {
        let Some(commands) = &self.commands else {
            return false;
        };
        let pending: Vec<ControlCommand> = commands.try_iter().collect();
        pending.into_iter().any(|command| self.apply(command))
    }

    fn apply(&mut self, command: ControlCommand) -> bool {
        log::debug!("Control command {command:?}");
        match command {
            ControlCommand::TogglePause => {
                self.state.toggle_pause();
            }
            ControlCommand::Pause => {
                self.state.pause();
            }
            ControlCommand::Resume => {
                self.state.resume();
            }
            ControlCommand::ResetStatistics => self.reset_statistics(),
            ControlCommand::TogglePerformance => {
                let on = self.state.toggle_performance_display();
                log::info!("Performance display {}", if on { "on" } else { "off" });
            }
            ControlCommand::ToggleRecording => {
                self.state.toggle_recording();
            }
            ControlCommand::Quit => return true,
        }
        false
    }

    fn shutdown(&mut self) {
        self.state.stop();
        self.capture.release();
        self.sink.close();

        let stats = self.capture.statistics();
        self.logger.info(&format!(
            "Captured {} frames, dropped {} ({:.1}%), {} read failures",
            stats.total_frames, stats.dropped_frames, stats.drop_rate_percent, stats.read_failures
        ));
        self.logger.summary();
        self.state.mark_stopped();
    }
}

fn ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
