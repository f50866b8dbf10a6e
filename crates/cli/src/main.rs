use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::Sender;

use livedetect_core::capture::capture_loop::CaptureLoop;
use livedetect_core::capture::domain::frame_source::FrameSource;
use livedetect_core::capture::infrastructure::ffmpeg_frame_source::{
    FfmpegCameraOpener, FfmpegFrameSource,
};
use livedetect_core::capture::infrastructure::synthetic_frame_source::SyntheticFrameSource;
use livedetect_core::capture::source_probe;
use livedetect_core::detection::domain::object_detector::ObjectDetector;
use livedetect_core::detection::domain::stabilizer::WindowStabilizer;
use livedetect_core::detection::infrastructure::model_resolver::{self, ModelLocation};
use livedetect_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use livedetect_core::detection::infrastructure::replay_detector::ReplayDetector;
use livedetect_core::pipeline::control::ControlCommand;
use livedetect_core::pipeline::infrastructure::metrics_reporter::{
    JsonLinesMetricsSink, LogMetricsSink, MetricsReporter, MetricsSink,
};
use livedetect_core::pipeline::infrastructure::system_monitor::SystemMonitor;
use livedetect_core::pipeline::live_detection_use_case::LiveDetectionUseCase;
use livedetect_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use livedetect_core::pipeline::state_store::StateStore;
use livedetect_core::rendering::domain::render_sink::RenderSink;
use livedetect_core::rendering::infrastructure::composite_render_sink::CompositeRenderSink;
use livedetect_core::rendering::infrastructure::frame_recorder_sink::FrameRecorderSink;
use livedetect_core::rendering::infrastructure::log_render_sink::LogRenderSink;
use livedetect_core::shared::constants::{CAMERA_PROBE_LIMIT, YOLO_MODEL_NAME};
use livedetect_core::shared::settings::Settings;

/// Minimum spacing between recorded frames.
const RECORD_INTERVAL: Duration = Duration::from_millis(200);

/// Metrics interval used when only --metrics-file is given.
const DEFAULT_METRICS_INTERVAL_SECS: f64 = 1.0;

/// Real-time object detection on a camera, file or stream.
#[derive(Parser)]
#[command(name = "livedetect")]
struct Cli {
    /// JSON settings file. Defaults to the per-user settings file if present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame source: `camera`, `synthetic`, or a video file / stream URL.
    #[arg(long, default_value = "camera")]
    source: String,

    /// Preferred camera index.
    #[arg(long)]
    camera: Option<u32>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    /// ONNX detection model.
    #[arg(long, conflicts_with = "replay")]
    model: Option<PathBuf>,

    /// Replay recorded detections from a JSON file instead of running a model.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Loop the replayed recording every N frames.
    #[arg(long, requires = "replay")]
    replay_period: Option<usize>,

    /// Frames skipped between detections (0 = detect every frame).
    #[arg(long)]
    skip_frames: Option<usize>,

    /// Directory for frames saved while recording (toggle with `v`).
    #[arg(long)]
    record_dir: Option<PathBuf>,

    /// Seconds between metrics reports.
    #[arg(long)]
    metrics_interval: Option<f64>,

    /// Append metrics reports to this file as JSON lines.
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Verbose logging.
    #[arg(long)]
    debug: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(&cli)?;

    let state = Arc::new(StateStore::new(settings.metrics_config()));
    state.set_debug_mode(cli.debug);

    let source = build_source(&cli.source, &settings)?;
    let capture =
        CaptureLoop::new(source, settings.capture_config()).with_state_store(Arc::clone(&state));
    let detector = build_detector(&cli, &settings)?;
    let stabilizer = Box::new(WindowStabilizer::new(settings.stabilizer_config()));
    let sink = build_sink(&cli);

    let mut live_config = settings.live_config();
    live_config.max_frames = cli.max_frames;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))?;
    }

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    spawn_key_reader(command_tx);
    log::info!("Controls (then Enter): space=pause  r=reset  p=performance  v=record  q=quit");

    let mut reporter = start_reporter(&cli, &state)?;
    let mut use_case = LiveDetectionUseCase::new(
        capture,
        detector,
        stabilizer,
        sink,
        Arc::clone(&state),
        Box::new(StdoutPipelineLogger::default()),
        live_config,
    )
    .with_commands(command_rx);

    let result = use_case.run(&shutdown);
    if let Some(reporter) = reporter.as_mut() {
        reporter.stop();
    }
    result?;

    let summary = state.summary();
    log::info!(
        "Finished in state {} after {:.1}s: {} frames, {} detections, {} dropped",
        summary.state,
        summary.uptime_secs,
        summary.metrics.frame_count,
        summary.metrics.total_detections,
        summary.metrics.dropped_frames
    );
    Ok(())
}

/// File settings (explicit, else the per-user file if it exists), with
/// command-line overrides applied and the result validated.
fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let path = cli
        .config
        .clone()
        .or_else(|| Settings::default_path().filter(|p| p.exists()));
    let mut settings = match path {
        Some(path) => {
            log::info!("Loading settings from {}", path.display());
            Settings::load(&path)?
        }
        None => Settings::default(),
    };

    if let Some(index) = cli.camera {
        settings.camera.index = index;
    }
    if let Some(width) = cli.width {
        settings.camera.width = width;
    }
    if let Some(height) = cli.height {
        settings.camera.height = height;
    }
    if let Some(fps) = cli.fps {
        settings.camera.fps = fps;
    }
    if let Some(skip) = cli.skip_frames {
        settings.skip_frames = skip;
    }
    if let Some(model) = &cli.model {
        settings.model.path = Some(model.clone());
    }

    settings.validate()?;
    Ok(settings)
}

fn build_source(
    source: &str,
    settings: &Settings,
) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    let config = settings.source_config();
    let source: Box<dyn FrameSource> = match source {
        "camera" => {
            let (index, source) = source_probe::open_first_available(
                &FfmpegCameraOpener,
                settings.camera.index,
                0..CAMERA_PROBE_LIMIT,
                &config,
            )?;
            log::info!("Using camera {index}");
            source
        }
        "synthetic" => {
            let mut source = SyntheticFrameSource::new();
            source.configure(&config)?;
            Box::new(source)
        }
        location => {
            let mut source = FfmpegFrameSource::new(location);
            source.configure(&config)?;
            Box::new(source)
        }
    };
    Ok(source)
}

fn build_detector(
    cli: &Cli,
    settings: &Settings,
) -> Result<Box<dyn ObjectDetector>, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.replay {
        log::info!("Replaying detections from {}", path.display());
        let mut detector = ReplayDetector::from_json_file(path)?;
        if let Some(period) = cli.replay_period {
            detector = detector.looping(period);
        }
        return Ok(Box::new(detector));
    }

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let bundled_dir = bundled_models_dir();
    let location = ModelLocation {
        explicit: settings.model.path.as_deref(),
        name: YOLO_MODEL_NAME,
        bundled_dir: bundled_dir.as_deref(),
        url: settings.model.url.as_deref(),
    };
    let model_path = model_resolver::resolve(&location, Some(Box::new(download_progress)))?;

    let mut detector = OnnxYoloDetector::new(&model_path, settings.yolo_config())?;
    detector.warm_up(settings.camera.width, settings.camera.height)?;
    Ok(Box::new(detector))
}

/// `models/` next to the executable.
fn bundled_models_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("models")))
}

fn build_sink(cli: &Cli) -> Box<dyn RenderSink> {
    let mut sinks: Vec<Box<dyn RenderSink>> = vec![Box::new(LogRenderSink::default())];
    if let Some(dir) = &cli.record_dir {
        log::info!("Recording to {} when toggled on", dir.display());
        sinks.push(Box::new(FrameRecorderSink::new(dir, RECORD_INTERVAL)));
    }
    Box::new(CompositeRenderSink::new(sinks))
}

fn start_reporter(
    cli: &Cli,
    state: &Arc<StateStore>,
) -> Result<Option<MetricsReporter>, Box<dyn std::error::Error>> {
    let interval = cli.metrics_interval.or(cli
        .metrics_file
        .as_ref()
        .map(|_| DEFAULT_METRICS_INTERVAL_SECS));
    let Some(secs) = interval else {
        return Ok(None);
    };
    if !(secs.is_finite() && secs > 0.0) {
        return Err(format!("Metrics interval must be positive, got {secs}").into());
    }

    let sink: Box<dyn MetricsSink> = match &cli.metrics_file {
        Some(path) => Box::new(JsonLinesMetricsSink::create(path)?),
        None => Box::new(LogMetricsSink),
    };
    let reporter = MetricsReporter::start(
        Arc::clone(state),
        sink,
        Duration::from_secs_f64(secs),
        Some(SystemMonitor::new()),
    )?;
    Ok(Some(reporter))
}

/// Reads one key per stdin line and forwards the matching command. The
/// thread ends at EOF or once the pipeline drops the receiver.
fn spawn_key_reader(commands: Sender<ControlCommand>) {
    let spawned = std::thread::Builder::new()
        .name("input".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match ControlCommand::from_key(&line) {
                    Some(command) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    None if !line.trim().is_empty() => log::info!("Unknown key '{line}'"),
                    None => {}
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("Keyboard controls unavailable: {e}");
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading detection model... {pct}%");
    } else {
        eprint!("\rDownloading detection model... {downloaded} bytes");
    }
}
