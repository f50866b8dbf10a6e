use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

use crate::pipeline::state_store::{StateStore, StateSummary};

use super::system_monitor::SystemMonitor;

const STOP_WAIT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum MetricsSinkError {
    #[error("metrics I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination for periodic state summaries.
pub trait MetricsSink: Send {
    fn publish(&mut self, summary: &StateSummary) -> Result<(), MetricsSinkError>;
}

/// Writes each summary as one `info` line.
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn publish(&mut self, summary: &StateSummary) -> Result<(), MetricsSinkError> {
        let m = &summary.metrics;
        log::info!(
            "[{}] fps {:.1}, detect {:.1}ms, frames {}, detections {}, dropped {}, mem {:.0}MB, cpu {:.0}%",
            summary.state,
            m.fps,
            summary.avg_detection_time_ms,
            m.frame_count,
            m.total_detections,
            m.dropped_frames,
            m.memory_usage_mb,
            m.cpu_usage_percent
        );
        Ok(())
    }
}

/// Appends each summary to a file as one JSON object per line.
pub struct JsonLinesMetricsSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesMetricsSink {
    pub fn create(path: &Path) -> Result<Self, MetricsSinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonLinesMetricsSink {
    fn publish(&mut self, summary: &StateSummary) -> Result<(), MetricsSinkError> {
        serde_json::to_writer(&mut self.writer, summary)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Background thread that publishes [`StateStore::summary`] at a fixed
/// interval, optionally refreshing process memory/CPU first.
///
/// The summary is a value copy, so no store lock is held while the sink
/// does I/O. Sink failures are logged and the next tick proceeds.
pub struct MetricsReporter {
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    published: Arc<AtomicU64>,
}

impl MetricsReporter {
    pub fn start(
        state: Arc<StateStore>,
        mut sink: Box<dyn MetricsSink>,
        interval: Duration,
        mut monitor: Option<SystemMonitor>,
    ) -> Result<Self, std::io::Error> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let published = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&published);

        let handle = std::thread::Builder::new()
            .name("metrics".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if let Some((memory_mb, cpu)) = monitor.as_mut().and_then(|m| m.sample()) {
                        state.update_system_metrics(memory_mb, cpu);
                    }
                    let summary = state.summary();
                    match sink.publish(&summary) {
                        Ok(()) => {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => log::warn!("Metrics export failed: {e}"),
                    }
                }
                let _ = done_tx.send(());
            })?;

        log::debug!("Metrics reporter started, every {interval:?}");
        Ok(Self {
            stop_tx: Some(stop_tx),
            done_rx,
            handle: Some(handle),
            published,
        })
    }

    /// Summaries successfully handed to the sink.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Asks the thread to exit and waits a bounded time for it.
    pub fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        let _ = stop_tx.send(());
        match self.done_rx.recv_timeout(STOP_WAIT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        log::error!("Metrics reporter panicked");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Metrics reporter did not stop within {STOP_WAIT:?}; detaching it");
            }
        }
    }
}

impl Drop for MetricsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::thread;

    use super::*;

    struct CollectingSink {
        summaries: Arc<Mutex<Vec<StateSummary>>>,
    }

    impl MetricsSink for CollectingSink {
        fn publish(&mut self, summary: &StateSummary) -> Result<(), MetricsSinkError> {
            self.summaries.lock().unwrap().push(summary.clone());
            Ok(())
        }
    }

    struct BrokenSink {
        attempts: Arc<AtomicU64>,
    }

    impl MetricsSink for BrokenSink {
        fn publish(&mut self, _summary: &StateSummary) -> Result<(), MetricsSinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[test]
    fn test_publishes_until_stopped() {
        let state = Arc::new(StateStore::default());
        state.increment_detections(4);
        let summaries = Arc::new(Mutex::new(Vec::new()));
        let sink = CollectingSink {
            summaries: Arc::clone(&summaries),
        };

        let mut reporter =
            MetricsReporter::start(state, Box::new(sink), Duration::from_millis(10), None).unwrap();
        thread::sleep(Duration::from_millis(120));
        reporter.stop();

        let count = summaries.lock().unwrap().len();
        assert!(count >= 1);
        assert_eq!(reporter.published(), count as u64);
        assert_eq!(summaries.lock().unwrap()[0].metrics.total_detections, 4);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(summaries.lock().unwrap().len(), count);
    }

    #[test]
    fn test_sink_failure_does_not_stop_loop() {
        let attempts = Arc::new(AtomicU64::new(0));
        let sink = BrokenSink {
            attempts: Arc::clone(&attempts),
        };
        let mut reporter = MetricsReporter::start(
            Arc::new(StateStore::default()),
            Box::new(sink),
            Duration::from_millis(10),
            None,
        )
        .unwrap();
        thread::sleep(Duration::from_millis(120));
        reporter.stop();

        assert!(attempts.load(Ordering::SeqCst) >= 2);
        assert_eq!(reporter.published(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut reporter = MetricsReporter::start(
            Arc::new(StateStore::default()),
            Box::new(LogMetricsSink),
            Duration::from_secs(60),
            None,
        )
        .unwrap();
        reporter.stop();
        reporter.stop();
        assert_eq!(reporter.published(), 0);
    }

    #[test]
    fn test_json_lines_sink_appends_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("run.jsonl");
        let state = StateStore::default();
        state.start();

        let mut sink = JsonLinesMetricsSink::create(&path).unwrap();
        sink.publish(&state.summary()).unwrap();
        state.increment_detections(2);
        sink.publish(&state.summary()).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["state"], "running");
        assert_eq!(lines[1]["metrics"]["total_detections"], 2);
    }
}
