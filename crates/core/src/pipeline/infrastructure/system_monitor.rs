use sysinfo::{Pid, System};

/// Samples this process's resident memory and CPU usage.
pub struct SystemMonitor {
    system: System,
    pid: Option<Pid>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("Process metrics unavailable: {e}");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    /// Returns `(memory_mb, cpu_percent)`, or `None` if the process cannot
    /// be inspected. CPU usage is relative to the previous sample, so the
    /// first reading is 0.
    pub fn sample(&mut self) -> Option<(f64, f64)> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        let process = self.system.process(pid)?;
        let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
        Some((memory_mb, process.cpu_usage() as f64))
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}
