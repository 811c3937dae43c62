// Process inspector implementation
// reason: sysinfo for per-process stats, nix for cheap liveness checks
use std::sync::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

use kcluster_core::domain::ProcessId;
use kcluster_core::port::{ProcessInspector, ProcessStats};

/// Process inspector using sysinfo
///
/// CPU usage is measured between refreshes, so the first reading for a pid
/// is 0.
pub struct SysinfoProcessInspector {
    system: Mutex<System>,
}

impl SysinfoProcessInspector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SysinfoProcessInspector {
    fn is_alive(&self, pid: ProcessId) -> bool {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid as NixPid;

            // pid 0 would address our own process group
            let Ok(raw) = i32::try_from(pid) else {
                return false;
            };
            if raw <= 0 {
                return false;
            }

            // Null signal: existence check only; EPERM means it exists but isn't ours
            matches!(kill(NixPid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
        }

        #[cfg(not(unix))]
        {
            self.inspect(pid).is_some()
        }
    }

    fn inspect(&self, pid: ProcessId) -> Option<ProcessStats> {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let sys_pid = Pid::from_u32(pid);
        if !system.refresh_process(sys_pid) {
            debug!(pid = %pid, "Process not found");
            return None;
        }

        let process = system.process(sys_pid)?;
        Some(ProcessStats {
            name: process.name().to_string(),
            memory_mb: process.memory() / 1024 / 1024,
            cpu_usage_percent: process.cpu_usage(),
            run_time_secs: process.run_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let inspector = SysinfoProcessInspector::new();
        let pid = std::process::id();

        assert!(inspector.is_alive(pid));

        let stats = inspector.inspect(pid).unwrap();
        assert!(!stats.name.is_empty());
        assert!(stats.cpu_usage_percent >= 0.0);
    }

    #[test]
    fn test_missing_process() {
        let inspector = SysinfoProcessInspector::new();

        assert!(!inspector.is_alive(0));
        // Above the default pid_max on Linux
        assert!(!inspector.is_alive(4_194_304 + 17));
        assert!(inspector.inspect(4_194_304 + 17).is_none());
    }
}
