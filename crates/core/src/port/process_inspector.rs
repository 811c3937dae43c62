// Process inspection port (status display, recovery)

use crate::domain::ProcessId;

/// Resource snapshot of a running process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStats {
    pub name: String,
    pub memory_mb: u64,
    pub cpu_usage_percent: f32,
    pub run_time_secs: u64,
}

/// Looks up OS processes by pid
pub trait ProcessInspector: Send + Sync {
    /// Check if a process is still alive
    fn is_alive(&self, pid: ProcessId) -> bool;

    /// Resource usage of `pid`, or None if it is gone
    fn inspect(&self, pid: ProcessId) -> Option<ProcessStats>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Mock ProcessInspector: a fixed set of live pids
    #[derive(Default)]
    pub struct MockProcessInspector {
        alive: Mutex<HashSet<ProcessId>>,
    }

    impl MockProcessInspector {
        pub fn new(alive: impl IntoIterator<Item = ProcessId>) -> Self {
            Self {
                alive: Mutex::new(alive.into_iter().collect()),
            }
        }

        pub fn kill(&self, pid: ProcessId) {
            self.alive.lock().unwrap().remove(&pid);
        }
    }

    impl ProcessInspector for MockProcessInspector {
        fn is_alive(&self, pid: ProcessId) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn inspect(&self, pid: ProcessId) -> Option<ProcessStats> {
            self.is_alive(pid).then(|| ProcessStats {
                name: format!("mock-{}", pid),
                memory_mb: 256,
                cpu_usage_percent: 1.5,
                run_time_secs: 60,
            })
        }
    }
}
