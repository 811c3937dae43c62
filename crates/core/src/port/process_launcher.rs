// Process Launcher Port
// Abstraction over spawning supervised OS processes and reading their output

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CommandSpec, ProcessId};

/// One line of captured output (stdout and stderr merged), without its terminator
///
/// Kept as raw bytes: services are free to print anything, and decoding is
/// the classifier's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine(Vec<u8>);

impl OutputLine {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The line as text, or None if it is not valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// The line for diagnostics, with invalid sequences replaced
    pub fn to_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for OutputLine {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Result of a command run to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Spawn errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error("empty command")]
    EmptyCommand,

    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("OS rejected spawn of {program}: {reason}")]
    Rejected { program: String, reason: String },
}

/// Errors acting on an already spawned process
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("signal to pid {pid} failed: {reason}")]
    Signal { pid: ProcessId, reason: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Ownership handle for one spawned process
///
/// `release` consumes the record, so the stream is closed at most once.
/// Implementations also release on drop, which covers callers that are
/// cancelled before they reach an explicit release.
#[async_trait]
pub trait ProcessRecord: Send {
    /// OS process identifier
    fn pid(&self) -> ProcessId;

    /// Spawn time (epoch ms)
    fn started_at(&self) -> i64;

    /// Next output line; None once the process closed its output
    async fn read_line(&mut self) -> Option<OutputLine>;

    /// Best-effort graceful termination signal; does not wait for exit
    fn terminate(&self) -> Result<(), ProcessError>;

    /// Close the captured output stream
    fn release(self: Box<Self>);
}

/// Launcher trait
///
/// Implementations:
/// - SubprocessLauncher: real OS processes (infra-system)
/// - MockProcessLauncher: scripted output for tests
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `command` in its own process group with merged stdout/stderr
    ///
    /// # Errors
    /// - SpawnError::EmptyCommand if the program is blank
    /// - SpawnError::NotFound if the executable cannot be found
    /// - SpawnError::Rejected if the OS refuses fork/exec
    fn spawn(&self, command: &CommandSpec) -> Result<Box<dyn ProcessRecord>, SpawnError>;

    /// Run `command` to completion, collecting its output
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, SpawnError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted behavior for one spawn of a program
    #[derive(Debug, Clone)]
    pub enum MockScript {
        /// Emit the lines, then end of stream
        Lines(Vec<String>),
        /// Emit the lines, then never produce anything again
        LinesThenHang(Vec<String>),
        /// Spawn fails
        FailSpawn(SpawnError),
    }

    impl MockScript {
        pub fn lines(lines: &[&str]) -> Self {
            MockScript::Lines(lines.iter().map(|s| s.to_string()).collect())
        }

        pub fn hang(lines: &[&str]) -> Self {
            MockScript::LinesThenHang(lines.iter().map(|s| s.to_string()).collect())
        }
    }

    #[derive(Default)]
    struct Shared {
        lines_delivered: Arc<AtomicUsize>,
        released: AtomicUsize,
        terminated: Mutex<Vec<ProcessId>>,
    }

    /// Mock launcher handing out scripted records with increasing pids
    pub struct MockProcessLauncher {
        scripts: Mutex<HashMap<String, VecDeque<MockScript>>>,
        spawned: Mutex<Vec<CommandSpec>>,
        next_pid: AtomicU32,
        shared: Arc<Shared>,
    }

    impl MockProcessLauncher {
        pub fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                spawned: Mutex::new(Vec::new()),
                next_pid: AtomicU32::new(1000),
                shared: Arc::new(Shared::default()),
            }
        }

        /// Queue a script for the next spawn of `program`
        ///
        /// Programs without a queued script exit immediately with no output.
        pub fn script(&self, program: &str, script: MockScript) {
            self.scripts
                .lock()
                .unwrap()
                .entry(program.to_string())
                .or_default()
                .push_back(script);
        }

        /// Counter of lines delivered through `read_line`, across all records
        pub fn line_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.shared.lines_delivered)
        }

        /// Every command passed to `spawn` or `run`, in order
        pub fn spawned(&self) -> Vec<CommandSpec> {
            self.spawned.lock().unwrap().clone()
        }

        pub fn spawn_count(&self, program: &str) -> usize {
            self.spawned
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        pub fn released_count(&self) -> usize {
            self.shared.released.load(Ordering::SeqCst)
        }

        pub fn terminated(&self) -> Vec<ProcessId> {
            self.shared.terminated.lock().unwrap().clone()
        }

        fn next_script(&self, command: &CommandSpec) -> MockScript {
            self.spawned.lock().unwrap().push(command.clone());
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&command.program)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(MockScript::Lines(Vec::new()))
        }
    }

    impl Default for MockProcessLauncher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProcessLauncher for MockProcessLauncher {
        fn spawn(&self, command: &CommandSpec) -> Result<Box<dyn ProcessRecord>, SpawnError> {
            let (lines, hang) = match self.next_script(command) {
                MockScript::Lines(lines) => (lines, false),
                MockScript::LinesThenHang(lines) => (lines, true),
                MockScript::FailSpawn(err) => return Err(err),
            };

            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockProcessRecord {
                pid,
                started_at: pid as i64 * 1000,
                lines: lines.iter().map(|l| OutputLine::from(l.as_str())).collect(),
                hang,
                released: false,
                shared: Arc::clone(&self.shared),
            }))
        }

        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, SpawnError> {
            match self.next_script(command) {
                MockScript::Lines(lines) | MockScript::LinesThenHang(lines) => Ok(CommandOutput {
                    exit_code: Some(0),
                    lines,
                }),
                MockScript::FailSpawn(err) => Err(err),
            }
        }
    }

    /// Scripted process record
    pub struct MockProcessRecord {
        pid: ProcessId,
        started_at: i64,
        lines: VecDeque<OutputLine>,
        hang: bool,
        released: bool,
        shared: Arc<Shared>,
    }

    impl MockProcessRecord {
        fn close(&mut self) {
            if !self.released {
                self.released = true;
                self.shared.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl ProcessRecord for MockProcessRecord {
        fn pid(&self) -> ProcessId {
            self.pid
        }

        fn started_at(&self) -> i64 {
            self.started_at
        }

        async fn read_line(&mut self) -> Option<OutputLine> {
            if let Some(line) = self.lines.pop_front() {
                self.shared.lines_delivered.fetch_add(1, Ordering::SeqCst);
                return Some(line);
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            None
        }

        fn terminate(&self) -> Result<(), ProcessError> {
            self.shared.terminated.lock().unwrap().push(self.pid);
            Ok(())
        }

        fn release(mut self: Box<Self>) {
            self.close();
        }
    }

    impl Drop for MockProcessRecord {
        fn drop(&mut self) {
            self.close();
        }
    }
}
