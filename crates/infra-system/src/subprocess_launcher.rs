// Subprocess launcher
// reason: tokio::process for async output capture, nix for the shared output pipe and process-group signals
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
#[cfg(unix)]
use std::os::fd::OwnedFd;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
#[cfg(unix)]
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kcluster_core::domain::{CommandSpec, ProcessId};
use kcluster_core::port::{
    CommandOutput, OutputLine, ProcessError, ProcessLauncher, ProcessRecord, SpawnError,
    TimeProvider,
};

/// Lines buffered between the pipe readers and the consumer
const LINE_BUFFER: usize = 256;

/// Spawns real OS processes with stdout and stderr merged into one line stream
///
/// Each child becomes the leader of its own process group, so a terminate
/// reaches the wrapper script and the JVM it launched.
pub struct SubprocessLauncher {
    time_provider: Arc<dyn TimeProvider>,
}

impl SubprocessLauncher {
    /// Create a new launcher
    ///
    /// # Example
    /// ```ignore
    /// let launcher = SubprocessLauncher::new(Arc::new(SystemTimeProvider));
    /// ```
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self { time_provider }
    }

    fn spawn_child(&self, spec: &CommandSpec) -> Result<Spawned, SpawnError> {
        if spec.program.trim().is_empty() {
            return Err(SpawnError::EmptyCommand);
        }

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());
        #[cfg(unix)]
        command.process_group(0);

        let rejected = |e: io::Error| SpawnError::Rejected {
            program: spec.program.clone(),
            reason: e.to_string(),
        };

        #[cfg(unix)]
        let combined = combined_output(&mut command).map_err(rejected)?;
        #[cfg(not(unix))]
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        #[cfg_attr(unix, allow(unused_mut))]
        let mut child = command
            .spawn()
            .map_err(|e| map_spawn_error(&spec.program, e))?;
        // Closes the parent's copies of the write end, so EOF means the child is done
        drop(command);

        let pid = child.id().ok_or_else(|| {
            rejected(io::Error::other("process exited before its pid was read"))
        })?;

        // The channel closes once every reader hits EOF
        let (tx, lines) = mpsc::channel(LINE_BUFFER);
        #[cfg(unix)]
        let readers = vec![pump(combined, tx)];
        #[cfg(not(unix))]
        let readers = separate_output(&mut child, tx);

        Ok(Spawned {
            child,
            pid,
            lines,
            readers,
        })
    }
}

/// A started child with its output stream
struct Spawned {
    child: Child,
    pid: ProcessId,
    lines: mpsc::Receiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
}

fn map_spawn_error(program: &str, err: io::Error) -> SpawnError {
    match err.kind() {
        io::ErrorKind::NotFound => SpawnError::NotFound(program.to_string()),
        _ => SpawnError::Rejected {
            program: program.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Point stdout and stderr at the write end of one pipe
///
/// Both streams share a single kernel buffer, so lines are read back in the
/// order the child wrote them.
#[cfg(unix)]
fn combined_output(command: &mut Command) -> io::Result<pipe::Receiver> {
    let (read, write) = cloexec_pipe()?;
    command
        .stdout(Stdio::from(write.try_clone()?))
        .stderr(Stdio::from(write));
    pipe::Receiver::from_owned_fd(read)
}

/// Both ends close-on-exec; the child only keeps the copies dup'd onto fd 1 and 2
#[cfg(target_os = "linux")]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;

    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// Separate pipes; relative order between stdout and stderr is not kept here
#[cfg(not(unix))]
fn separate_output(child: &mut Child, tx: mpsc::Sender<OutputLine>) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(pump(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(pump(stderr, tx));
    }
    readers
}

/// Strip the line terminator (`\n` or `\r\n`)
fn trim_line_end(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

/// Forward one pipe into the line channel until EOF
fn pump<R>(reader: R, tx: mpsc::Sender<OutputLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    trim_line_end(&mut buf);
                    if tx.send(OutputLine::new(std::mem::take(&mut buf))).await.is_err() {
                        // Consumer released the stream
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Output pipe read failed");
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessRecord>, SpawnError> {
        let Spawned {
            child,
            pid,
            lines,
            readers,
        } = self.spawn_child(spec)?;
        let started_at = self.time_provider.now_millis();

        info!(pid = %pid, command = %spec, "Process spawned");

        Ok(Box::new(SubprocessRecord {
            pid,
            started_at,
            lines,
            readers,
            _child: child,
            released: false,
        }))
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, SpawnError> {
        let Spawned {
            mut child,
            pid,
            lines: mut rx,
            ..
        } = self.spawn_child(spec)?;

        info!(pid = %pid, command = %spec, "Running command to completion");

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            debug!(pid = %pid, line = %line.to_lossy(), "Command output");
            lines.push(line.to_lossy());
        }

        let exit_code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(pid = %pid, error = %e, "Failed to collect exit status");
                None
            }
        };

        info!(pid = %pid, exit_code = ?exit_code, lines = lines.len(), "Command finished");
        Ok(CommandOutput { exit_code, lines })
    }
}

/// Live child process with its captured output
///
/// Dropped without `release` (the owner was cancelled mid-start), the record
/// signals the process group before closing the stream.
pub struct SubprocessRecord {
    pid: ProcessId,
    started_at: i64,
    lines: mpsc::Receiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
    // Not killed on drop; tokio reaps it once it exits
    _child: Child,
    released: bool,
}

impl SubprocessRecord {
    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.lines.close();
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        debug!(pid = %self.pid, "Output stream released");
    }
}

#[async_trait]
impl ProcessRecord for SubprocessRecord {
    fn pid(&self) -> ProcessId {
        self.pid
    }

    fn started_at(&self) -> i64 {
        self.started_at
    }

    async fn read_line(&mut self) -> Option<OutputLine> {
        if self.released {
            return None;
        }
        self.lines.recv().await
    }

    fn terminate(&self) -> Result<(), ProcessError> {
        signal_group(self.pid)
    }

    fn release(mut self: Box<Self>) {
        self.close();
    }
}

impl Drop for SubprocessRecord {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = signal_group(self.pid) {
                debug!(pid = %self.pid, error = %e, "Terminate on drop failed");
            }
            self.close();
        }
    }
}

/// SIGTERM the whole process group led by `pid`
#[cfg(unix)]
fn signal_group(pid: ProcessId) -> Result<(), ProcessError> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| ProcessError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;

    info!(pid = %pid, "Sending SIGTERM to process group");
    killpg(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| ProcessError::Signal {
        pid,
        reason: e.to_string(),
    })
}

#[cfg(not(unix))]
fn signal_group(pid: ProcessId) -> Result<(), ProcessError> {
    Err(ProcessError::Signal {
        pid,
        reason: "process groups are not supported on this platform".to_string(),
    })
}
