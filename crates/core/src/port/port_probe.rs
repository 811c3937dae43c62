// Port reachability probe
// reason: async-trait needed for dyn dispatch over async fn
use async_trait::async_trait;
use std::time::Duration;

use crate::domain::HealthEndpoint;

/// Answers "is this endpoint accepting connections right now?"
///
/// Implementations must be stateless and cheap: the supervisor calls this
/// once per output line while starting and once per poll tick while stopping.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Attempt a TCP handshake with `endpoint`
    ///
    /// # Returns
    /// true iff the handshake completed within `timeout`. Refusal, timeout and
    /// resolution failure all yield false. The connection is always closed.
    async fn is_open(&self, endpoint: &HealthEndpoint, timeout: Duration) -> bool;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    enum ProbeMode {
        Fixed(bool),
        /// Open once the shared line counter reaches the given line (1-based)
        FromLine(Arc<AtomicUsize>, usize),
    }

    /// Mock PortProbe for testing
    pub struct MockPortProbe {
        mode: Mutex<ProbeMode>,
        calls: AtomicUsize,
    }

    impl MockPortProbe {
        pub fn new(open: bool) -> Self {
            Self {
                mode: Mutex::new(ProbeMode::Fixed(open)),
                calls: AtomicUsize::new(0),
            }
        }

        /// Reports open as soon as `line` output lines have been delivered
        ///
        /// `counter` comes from `MockProcessLauncher::line_counter()`.
        pub fn opens_at_line(counter: Arc<AtomicUsize>, line: usize) -> Self {
            Self {
                mode: Mutex::new(ProbeMode::FromLine(counter, line)),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn set_open(&self, open: bool) {
            *self.mode.lock().unwrap() = ProbeMode::Fixed(open);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PortProbe for MockPortProbe {
        async fn is_open(&self, _endpoint: &HealthEndpoint, _timeout: Duration) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &*self.mode.lock().unwrap() {
                ProbeMode::Fixed(open) => *open,
                ProbeMode::FromLine(counter, line) => counter.load(Ordering::SeqCst) >= *line,
            }
        }
    }
}
