// Supervisor constants (No magic values)
use std::time::Duration;

/// Interval between port probes while waiting for a stop (1s)
pub const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Total wait for the endpoint to close after the stop command (30s)
pub const STOP_WAIT_BUDGET: Duration = Duration::from_secs(30);

/// Per-attempt connect timeout, kept well below the poll interval (500ms)
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
