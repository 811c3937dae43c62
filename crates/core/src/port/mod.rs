// Port Layer - Interfaces for external dependencies

pub mod port_probe;
pub mod process_inspector;
pub mod process_launcher;
pub mod process_store;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use port_probe::PortProbe;
pub use process_inspector::{ProcessInspector, ProcessStats};
pub use process_launcher::{
    CommandOutput, OutputLine, ProcessError, ProcessLauncher, ProcessRecord, SpawnError,
};
pub use process_store::{PersistedProcess, ProcessStore};
pub use time_provider::TimeProvider;
