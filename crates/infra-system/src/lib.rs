// kcluster Infrastructure - System Adapters
// Implements: ProcessLauncher, PortProbe, ProcessInspector

pub mod port_probe_impl;
pub mod process_inspector_impl;
pub mod subprocess_launcher;

pub use port_probe_impl::TcpPortProbe;
pub use process_inspector_impl::SysinfoProcessInspector;
pub use subprocess_launcher::{SubprocessLauncher, SubprocessRecord};
