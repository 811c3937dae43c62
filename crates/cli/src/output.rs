// Console rendering

use colored::{ColoredString, Colorize};
use tabled::{Table, Tabled};

use kcluster_core::application::{
    ServiceSupervisor, StartOutcome, StopOutcome, SupervisorError,
};
use kcluster_core::domain::{LifecycleState, ServiceStatus};
use kcluster_core::port::{CommandOutput, ProcessInspector};

#[derive(Debug, Tabled)]
pub struct StatusRow {
    #[tabled(rename = "SERVICE")]
    pub service: String,
    #[tabled(rename = "STATE")]
    pub state: String,
    #[tabled(rename = "ENDPOINT")]
    pub endpoint: String,
    #[tabled(rename = "PID")]
    pub pid: String,
    #[tabled(rename = "MEMORY")]
    pub memory: String,
    #[tabled(rename = "CPU")]
    pub cpu: String,
    #[tabled(rename = "UPTIME")]
    pub uptime: String,
}

const NONE: &str = "-";

pub fn status_rows(
    supervisor: &ServiceSupervisor,
    inspector: &dyn ProcessInspector,
) -> Vec<StatusRow> {
    supervisor
        .registry()
        .snapshot()
        .into_iter()
        .map(|(service, status)| {
            let endpoint = supervisor
                .descriptor(&service)
                .map(|d| d.health_endpoint.to_string())
                .unwrap_or_else(|| NONE.to_string());
            row(service, endpoint, &status, inspector)
        })
        .collect()
}

fn row(
    service: String,
    endpoint: String,
    status: &ServiceStatus,
    inspector: &dyn ProcessInspector,
) -> StatusRow {
    let stats = status.pid.and_then(|pid| inspector.inspect(pid));
    StatusRow {
        service,
        state: status.state.to_string(),
        endpoint,
        pid: status
            .pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| NONE.to_string()),
        memory: stats
            .as_ref()
            .map(|s| format!("{} MB", s.memory_mb))
            .unwrap_or_else(|| NONE.to_string()),
        cpu: stats
            .as_ref()
            .map(|s| format!("{:.1}%", s.cpu_usage_percent))
            .unwrap_or_else(|| NONE.to_string()),
        uptime: stats
            .as_ref()
            .map(|s| format_uptime(s.run_time_secs))
            .unwrap_or_else(|| NONE.to_string()),
    }
}

pub fn format_uptime(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

pub fn colored_state(state: LifecycleState) -> ColoredString {
    let label = state.to_string();
    match state {
        LifecycleState::Ready => label.green().bold(),
        LifecycleState::Failed => label.red().bold(),
        LifecycleState::Starting | LifecycleState::Stopping => label.yellow(),
        LifecycleState::Stopped => label.dimmed(),
    }
}

pub fn print_status(supervisor: &ServiceSupervisor, inspector: &dyn ProcessInspector) {
    println!("{}", "Service Status".cyan().bold());
    println!();
    for (service, status) in supervisor.registry().snapshot() {
        let connected = if status.state == LifecycleState::Ready {
            "connected".green()
        } else {
            "not connected".red()
        };
        println!(
            "  >>> {} is {} ({})",
            service.bold(),
            connected,
            colored_state(status.state)
        );
    }
    println!();
    println!("{}", Table::new(status_rows(supervisor, inspector)));
}

pub fn print_start(service: &str, result: &Result<StartOutcome, SupervisorError>) {
    match result {
        Ok(StartOutcome::Ready { pid }) => println!(
            "{}",
            format!("✓ {} is ready (pid {})", service, pid).green().bold()
        ),
        Ok(StartOutcome::AlreadyReady) => {
            println!("{}", format!("○ {} is already running", service).yellow())
        }
        Err(e) => println!("{} {}", "✗".red().bold(), e),
    }
}

pub fn print_stop(service: &str, result: &Result<StopOutcome, SupervisorError>) {
    match result {
        Ok(StopOutcome::Stopped) => {
            println!("{}", format!("✓ {} stopped", service).green().bold())
        }
        Ok(StopOutcome::NotRunning) => {
            println!("{}", format!("○ {} is not running", service).yellow())
        }
        Err(e @ SupervisorError::StopTimeout { .. }) => {
            println!("{} {}", "!".yellow().bold(), e)
        }
        Err(e) => println!("{} {}", "✗".red().bold(), e),
    }
}

pub fn print_command_output(output: &CommandOutput) {
    for line in &output.lines {
        println!("{}", line);
    }
    if output.success() {
        println!("{}", "✓ Done".green().bold());
    } else {
        let code = output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        println!("{}", format!("✗ Tool exited with {}", code).red().bold());
    }
}

pub fn print_teardown(running: &[String]) {
    for service in running {
        println!(
            "{}",
            format!(
                "It seems {} server is running, you can stop it from your terminal.",
                service
            )
            .yellow()
        );
    }
}
