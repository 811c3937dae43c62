// Layered configuration: defaults -> TOML file -> KCLUSTER__* env -> CLI flags

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use kcluster_core::application::supervisor::constants::{
    PROBE_TIMEOUT, STOP_POLL_INTERVAL, STOP_WAIT_BUDGET,
};
use kcluster_core::application::{SupervisorSettings, DEFAULT_TOPICS_TOOL};
use kcluster_core::domain::{
    ClassificationRules, CommandSpec, HealthEndpoint, ServiceDescriptor, KAFKA, ZOOKEEPER,
};

pub const DEFAULT_CONFIG_PATH: &str = "~/.kcluster/config.toml";
pub const DEFAULT_STATE_DB: &str = "~/.kcluster/state.db";
pub const DEFAULT_ZK_SERVER: &str = "localhost:2181";
pub const DEFAULT_KF_SERVER: &str = "localhost:9092";

/// Where configuration comes from, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// Explicit file; must exist when set
    pub path: Option<PathBuf>,
    pub zk_server: Option<String>,
    pub kf_server: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub state_db: String,
    pub topics_tool: String,
    pub supervisor: SupervisorConfig,
    pub zookeeper: ServiceConfig,
    pub kafka: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    pub stop_poll_interval_ms: u64,
    pub stop_budget_secs: u64,
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// `host:port` probed for readiness
    pub endpoint: String,
    pub start_command: Vec<String>,
    pub stop_command: Vec<String>,
    pub startup_grace_ms: Option<u64>,
    pub readiness_timeout_secs: Option<u64>,
    #[serde(default)]
    pub rules: ClassificationRules,
}

impl Settings {
    /// Build settings from every layer
    pub fn load(source: &ConfigSource) -> Result<Self> {
        let builder = with_defaults(Config::builder())?;

        let (path, required) = match &source.path {
            Some(path) => (path.clone(), true),
            None => (PathBuf::from(shellexpand::tilde(DEFAULT_CONFIG_PATH).into_owned()), false),
        };

        let settings: Settings = builder
            .add_source(File::from(path.clone()).format(FileFormat::Toml).required(required))
            .add_source(Environment::with_prefix("KCLUSTER").separator("__"))
            .set_override_option("zookeeper.endpoint", source.zk_server.clone())?
            .set_override_option("kafka.endpoint", source.kf_server.clone())?
            .build()
            .with_context(|| format!("Failed to load configuration ({})", path.display()))?
            .try_deserialize()
            .context("Invalid configuration")?;

        // Fail early on bad endpoints and commands
        settings.descriptors()?;
        Ok(settings)
    }

    pub fn state_db_path(&self) -> String {
        shellexpand::tilde(&self.state_db).into_owned()
    }

    pub fn zookeeper_endpoint(&self) -> Result<HealthEndpoint> {
        parse_endpoint(ZOOKEEPER, &self.zookeeper.endpoint)
    }

    pub fn descriptors(&self) -> Result<Vec<ServiceDescriptor>> {
        Ok(vec![
            self.zookeeper.descriptor(ZOOKEEPER)?,
            self.kafka.descriptor(KAFKA)?,
        ])
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            stop_poll_interval: Duration::from_millis(self.supervisor.stop_poll_interval_ms),
            stop_budget: Duration::from_secs(self.supervisor.stop_budget_secs),
            probe_timeout: Duration::from_millis(self.supervisor.probe_timeout_ms),
        }
    }
}

impl ServiceConfig {
    fn descriptor(&self, name: &str) -> Result<ServiceDescriptor> {
        let start = CommandSpec::from_argv(self.start_command.iter().cloned())
            .with_context(|| format!("{}.start_command", name))?;
        let stop = CommandSpec::from_argv(self.stop_command.iter().cloned())
            .with_context(|| format!("{}.stop_command", name))?;

        let mut descriptor =
            ServiceDescriptor::new(name, start, stop, parse_endpoint(name, &self.endpoint)?)
                .with_rules(self.rules.clone());
        if let Some(ms) = self.startup_grace_ms.filter(|ms| *ms > 0) {
            descriptor = descriptor.with_startup_grace(Duration::from_millis(ms));
        }
        if let Some(secs) = self.readiness_timeout_secs.filter(|secs| *secs > 0) {
            descriptor = descriptor.with_readiness_timeout(Duration::from_secs(secs));
        }
        Ok(descriptor)
    }
}

fn parse_endpoint(name: &str, raw: &str) -> Result<HealthEndpoint> {
    raw.parse()
        .with_context(|| format!("{}.endpoint must be host:port", name))
}

/// Stock descriptors double as the built-in defaults
fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    let zk = ServiceDescriptor::zookeeper(HealthEndpoint::new("localhost", 2181));
    let kf = ServiceDescriptor::kafka(HealthEndpoint::new("localhost", 9092));
    let kf_grace_ms = kf.startup_grace.map(|g| g.as_millis() as i64).unwrap_or(0);

    Ok(builder
        .set_default("state_db", DEFAULT_STATE_DB)?
        .set_default("topics_tool", DEFAULT_TOPICS_TOOL)?
        .set_default(
            "supervisor.stop_poll_interval_ms",
            STOP_POLL_INTERVAL.as_millis() as i64,
        )?
        .set_default("supervisor.stop_budget_secs", STOP_WAIT_BUDGET.as_secs() as i64)?
        .set_default("supervisor.probe_timeout_ms", PROBE_TIMEOUT.as_millis() as i64)?
        .set_default("zookeeper.endpoint", DEFAULT_ZK_SERVER)?
        .set_default("zookeeper.start_command", zk.start_command.argv())?
        .set_default("zookeeper.stop_command", zk.stop_command.argv())?
        .set_default("kafka.endpoint", DEFAULT_KF_SERVER)?
        .set_default("kafka.start_command", kf.start_command.argv())?
        .set_default("kafka.stop_command", kf.stop_command.argv())?
        .set_default("kafka.startup_grace_ms", kf_grace_ms)?)
}
