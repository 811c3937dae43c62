// Service Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::{DomainError, Result};

/// Service name (registry key)
pub type ServiceName = String;

/// OS process identifier
pub type ProcessId = u32;

/// Coordination service
pub const ZOOKEEPER: &str = "zookeeper";

/// Broker service
pub const KAFKA: &str = "kafka";

/// Settle time the broker needs before its port means anything
pub const KAFKA_STARTUP_GRACE: Duration = Duration::from_secs(10);

/// Network address probed for reachability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HealthEndpoint {
    pub host: String,
    pub port: u16,
}

impl HealthEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HealthEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HealthEndpoint {
    type Err = DomainError;

    /// Parse `host:port` (the last colon splits, so bracket-less IPv6 is not supported)
    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| DomainError::InvalidEndpoint(s.to_string()))?;

        if host.is_empty() {
            return Err(DomainError::InvalidEndpoint(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| DomainError::InvalidEndpoint(s.to_string()))?;

        Ok(Self::new(host, port))
    }
}

/// External command as an argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a full argv (`argv[0]` is the program)
    pub fn from_argv<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let program = iter
            .next()
            .filter(|p: &String| !p.trim().is_empty())
            .ok_or_else(|| DomainError::InvalidCommand("empty argument vector".to_string()))?;

        Ok(Self {
            program,
            args: iter.collect(),
        })
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Substring rules used to classify service output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationRules {
    pub warn: Vec<String>,
    pub bind_conflict: Vec<String>,
    pub error: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            warn: vec!["WARN".to_string()],
            bind_conflict: vec![
                "BindException".to_string(),
                "Address already in use".to_string(),
            ],
            error: vec!["ERROR".to_string()],
        }
    }
}

/// Immutable description of one supervised service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: ServiceName,
    pub start_command: CommandSpec,
    pub stop_command: CommandSpec,
    pub health_endpoint: HealthEndpoint,
    /// Wait before the first readiness check
    pub startup_grace: Option<Duration>,
    /// Upper bound for the whole readiness scan (grace included)
    pub readiness_timeout: Option<Duration>,
    pub rules: ClassificationRules,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        start_command: CommandSpec,
        stop_command: CommandSpec,
        health_endpoint: HealthEndpoint,
    ) -> Self {
        Self {
            name: name.into(),
            start_command,
            stop_command,
            health_endpoint,
            startup_grace: None,
            readiness_timeout: None,
            rules: ClassificationRules::default(),
        }
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = Some(grace);
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    pub fn with_rules(mut self, rules: ClassificationRules) -> Self {
        self.rules = rules;
        self
    }

    /// Stock ZooKeeper descriptor (scripts from the Kafka distribution on PATH)
    pub fn zookeeper(endpoint: HealthEndpoint) -> Self {
        Self::new(
            ZOOKEEPER,
            CommandSpec::new(
                "nohup",
                ["zookeeper-server-start.sh", "./config/zookeeper.properties"],
            ),
            CommandSpec::new("zookeeper-server-stop.sh", Vec::<String>::new()),
            endpoint,
        )
    }

    /// Stock Kafka broker descriptor
    pub fn kafka(endpoint: HealthEndpoint) -> Self {
        Self::new(
            KAFKA,
            CommandSpec::new(
                "nohup",
                ["kafka-server-start.sh", "./config/server.properties"],
            ),
            CommandSpec::new("kafka-server-stop.sh", Vec::<String>::new()),
            endpoint,
        )
        .with_startup_grace(KAFKA_STARTUP_GRACE)
    }
}
