// Topic Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::service::{CommandSpec, HealthEndpoint};

/// Validated topic creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: u32,
    pub replication_factor: u32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: u32, replication_factor: u32) -> Result<Self> {
        let name = name.into();
        validate_topic_name(&name)?;

        if partitions == 0 {
            return Err(DomainError::InvalidTopic(
                "partitions must be at least 1".to_string(),
            ));
        }
        if replication_factor == 0 {
            return Err(DomainError::InvalidTopic(
                "replication factor must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            name,
            partitions,
            replication_factor,
        })
    }

    /// `<tool> --zookeeper <zk> --topic <name> --create --partitions <n> --replication-factor <r>`
    pub fn create_command(&self, tool: &str, zookeeper: &HealthEndpoint) -> CommandSpec {
        CommandSpec::new(
            tool,
            [
                "--zookeeper".to_string(),
                zookeeper.to_string(),
                "--topic".to_string(),
                self.name.clone(),
                "--create".to_string(),
                "--partitions".to_string(),
                self.partitions.to_string(),
                "--replication-factor".to_string(),
                self.replication_factor.to_string(),
            ],
        )
    }
}

/// `<tool> --zookeeper <zk> --delete --topic <name>`
pub fn delete_command(tool: &str, zookeeper: &HealthEndpoint, name: &str) -> Result<CommandSpec> {
    validate_topic_name(name)?;
    Ok(CommandSpec::new(
        tool,
        [
            "--zookeeper".to_string(),
            zookeeper.to_string(),
            "--delete".to_string(),
            "--topic".to_string(),
            name.to_string(),
        ],
    ))
}

/// Legal topic names: `[A-Za-z0-9._-]{1,249}`
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 249 {
        return Err(DomainError::InvalidTopic(format!(
            "topic name length must be 1..=249, got {}",
            name.len()
        )));
    }
    if name == "." || name == ".." {
        return Err(DomainError::InvalidTopic(format!("'{}' is reserved", name)));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(DomainError::InvalidTopic(format!(
            "illegal character '{}' in '{}'",
            bad, name
        )));
    }
    Ok(())
}
