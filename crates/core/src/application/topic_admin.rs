// Topic administration through the broker's own CLI tool

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::topic::delete_command;
use crate::domain::{HealthEndpoint, TopicSpec};
use crate::error::Result;
use crate::port::{CommandOutput, ProcessLauncher};

/// Default admin tool (Kafka distribution script on PATH)
pub const DEFAULT_TOPICS_TOOL: &str = "kafka-topics.sh";

/// Creates and deletes topics by running the admin tool to completion
pub struct TopicAdmin {
    launcher: Arc<dyn ProcessLauncher>,
    tool: String,
    zookeeper: HealthEndpoint,
}

impl TopicAdmin {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        tool: impl Into<String>,
        zookeeper: HealthEndpoint,
    ) -> Self {
        Self {
            launcher,
            tool: tool.into(),
            zookeeper,
        }
    }

    pub async fn create(&self, topic: &TopicSpec) -> Result<CommandOutput> {
        info!(
            topic = %topic.name,
            partitions = topic.partitions,
            replication_factor = topic.replication_factor,
            "Creating topic"
        );
        let command = topic.create_command(&self.tool, &self.zookeeper);
        self.execute(&topic.name, "create", command).await
    }

    pub async fn delete(&self, name: &str) -> Result<CommandOutput> {
        info!(topic = %name, "Deleting topic");
        let command = delete_command(&self.tool, &self.zookeeper, name)?;
        self.execute(name, "delete", command).await
    }

    async fn execute(
        &self,
        topic: &str,
        action: &str,
        command: crate::domain::CommandSpec,
    ) -> Result<CommandOutput> {
        let output = self.launcher.run(&command).await?;
        if output.success() {
            info!(topic = %topic, action, "Topic command completed");
        } else {
            warn!(topic = %topic, action, exit_code = ?output.exit_code, "Topic command failed");
        }
        Ok(output)
    }
}
