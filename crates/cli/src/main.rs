//! kcluster - operator console for a local ZooKeeper/Kafka pair

mod app;
mod config;
mod console;
mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use kcluster_core::domain::{TopicSpec, KAFKA, ZOOKEEPER};

use crate::app::App;
use crate::config::{ConfigSource, Settings};

#[derive(Parser)]
#[command(name = "kcluster")]
#[command(about = "Start, stop and inspect a local ZooKeeper/Kafka pair", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ~/.kcluster/config.toml if present)
    #[arg(long, env = "KCLUSTER_CONFIG")]
    config: Option<PathBuf>,

    /// Zookeeper server address (host:port)
    #[arg(long = "zk-server", visible_alias = "zkServer")]
    zk_server: Option<String>,

    /// Kafka server address (host:port)
    #[arg(long = "kf-server", visible_alias = "kfServer")]
    kf_server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status
    Status,

    /// Start a service and wait until it is ready
    Start {
        #[arg(value_enum)]
        service: Service,
    },

    /// Stop a service through its stop script
    Stop {
        #[arg(value_enum)]
        service: Service,
    },

    /// Topic tools
    Topic {
        #[command(subcommand)]
        action: TopicCommand,
    },

    /// Interactive menu (default)
    Console,
}

#[derive(Subcommand)]
enum TopicCommand {
    /// Create a topic
    Create {
        name: String,

        #[arg(short, long, default_value_t = 3)]
        partitions: u32,

        #[arg(short, long, default_value_t = 1)]
        replication_factor: u32,
    },

    /// Delete a topic
    Delete { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Service {
    Zookeeper,
    Kafka,
}

impl Service {
    fn name(self) -> &'static str {
        match self {
            Service::Zookeeper => ZOOKEEPER,
            Service::Kafka => KAFKA,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Logging
    logging::init()?;
    info!("kcluster v{} starting...", kcluster_core::VERSION);

    // 2. Configuration
    let settings = Settings::load(&ConfigSource {
        path: cli.config.clone(),
        zk_server: cli.zk_server.clone(),
        kf_server: cli.kf_server.clone(),
    })?;

    // 3. Wiring + recovery
    let app = App::build(&settings).await?;
    app.sync().await?;

    // 4. Command
    let result = run(&app, cli.command.unwrap_or(Commands::Console)).await;

    // 5. Teardown notice: services are left running on purpose
    output::print_teardown(&app.teardown());
    println!("\nExiting...");

    result
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Status => {
            output::print_status(&app.supervisor, app.inspector.as_ref());
        }

        Commands::Start { service } => {
            let result = app.start_interruptible(service.name()).await;
            output::print_start(service.name(), &result);
            result.with_context(|| format!("Failed to start {}", service.name()))?;
        }

        Commands::Stop { service } => {
            let result = app.supervisor.stop(service.name()).await;
            output::print_stop(service.name(), &result);
            result.with_context(|| format!("Failed to stop {}", service.name()))?;
        }

        Commands::Topic { action } => {
            let tool_output = match action {
                TopicCommand::Create {
                    name,
                    partitions,
                    replication_factor,
                } => {
                    let topic = TopicSpec::new(name, partitions, replication_factor)?;
                    app.topics.create(&topic).await?
                }
                TopicCommand::Delete { name } => app.topics.delete(&name).await?,
            };
            output::print_command_output(&tool_output);
            if !tool_output.success() {
                anyhow::bail!("Topic tool reported a failure");
            }
        }

        Commands::Console => console::run(app).await?,
    }

    Ok(())
}
