// Composition root: wires adapters into the supervision core

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use kcluster_core::application::{
    cancel_channel, RecoveryService, ServiceSupervisor, StartOutcome, SupervisorError, TopicAdmin,
};
use kcluster_core::port::time_provider::SystemTimeProvider;
use kcluster_core::port::{ProcessInspector, ProcessLauncher, ProcessStore, TimeProvider};
use kcluster_infra_sqlite::{create_pool, run_migrations, SqliteProcessStore};
use kcluster_infra_system::{SubprocessLauncher, SysinfoProcessInspector, TcpPortProbe};

use crate::config::Settings;

pub struct App {
    pub supervisor: Arc<ServiceSupervisor>,
    pub topics: TopicAdmin,
    pub inspector: Arc<dyn ProcessInspector>,
    recovery: RecoveryService,
}

impl App {
    pub async fn build(settings: &Settings) -> Result<Self> {
        // 1. State database
        let db_path = settings.state_db_path();
        if let Some(parent) = Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        info!(db_path = %db_path, "Opening state database");

        let pool = create_pool(&format!("sqlite://{}", db_path))
            .await
            .context("DB pool creation failed")?;
        run_migrations(&pool).await.context("Migration failed")?;

        // 2. Adapters
        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let store: Arc<dyn ProcessStore> =
            Arc::new(SqliteProcessStore::new(pool, time_provider.clone()));
        let launcher: Arc<dyn ProcessLauncher> =
            Arc::new(SubprocessLauncher::new(time_provider.clone()));
        let inspector: Arc<dyn ProcessInspector> = Arc::new(SysinfoProcessInspector::new());

        // 3. Core services
        let supervisor = Arc::new(ServiceSupervisor::new(
            settings.descriptors()?,
            launcher.clone(),
            Arc::new(TcpPortProbe),
            store.clone(),
            time_provider,
            settings.supervisor_settings(),
        ));
        let topics = TopicAdmin::new(
            launcher,
            settings.topics_tool.clone(),
            settings.zookeeper_endpoint()?,
        );
        let recovery = RecoveryService::new(supervisor.clone(), store, inspector.clone());

        Ok(Self {
            supervisor,
            topics,
            inspector,
            recovery,
        })
    }

    /// Pick up services from earlier sessions, then reconcile with the endpoints
    pub async fn sync(&self) -> Result<()> {
        match self.recovery.recover().await {
            Ok(count) => info!(recovered_services = count, "Recovery completed"),
            Err(e) => error!(error = %e, "Recovery failed"),
        }
        self.supervisor
            .refresh_all()
            .await
            .context("Failed to probe service endpoints")?;
        Ok(())
    }

    /// Start `service`; Ctrl-C cancels the wait and terminates the child
    pub async fn start_interruptible(
        &self,
        service: &str,
    ) -> std::result::Result<StartOutcome, SupervisorError> {
        let (handle, token) = cancel_channel();
        let start = self.supervisor.start_with_cancel(service, token);
        tokio::pin!(start);

        tokio::select! {
            result = &mut start => result,
            _ = tokio::signal::ctrl_c() => {
                println!("Pressed CTRL+C, cancelling {} start...", service);
                handle.cancel();
                start.await
            }
        }
    }

    /// Services still Ready at exit
    pub fn teardown(&self) -> Vec<String> {
        self.supervisor.registry().teardown()
    }
}
