//! Persistence & Recovery Integration Tests
//!
//! A Ready service's pid survives the console: a fresh supervisor over the
//! same SQLite file adopts it while the endpoint is up, and forgets it after.
#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use kcluster_core::application::{
    RecoveryService, ServiceSupervisor, StartOutcome, SupervisorSettings,
};
use kcluster_core::domain::{CommandSpec, HealthEndpoint, LifecycleState, ServiceDescriptor};
use kcluster_core::port::time_provider::SystemTimeProvider;
use kcluster_core::port::{ProcessStore, TimeProvider};
use kcluster_infra_sqlite::{create_pool, run_migrations, SqliteProcessStore};
use kcluster_infra_system::{SubprocessLauncher, SysinfoProcessInspector, TcpPortProbe};

const SERVICE: &str = "kafka";

struct Console {
    supervisor: Arc<ServiceSupervisor>,
    recovery: RecoveryService,
    store: Arc<SqliteProcessStore>,
}

fn db_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("kcluster_{}_{}.db", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

/// One console session over the shared state file
async fn open_console(path: &PathBuf, endpoint: HealthEndpoint) -> Console {
    let pool = create_pool(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteProcessStore::new(pool, time_provider.clone()));
    let inspector = Arc::new(SysinfoProcessInspector::new());

    let descriptor = ServiceDescriptor::new(
        SERVICE,
        CommandSpec::new("sh", ["-c", "echo 'INFO [KafkaServer id=0] started'; sleep 5"]),
        CommandSpec::new("sh", ["-c", "true"]),
        endpoint,
    );
    let supervisor = Arc::new(ServiceSupervisor::new(
        vec![descriptor],
        Arc::new(SubprocessLauncher::new(time_provider.clone())),
        Arc::new(TcpPortProbe),
        store.clone(),
        time_provider,
        SupervisorSettings {
            stop_poll_interval: Duration::from_millis(20),
            stop_budget: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(200),
        },
    ));
    let recovery = RecoveryService::new(supervisor.clone(), store.clone(), inspector);

    Console {
        supervisor,
        recovery,
        store,
    }
}

/// Recovery adopts a live service with its pid, then drops it once the endpoint closes
#[tokio::test]
async fn test_pid_survives_console_restart() {
    let path = db_path("recovery");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = HealthEndpoint::new("127.0.0.1", listener.local_addr().unwrap().port());

    // Session 1: start and persist
    let pid = {
        let console = open_console(&path, endpoint.clone()).await;
        let StartOutcome::Ready { pid } = console.supervisor.start(SERVICE).await.unwrap() else {
            panic!("expected a fresh start");
        };

        let records = console.store.load_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pid, pid);
        pid
    };

    // Session 2: the shell is still sleeping, the endpoint is still open
    {
        let console = open_console(&path, endpoint.clone()).await;
        assert_eq!(console.recovery.recover().await.unwrap(), 1);

        let status = console.supervisor.registry().status(SERVICE).unwrap();
        assert_eq!(status.state, LifecycleState::Ready);
        assert_eq!(status.pid, Some(pid));
        assert_eq!(console.supervisor.registry().teardown(), vec![SERVICE.to_string()]);
    }

    // Session 3: the service went away in between
    drop(listener);
    {
        let console = open_console(&path, endpoint).await;
        assert_eq!(console.recovery.recover().await.unwrap(), 0);

        assert_eq!(
            console.supervisor.query_state(SERVICE),
            Some(LifecycleState::Stopped)
        );
        assert!(console.store.load_all().await.unwrap().is_empty());
    }

    let _ = std::fs::remove_file(&path);
    println!("✅ Persistence and recovery verified");
}

/// Unknown services in the state file are cleaned up
#[tokio::test]
async fn test_recovery_discards_unknown_services() {
    let path = db_path("unknown");
    let endpoint = HealthEndpoint::new("127.0.0.1", 1);

    {
        let console = open_console(&path, endpoint.clone()).await;
        console
            .store
            .save(&kcluster_core::port::PersistedProcess {
                service: "hbase".to_string(),
                pid: 1,
                started_at: 0,
            })
            .await
            .unwrap();
    }

    let console = open_console(&path, endpoint).await;
    assert_eq!(console.recovery.recover().await.unwrap(), 0);
    assert!(console.store.load_all().await.unwrap().is_empty());

    let _ = std::fs::remove_file(&path);
}
