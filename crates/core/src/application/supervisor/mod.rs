// Service Supervisor - Start/Stop lifecycle state machine
//
// Start: spawn -> read output line by line -> classify -> probe -> Ready/Failed
// Stop:  stop command -> poll endpoint until closed -> Stopped (or StopTimeout)

mod cancel;
pub mod constants;
mod error;

pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use error::SupervisorError;

use constants::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::application::classifier::{classify, Classification};
use crate::application::registry::{SupervisorRegistry, TransitionGuard};
use crate::domain::{HealthEndpoint, LifecycleState, ProcessId, ServiceDescriptor};
use crate::port::{
    PersistedProcess, PortProbe, ProcessLauncher, ProcessRecord, ProcessStore, TimeProvider,
};

/// Successful Start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Spawned and confirmed reachable
    Ready { pid: ProcessId },
    /// Was already Ready; nothing spawned
    AlreadyReady,
}

/// Successful Stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Endpoint closed within budget
    Stopped,
    /// Was not running; stop command not invoked
    NotRunning,
}

/// Timing knobs for Stop and probing
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub stop_poll_interval: Duration,
    pub stop_budget: Duration,
    pub probe_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            stop_poll_interval: STOP_POLL_INTERVAL,
            stop_budget: STOP_WAIT_BUDGET,
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// How the readiness scan ended
enum ScanOutcome {
    Ready,
    EndOfStream,
    Cancelled,
    TimedOut,
}

/// Carried across the scan so a timeout still sees what was observed
#[derive(Default)]
struct ScanState {
    failure: Option<(Classification, String)>,
    lines: usize,
}

/// Drives service lifecycles and owns the registry
pub struct ServiceSupervisor {
    descriptors: BTreeMap<String, ServiceDescriptor>,
    registry: Arc<SupervisorRegistry>,
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn PortProbe>,
    store: Arc<dyn ProcessStore>,
    settings: SupervisorSettings,
}

impl ServiceSupervisor {
    /// Create a supervisor; every descriptor gets a `Stopped` registry entry
    ///
    /// # Example
    /// ```ignore
    /// let supervisor = ServiceSupervisor::new(
    ///     vec![ServiceDescriptor::zookeeper(zk), ServiceDescriptor::kafka(kf)],
    ///     Arc::new(SubprocessLauncher::new(time_provider.clone())),
    ///     Arc::new(TcpPortProbe),
    ///     store,
    ///     time_provider,
    ///     SupervisorSettings::default(),
    /// );
    /// ```
    pub fn new(
        descriptors: Vec<ServiceDescriptor>,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn PortProbe>,
        store: Arc<dyn ProcessStore>,
        time_provider: Arc<dyn TimeProvider>,
        settings: SupervisorSettings,
    ) -> Self {
        let descriptors: BTreeMap<String, ServiceDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        let registry = Arc::new(SupervisorRegistry::new(
            descriptors.keys().cloned(),
            time_provider,
        ));

        Self {
            descriptors,
            registry,
            launcher,
            probe,
            store,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SupervisorRegistry> {
        &self.registry
    }

    pub fn descriptor(&self, service: &str) -> Option<&ServiceDescriptor> {
        self.descriptors.get(service)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.values()
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Current lifecycle state, None for unknown services
    pub fn query_state(&self, service: &str) -> Option<LifecycleState> {
        self.registry.query(service)
    }

    fn require(&self, service: &str) -> Result<&ServiceDescriptor, SupervisorError> {
        self.descriptors
            .get(service)
            .ok_or_else(|| SupervisorError::UnknownService(service.to_string()))
    }

    async fn lock(&self, service: &str) -> Result<TransitionGuard, SupervisorError> {
        self.registry
            .begin_transition(service)
            .await
            .ok_or_else(|| SupervisorError::UnknownService(service.to_string()))
    }

    /// Start a service and wait until it is Ready or Failed
    pub async fn start(&self, service: &str) -> Result<StartOutcome, SupervisorError> {
        self.start_with_cancel(service, CancelToken::never()).await
    }

    /// Start with caller-controlled cancellation
    ///
    /// A cancelled Start terminates the child, releases its output and leaves
    /// the entry `Failed`.
    pub async fn start_with_cancel(
        &self,
        service: &str,
        mut cancel: CancelToken,
    ) -> Result<StartOutcome, SupervisorError> {
        let descriptor = self.require(service)?;
        let guard = self.lock(service).await?;

        match guard.state() {
            LifecycleState::Ready => {
                info!(service = %service, pid = ?guard.status().pid, "Service already ready");
                return Ok(StartOutcome::AlreadyReady);
            }
            state @ (LifecycleState::Starting | LifecycleState::Stopping) => {
                return Err(SupervisorError::InvalidState {
                    service: service.to_string(),
                    operation: "start",
                    state,
                });
            }
            LifecycleState::Stopped | LifecycleState::Failed => {}
        }

        guard.update(|s, now| s.begin_start(now))?;
        info!(
            service = %service,
            command = %descriptor.start_command,
            endpoint = %descriptor.health_endpoint,
            "Starting service"
        );

        let mut record = match self.launcher.spawn(&descriptor.start_command) {
            Ok(record) => record,
            Err(source) => {
                error!(service = %service, error = %source, "Spawn failed");
                guard.update(|s, now| s.mark_failed(now))?;
                return Err(SupervisorError::Spawn {
                    service: service.to_string(),
                    source,
                });
            }
        };
        let pid = record.pid();
        let started_at = record.started_at();
        debug!(service = %service, pid = %pid, "Process spawned");

        let mut scan = ScanState::default();
        let outcome = {
            let scanning = self.scan_output(descriptor, record.as_mut(), &mut scan, &mut cancel);
            match descriptor.readiness_timeout {
                Some(limit) => timeout(limit, scanning)
                    .await
                    .unwrap_or(ScanOutcome::TimedOut),
                None => scanning.await,
            }
        };

        if let ScanOutcome::Ready = outcome {
            // Recorded right after the successful probe
            guard.update(|s, now| s.mark_ready(pid, started_at, now))?;
            record.release();
            info!(service = %service, pid = %pid, lines = scan.lines, "Service ready");
            self.persist(service, pid, started_at).await;
            return Ok(StartOutcome::Ready { pid });
        }

        if matches!(outcome, ScanOutcome::Cancelled | ScanOutcome::TimedOut) {
            if let Err(e) = record.terminate() {
                warn!(service = %service, pid = %pid, error = %e, "Failed to terminate abandoned process");
            }
        }
        record.release();
        guard.update(|s, now| s.mark_failed(now))?;

        let name = service.to_string();
        let err = match (outcome, scan.failure) {
            (ScanOutcome::Cancelled, _) => SupervisorError::Cancelled { service: name },
            (_, Some((classification, line))) => SupervisorError::StartupFailure {
                service: name,
                classification,
                line,
            },
            (ScanOutcome::TimedOut, None) => SupervisorError::ReadinessTimeout {
                service: name,
                timeout: descriptor.readiness_timeout.unwrap_or_default(),
            },
            (_, None) => SupervisorError::EndOfStreamWithoutReadiness { service: name },
        };
        error!(service = %service, pid = %pid, lines = scan.lines, error = %err, "Service failed to start");
        Err(err)
    }

    /// Interleave output classification with endpoint probes
    async fn scan_output(
        &self,
        descriptor: &ServiceDescriptor,
        record: &mut dyn ProcessRecord,
        scan: &mut ScanState,
        cancel: &mut CancelToken,
    ) -> ScanOutcome {
        let service = descriptor.name.as_str();

        if let Some(grace) = descriptor.startup_grace {
            debug!(service = %service, grace_ms = grace.as_millis() as u64, "Waiting before readiness checks");
            tokio::select! {
                _ = sleep(grace) => {}
                _ = cancel.cancelled() => return ScanOutcome::Cancelled,
            }
        }

        loop {
            let line = tokio::select! {
                line = record.read_line() => line,
                _ = cancel.cancelled() => return ScanOutcome::Cancelled,
            };
            let Some(line) = line else {
                return ScanOutcome::EndOfStream;
            };
            scan.lines += 1;

            let classification = classify(&line, &descriptor.rules);
            match classification {
                Classification::Informational => {
                    info!(service = %service, line = %line.to_lossy(), "Service log");
                }
                Classification::BindConflict | Classification::GenericError => {
                    warn!(
                        service = %service,
                        classification = %classification,
                        line = %line.to_lossy(),
                        "Failure signal in service output"
                    );
                    if scan.failure.is_none() {
                        scan.failure = Some((classification, line.to_lossy()));
                    }
                }
                Classification::Noise => {
                    debug!(service = %service, line = %line.to_lossy(), "Service output");
                }
            }

            // Once an error was seen, an open port no longer counts
            if scan.failure.is_none()
                && self
                    .probe
                    .is_open(&descriptor.health_endpoint, self.settings.probe_timeout)
                    .await
            {
                return ScanOutcome::Ready;
            }
        }
    }

    /// Gracefully stop a Ready service via its own stop command
    ///
    /// A service left `Stopping` by an earlier timeout may be stopped again.
    /// The tracked pid is never signalled.
    pub async fn stop(&self, service: &str) -> Result<StopOutcome, SupervisorError> {
        let descriptor = self.require(service)?;
        let guard = self.lock(service).await?;

        match guard.state() {
            LifecycleState::Ready => guard.update(|s, now| s.begin_stop(now))?,
            LifecycleState::Stopping => info!(service = %service, "Retrying stop"),
            state => {
                info!(service = %service, state = %state, "Service not running; nothing to stop");
                return Ok(StopOutcome::NotRunning);
            }
        }

        info!(service = %service, command = %descriptor.stop_command, "Stopping service");
        match self.launcher.spawn(&descriptor.stop_command) {
            Ok(record) => drain_in_background(service.to_string(), record),
            Err(source) => {
                error!(service = %service, error = %source, "Stop command failed to spawn");
                return Err(SupervisorError::Spawn {
                    service: service.to_string(),
                    source,
                });
            }
        }

        if self.wait_for_close(&descriptor.health_endpoint).await {
            guard.update(|s, now| s.mark_stopped(now))?;
            self.forget(service).await;
            info!(service = %service, "Service stopped");
            Ok(StopOutcome::Stopped)
        } else {
            let err = SupervisorError::StopTimeout {
                service: service.to_string(),
                endpoint: descriptor.health_endpoint.clone(),
                budget: self.settings.stop_budget,
            };
            warn!(service = %service, error = %err, "Stop timed out");
            Err(err)
        }
    }

    /// Poll until the endpoint stops accepting connections or the budget runs out
    async fn wait_for_close(&self, endpoint: &HealthEndpoint) -> bool {
        let polling = async {
            while self.probe.is_open(endpoint, self.settings.probe_timeout).await {
                sleep(self.settings.stop_poll_interval).await;
            }
        };
        timeout(self.settings.stop_budget, polling).await.is_ok()
    }

    /// Reconcile one entry with its endpoint
    ///
    /// Ready/Stopping with a closed port becomes Stopped; Stopped/Failed with
    /// an open port becomes Ready (started outside this console, pid unknown).
    /// Entries with a transition in flight are left alone.
    pub async fn refresh(&self, service: &str) -> Result<LifecycleState, SupervisorError> {
        let descriptor = self.require(service)?;
        let Some(guard) = self.registry.try_begin_transition(service) else {
            return self
                .registry
                .query(service)
                .ok_or_else(|| SupervisorError::UnknownService(service.to_string()));
        };

        let open = self
            .probe
            .is_open(&descriptor.health_endpoint, self.settings.probe_timeout)
            .await;

        match (guard.state(), open) {
            (LifecycleState::Ready | LifecycleState::Stopping, false) => {
                guard.update(|s, now| s.observe_closed(now))?;
                self.forget(service).await;
                info!(service = %service, endpoint = %descriptor.health_endpoint, "Endpoint closed; marked STOPPED");
            }
            (LifecycleState::Stopped | LifecycleState::Failed, true) => {
                guard.update(|s, now| s.observe_open(None, None, now))?;
                info!(service = %service, endpoint = %descriptor.health_endpoint, "Endpoint open; marked READY");
            }
            _ => {}
        }

        Ok(guard.state())
    }

    /// Refresh every known service
    pub async fn refresh_all(&self) -> Result<Vec<(String, LifecycleState)>, SupervisorError> {
        let mut states = Vec::with_capacity(self.descriptors.len());
        for service in self.descriptors.keys() {
            states.push((service.clone(), self.refresh(service).await?));
        }
        Ok(states)
    }

    /// Adopt a persisted process identity if the endpoint is open
    ///
    /// The pid is kept only when `pid_alive`; otherwise the entry becomes
    /// Ready without an identity.
    pub async fn restore(
        &self,
        process: &PersistedProcess,
        pid_alive: bool,
    ) -> Result<LifecycleState, SupervisorError> {
        let descriptor = self.require(&process.service)?;
        let guard = self.lock(&process.service).await?;

        if !matches!(
            guard.state(),
            LifecycleState::Stopped | LifecycleState::Failed
        ) {
            return Ok(guard.state());
        }

        if !self
            .probe
            .is_open(&descriptor.health_endpoint, self.settings.probe_timeout)
            .await
        {
            return Ok(guard.state());
        }

        let (pid, started_at) = if pid_alive {
            (Some(process.pid), Some(process.started_at))
        } else {
            (None, None)
        };
        guard.update(|s, now| s.observe_open(pid, started_at, now))?;
        Ok(guard.state())
    }

    async fn persist(&self, service: &str, pid: ProcessId, started_at: i64) {
        let record = PersistedProcess {
            service: service.to_string(),
            pid,
            started_at,
        };
        if let Err(e) = self.store.save(&record).await {
            warn!(service = %service, pid = %pid, error = %e, "Failed to persist process identity");
        }
    }

    async fn forget(&self, service: &str) {
        if let Err(e) = self.store.remove(service).await {
            warn!(service = %service, error = %e, "Failed to remove persisted process identity");
        }
    }
}

/// Keep the stop command's pipe drained so it never blocks on a full buffer
fn drain_in_background(service: String, mut record: Box<dyn ProcessRecord>) {
    tokio::spawn(async move {
        while let Some(line) = record.read_line().await {
            debug!(service = %service, line = %line.to_lossy(), "Stop command output");
        }
        record.release();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, ServiceDescriptor};
    use crate::port::port_probe::mocks::MockPortProbe;
    use crate::port::process_launcher::mocks::{MockProcessLauncher, MockScript};
    use crate::port::process_store::mocks::InMemoryProcessStore;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::SpawnError;
    use std::time::Instant;

    const ZK: &str = "zookeeper";

    struct Harness {
        supervisor: ServiceSupervisor,
        launcher: Arc<MockProcessLauncher>,
        probe: Arc<MockPortProbe>,
        store: Arc<InMemoryProcessStore>,
    }

    fn descriptor(name: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor::new(
            name,
            CommandSpec::new(format!("{}-start", name), ["cfg.properties"]),
            CommandSpec::new(format!("{}-stop", name), Vec::<String>::new()),
            HealthEndpoint::new("127.0.0.1", port),
        )
    }

    fn fast_settings() -> SupervisorSettings {
        SupervisorSettings {
            stop_poll_interval: Duration::from_millis(5),
            stop_budget: Duration::from_millis(100),
            probe_timeout: Duration::from_millis(10),
        }
    }

    fn harness(
        descriptors: Vec<ServiceDescriptor>,
        launcher: Arc<MockProcessLauncher>,
        probe: Arc<MockPortProbe>,
    ) -> Harness {
        let store = Arc::new(InMemoryProcessStore::new());
        let supervisor = ServiceSupervisor::new(
            descriptors,
            launcher.clone(),
            probe.clone(),
            store.clone(),
            Arc::new(ManualTimeProvider::new(1_000)),
            fast_settings(),
        );
        Harness {
            supervisor,
            launcher,
            probe,
            store,
        }
    }

    fn zk_start() -> String {
        format!("{}-start", ZK)
    }

    fn zk_stop() -> String {
        format!("{}-stop", ZK)
    }

    #[tokio::test]
    async fn test_start_ready_records_pid() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO starting", "INFO listening"]));
        let probe = Arc::new(MockPortProbe::opens_at_line(launcher.line_counter(), 2));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let outcome = h.supervisor.start(ZK).await.unwrap();

        assert_eq!(outcome, StartOutcome::Ready { pid: 1000 });
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Ready));
        assert_eq!(h.supervisor.registry().ready_processes().get(ZK), Some(&1000));
        assert_eq!(h.probe.call_count(), 2);
        assert_eq!(h.launcher.released_count(), 1);
        assert_eq!(h.store.get(ZK).map(|p| p.pid), Some(1000));
    }

    #[tokio::test]
    async fn test_error_line_beats_later_probe() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(
            &zk_start(),
            MockScript::lines(&["INFO starting", "ERROR port in use", "INFO listening"]),
        );
        let probe = Arc::new(MockPortProbe::opens_at_line(launcher.line_counter(), 3));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let err = h.supervisor.start(ZK).await.unwrap_err();

        match err {
            SupervisorError::StartupFailure {
                classification,
                line,
                ..
            } => {
                assert_eq!(classification, Classification::GenericError);
                assert_eq!(line, "ERROR port in use");
            }
            other => panic!("expected StartupFailure, got {:?}", other),
        }
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Failed));
        // Only the first line was probed; after the error nothing promotes the service
        assert_eq!(h.probe.call_count(), 1);
        assert!(h.store.get(ZK).is_none());
        assert_eq!(h.launcher.released_count(), 1);
    }

    #[tokio::test]
    async fn test_end_of_stream_without_readiness_is_deterministic() {
        let launcher = Arc::new(MockProcessLauncher::new());
        for _ in 0..2 {
            launcher.script(&zk_start(), MockScript::lines(&["INFO starting", "WARN no config"]));
        }
        let probe = Arc::new(MockPortProbe::new(false));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        for _ in 0..2 {
            let err = h.supervisor.start(ZK).await.unwrap_err();
            assert!(matches!(
                err,
                SupervisorError::EndOfStreamWithoutReadiness { .. }
            ));
            assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Failed));
        }
        assert_eq!(h.launcher.spawn_count(&zk_start()), 2);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_start() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(
            &zk_start(),
            MockScript::lines(&["java.net.BindException: Address already in use"]),
        );
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let err = h.supervisor.start(ZK).await.unwrap_err();

        assert_eq!(err.classification(), Some(Classification::BindConflict));
        assert_eq!(err.service(), Some(ZK));
        // The port is open (someone else holds it) but the service is not ours
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_warning_does_not_block_readiness() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["WARN slow fsync"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let outcome = tokio_test::assert_ok!(h.supervisor.start(ZK).await);
        assert!(matches!(outcome, StartOutcome::Ready { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_marks_failed() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(
            &zk_start(),
            MockScript::FailSpawn(SpawnError::NotFound(zk_start())),
        );
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let err = h.supervisor.start(ZK).await.unwrap_err();

        assert!(matches!(err, SupervisorError::Spawn { .. }));
        let status = h.supervisor.registry().status(ZK).unwrap();
        assert_eq!(status.state, LifecycleState::Failed);
        assert!(status.pid.is_none());
        assert_eq!(h.probe.call_count(), 0);
    }

    #[tokio::test]
    async fn test_start_when_ready_is_noop() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        h.supervisor.start(ZK).await.unwrap();
        let again = h.supervisor.start(ZK).await.unwrap();

        assert_eq!(again, StartOutcome::AlreadyReady);
        assert_eq!(h.launcher.spawn_count(&zk_start()), 1);
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let launcher = Arc::new(MockProcessLauncher::new());
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        assert!(matches!(
            h.supervisor.start("hbase").await,
            Err(SupervisorError::UnknownService(_))
        ));
        assert!(matches!(
            h.supervisor.stop("hbase").await,
            Err(SupervisorError::UnknownService(_))
        ));
        assert_eq!(h.supervisor.query_state("hbase"), None);
    }

    #[tokio::test]
    async fn test_stop_on_stopped_is_noop() {
        let launcher = Arc::new(MockProcessLauncher::new());
        let probe = Arc::new(MockPortProbe::new(false));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let outcome = h.supervisor.stop(ZK).await.unwrap();

        assert_eq!(outcome, StopOutcome::NotRunning);
        assert_eq!(h.launcher.spawn_count(&zk_stop()), 0);
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Stopped));
    }

    #[tokio::test]
    async fn test_stop_timeout_leaves_stopping() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);
        h.supervisor.start(ZK).await.unwrap();

        let err = h.supervisor.stop(ZK).await.unwrap_err();

        assert!(matches!(err, SupervisorError::StopTimeout { .. }));
        let status = h.supervisor.registry().status(ZK).unwrap();
        assert_eq!(status.state, LifecycleState::Stopping);
        assert_eq!(status.pid, Some(1000));
        assert_eq!(h.launcher.spawn_count(&zk_stop()), 1);

        // The service goes down later; a retried stop completes
        h.probe.set_open(false);
        let outcome = h.supervisor.stop(ZK).await.unwrap();
        assert_eq!(outcome, StopOutcome::Stopped);
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Stopped));
        assert!(h.store.get(ZK).is_none());
    }

    #[tokio::test]
    async fn test_stop_command_spawn_failure_leaves_stopping() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        launcher.script(
            &zk_stop(),
            MockScript::FailSpawn(SpawnError::NotFound(zk_stop())),
        );
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);
        h.supervisor.start(ZK).await.unwrap();

        let err = h.supervisor.stop(ZK).await.unwrap_err();

        assert!(matches!(err, SupervisorError::Spawn { .. }));
        let status = h.supervisor.registry().status(ZK).unwrap();
        assert_eq!(status.state, LifecycleState::Stopping);
        assert_eq!(status.pid, Some(1000));
        assert_eq!(h.store.get(ZK).map(|p| p.pid), Some(1000));
        assert!(h.launcher.terminated().is_empty());

        // Script is back in place; the retry runs it and completes
        h.probe.set_open(false);
        let outcome = tokio_test::assert_ok!(h.supervisor.stop(ZK).await);
        assert_eq!(outcome, StopOutcome::Stopped);
        assert_eq!(h.launcher.spawn_count(&zk_stop()), 2);
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Stopped));
    }

    #[tokio::test]
    async fn test_start_stop_start_uses_fresh_process() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        launcher.script(&zk_start(), MockScript::hang(&["INFO up again"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let first = h.supervisor.start(ZK).await.unwrap();
        h.probe.set_open(false);
        assert_eq!(h.supervisor.stop(ZK).await.unwrap(), StopOutcome::Stopped);
        assert!(h.supervisor.registry().status(ZK).unwrap().pid.is_none());

        h.probe.set_open(true);
        let second = h.supervisor.start(ZK).await.unwrap();

        let (StartOutcome::Ready { pid: first_pid }, StartOutcome::Ready { pid: second_pid }) =
            (first, second)
        else {
            panic!("both starts should reach Ready");
        };
        assert_ne!(first_pid, second_pid);
        assert_eq!(h.supervisor.registry().ready_processes().get(ZK), Some(&second_pid));
        assert_eq!(h.store.get(ZK).map(|p| p.pid), Some(second_pid));
    }

    #[tokio::test]
    async fn test_cancel_start_releases_and_fails() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO starting"]));
        let probe = Arc::new(MockPortProbe::new(false));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let (handle, token) = cancel_channel();
        let (result, _) = tokio::join!(h.supervisor.start_with_cancel(ZK, token), async {
            sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        assert!(matches!(result, Err(SupervisorError::Cancelled { .. })));
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Failed));
        assert_eq!(h.launcher.terminated(), vec![1000]);
        assert_eq!(h.launcher.released_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_start_does_not_stay_starting() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&[]));
        let probe = Arc::new(MockPortProbe::new(false));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let abandoned = timeout(Duration::from_millis(20), h.supervisor.start(ZK)).await;

        assert!(abandoned.is_err());
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Failed));
        assert_eq!(h.launcher.released_count(), 1);
    }

    #[tokio::test]
    async fn test_readiness_timeout() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO starting"]));
        let probe = Arc::new(MockPortProbe::new(false));
        let h = harness(
            vec![descriptor(ZK, 2181).with_readiness_timeout(Duration::from_millis(30))],
            launcher,
            probe,
        );

        let err = h.supervisor.start(ZK).await.unwrap_err();

        assert!(matches!(err, SupervisorError::ReadinessTimeout { .. }));
        assert_eq!(h.launcher.terminated(), vec![1000]);
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_readiness_timeout_reports_seen_error() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["ERROR disk full"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(
            vec![descriptor(ZK, 2181).with_readiness_timeout(Duration::from_millis(30))],
            launcher,
            probe,
        );

        let err = h.supervisor.start(ZK).await.unwrap_err();
        assert_eq!(err.classification(), Some(Classification::GenericError));
    }

    #[tokio::test]
    async fn test_startup_grace_delays_first_probe() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(
            vec![descriptor(ZK, 2181).with_startup_grace(Duration::from_millis(50))],
            launcher,
            probe,
        );

        let began = Instant::now();
        h.supervisor.start(ZK).await.unwrap();

        assert!(began.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_independent_services_start_concurrently() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script("zookeeper-start", MockScript::hang(&["INFO zk up"]));
        launcher.script("kafka-start", MockScript::hang(&["INFO kafka up"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(
            vec![
                descriptor("zookeeper", 2181),
                descriptor("kafka", 9092).with_startup_grace(Duration::from_millis(20)),
            ],
            launcher,
            probe,
        );

        let (zk, kf) = tokio::join!(h.supervisor.start("zookeeper"), h.supervisor.start("kafka"));

        assert!(zk.is_ok() && kf.is_ok());
        assert_eq!(h.supervisor.registry().ready_processes().len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_start() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);
        h.store.set_failing(true);

        assert!(h.supervisor.start(ZK).await.is_ok());
        assert_eq!(h.supervisor.query_state(ZK), Some(LifecycleState::Ready));
    }

    #[tokio::test]
    async fn test_refresh_tracks_endpoint() {
        let launcher = Arc::new(MockProcessLauncher::new());
        launcher.script(&zk_start(), MockScript::hang(&["INFO up"]));
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);
        h.supervisor.start(ZK).await.unwrap();

        // Killed from outside
        h.probe.set_open(false);
        assert_eq!(h.supervisor.refresh(ZK).await.unwrap(), LifecycleState::Stopped);
        assert!(h.store.get(ZK).is_none());
        assert!(h.supervisor.registry().status(ZK).unwrap().pid.is_none());

        // Started from outside
        h.probe.set_open(true);
        let states = h.supervisor.refresh_all().await.unwrap();
        assert_eq!(states, vec![(ZK.to_string(), LifecycleState::Ready)]);
        assert!(h.supervisor.registry().ready_processes().is_empty());
    }

    #[tokio::test]
    async fn test_restore_adopts_live_process() {
        let launcher = Arc::new(MockProcessLauncher::new());
        let probe = Arc::new(MockPortProbe::new(true));
        let h = harness(vec![descriptor(ZK, 2181)], launcher, probe);

        let persisted = PersistedProcess {
            service: ZK.to_string(),
            pid: 4321,
            started_at: 77,
        };
        let state = h.supervisor.restore(&persisted, true).await.unwrap();

        assert_eq!(state, LifecycleState::Ready);
        let status = h.supervisor.registry().status(ZK).unwrap();
        assert_eq!(status.pid, Some(4321));
        assert_eq!(status.started_at, Some(77));

        // Closed endpoint: nothing to adopt
        h.probe.set_open(false);
        h.supervisor.refresh(ZK).await.unwrap();
        assert_eq!(
            h.supervisor.restore(&persisted, true).await.unwrap(),
            LifecycleState::Stopped
        );
    }
}
