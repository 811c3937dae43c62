// Supervisor Registry - the only shared mutable state
//
// One entry per known service. Reads are lock-and-copy; mutations go through
// a TransitionGuard, which holds the entry's transition lock so at most one
// Start/Stop/refresh is in flight per service while other services proceed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::domain::{error::Result as DomainResult, LifecycleState, ProcessId, ServiceStatus};
use crate::port::TimeProvider;

struct Entry {
    status: Mutex<ServiceStatus>,
    transition: Arc<AsyncMutex<()>>,
}

impl Entry {
    fn new() -> Self {
        Self {
            status: Mutex::new(ServiceStatus::default()),
            transition: Arc::new(AsyncMutex::new(())),
        }
    }

    fn status(&self) -> MutexGuard<'_, ServiceStatus> {
        // Updates are applied as whole values, so a poisoned status is still consistent
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Process-wide table: service name -> lifecycle state + last known pid
pub struct SupervisorRegistry {
    entries: BTreeMap<String, Arc<Entry>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SupervisorRegistry {
    /// Create a registry with every service `Stopped`
    pub fn new<I, S>(services: I, time_provider: Arc<dyn TimeProvider>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: services
                .into_iter()
                .map(|name| (name.into(), Arc::new(Entry::new())))
                .collect(),
            time_provider,
        }
    }

    pub fn service_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains(&self, service: &str) -> bool {
        self.entries.contains_key(service)
    }

    /// Current state, None for unknown services
    pub fn query(&self, service: &str) -> Option<LifecycleState> {
        self.entries.get(service).map(|e| e.status().state)
    }

    pub fn status(&self, service: &str) -> Option<ServiceStatus> {
        self.entries.get(service).map(|e| e.status().clone())
    }

    /// All entries, ordered by service name
    pub fn snapshot(&self) -> Vec<(String, ServiceStatus)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status().clone()))
            .collect()
    }

    /// (service -> pid) for Ready services with a known pid
    pub fn ready_processes(&self) -> BTreeMap<String, ProcessId> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| {
                let status = entry.status();
                match (status.state, status.pid) {
                    (LifecycleState::Ready, Some(pid)) => Some((name.clone(), pid)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Wait for exclusive transition rights on `service`
    pub async fn begin_transition(&self, service: &str) -> Option<TransitionGuard> {
        let entry = self.entries.get(service)?;
        let permit = Arc::clone(&entry.transition).lock_owned().await;
        Some(self.guard(service, entry, permit))
    }

    /// Transition rights if nobody else holds them right now
    pub fn try_begin_transition(&self, service: &str) -> Option<TransitionGuard> {
        let entry = self.entries.get(service)?;
        let permit = Arc::clone(&entry.transition).try_lock_owned().ok()?;
        Some(self.guard(service, entry, permit))
    }

    fn guard(
        &self,
        service: &str,
        entry: &Arc<Entry>,
        permit: OwnedMutexGuard<()>,
    ) -> TransitionGuard {
        TransitionGuard {
            service: service.to_string(),
            entry: Arc::clone(entry),
            time_provider: Arc::clone(&self.time_provider),
            _permit: permit,
        }
    }

    /// Best-effort teardown report
    ///
    /// Warns about every Ready service and returns their names. The OS
    /// processes are left running.
    pub fn teardown(&self) -> Vec<String> {
        let running: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|(_, status)| status.state == LifecycleState::Ready)
            .map(|(name, _)| name)
            .collect();

        for service in &running {
            warn!(service = %service, "Service still running at exit; stop it from your terminal");
        }
        running
    }
}

/// Exclusive right to mutate one registry entry
///
/// Dropping a guard while the entry is still `Starting` (the owning Start was
/// abandoned) moves it to `Failed`, so an entry never stays stuck mid-start.
pub struct TransitionGuard {
    service: String,
    entry: Arc<Entry>,
    time_provider: Arc<dyn TimeProvider>,
    _permit: OwnedMutexGuard<()>,
}

impl TransitionGuard {
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn status(&self) -> ServiceStatus {
        self.entry.status().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.entry.status().state
    }

    /// Apply `f` to a copy of the status and commit only if it succeeds
    pub fn update<F>(&self, f: F) -> DomainResult<()>
    where
        F: FnOnce(&mut ServiceStatus, i64) -> DomainResult<()>,
    {
        let now = self.time_provider.now_millis();
        let mut status = self.entry.status();
        let mut next = status.clone();
        f(&mut next, now)?;
        *status = next;
        Ok(())
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        let now = self.time_provider.now_millis();
        let mut status = self.entry.status();
        if status.state == LifecycleState::Starting {
            warn!(service = %self.service, "Start abandoned mid-transition, marking FAILED");
            let _ = status.mark_failed(now);
        }
    }
}
