// Startup recovery: adopt services left running by a previous console
use crate::domain::LifecycleState;
use crate::port::{ProcessInspector, ProcessStore};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::supervisor::ServiceSupervisor;

/// Startup recovery service
///
/// On console startup, reconciles persisted (service -> pid) records with
/// what is actually reachable, so services started by an earlier session are
/// shown as Ready instead of Stopped.
pub struct RecoveryService {
    supervisor: Arc<ServiceSupervisor>,
    store: Arc<dyn ProcessStore>,
    inspector: Arc<dyn ProcessInspector>,
}

impl RecoveryService {
    /// Create a new recovery service
    ///
    /// # Example
    /// ```ignore
    /// let recovery = RecoveryService::new(supervisor.clone(), store, inspector);
    /// let adopted = recovery.recover().await?;
    /// ```
    pub fn new(
        supervisor: Arc<ServiceSupervisor>,
        store: Arc<dyn ProcessStore>,
        inspector: Arc<dyn ProcessInspector>,
    ) -> Self {
        Self {
            supervisor,
            store,
            inspector,
        }
    }

    /// Adopt persisted processes whose endpoint is still open
    ///
    /// Algorithm:
    /// 1. Load every persisted record
    /// 2. Unknown service: drop the record
    /// 3. Endpoint open: mark Ready; keep the pid only if it is still alive
    /// 4. Endpoint closed: the service is gone, drop the record
    ///
    /// # Returns
    /// Number of services adopted as Ready
    pub async fn recover(&self) -> crate::error::Result<usize> {
        let records = self.store.load_all().await?;
        info!(records = records.len(), "Starting service recovery");

        let mut adopted = 0;
        for record in records {
            if self.supervisor.descriptor(&record.service).is_none() {
                warn!(service = %record.service, pid = %record.pid, "Persisted record for unknown service, discarding");
                self.discard(&record.service).await;
                continue;
            }

            let alive = self.inspector.is_alive(record.pid);
            let state = self.supervisor.restore(&record, alive).await?;

            if state == LifecycleState::Ready {
                adopted += 1;
                if alive {
                    info!(service = %record.service, pid = %record.pid, "Adopted running service");
                } else {
                    // Endpoint is served by some other process now
                    warn!(
                        service = %record.service,
                        pid = %record.pid,
                        "Endpoint open but recorded pid is gone, adopting without pid"
                    );
                    self.discard(&record.service).await;
                }
            } else {
                info!(
                    service = %record.service,
                    pid = %record.pid,
                    state = %state,
                    "Service no longer reachable, discarding record"
                );
                self.discard(&record.service).await;
            }
        }

        info!(adopted = %adopted, "Service recovery complete");
        Ok(adopted)
    }

    /// Drop a stale record; a failed delete is retried on the next recovery
    async fn discard(&self, service: &str) {
        if let Err(e) = self.store.remove(service).await {
            warn!(service = %service, error = %e, "Failed to discard persisted record");
        }
    }
}
