// Process identifier persistence port
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ProcessId;
use crate::error::Result;

/// Persisted identity of a Ready service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedProcess {
    pub service: String,
    pub pid: ProcessId,
    pub started_at: i64, // epoch ms
}

/// Storage for the (service -> pid) mapping of Ready services
///
/// Lets a later invocation of the console pick up supervision where the
/// previous one left off. The core never chooses the storage format.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Insert or replace the record for `process.service`
    async fn save(&self, process: &PersistedProcess) -> Result<()>;

    /// Remove the record for `service` (no-op if absent)
    async fn remove(&self, service: &str) -> Result<()>;

    /// All persisted records, ordered by service name
    async fn load_all(&self) -> Result<Vec<PersistedProcess>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory ProcessStore for testing
    #[derive(Default)]
    pub struct InMemoryProcessStore {
        records: Mutex<BTreeMap<String, PersistedProcess>>,
        failing: AtomicBool,
        failing_removes: AtomicBool,
    }

    impl InMemoryProcessStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_records(records: impl IntoIterator<Item = PersistedProcess>) -> Self {
            let store = Self::new();
            {
                let mut map = store.records.lock().unwrap();
                for record in records {
                    map.insert(record.service.clone(), record);
                }
            }
            store
        }

        /// Make every call fail (persistence outage)
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Make only `remove` fail; loads and saves keep working
        pub fn set_failing_removes(&self, failing: bool) {
            self.failing_removes.store(failing, Ordering::SeqCst);
        }

        pub fn get(&self, service: &str) -> Option<PersistedProcess> {
            self.records.lock().unwrap().get(service).cloned()
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Storage("store unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProcessStore for InMemoryProcessStore {
        async fn save(&self, process: &PersistedProcess) -> Result<()> {
            self.check()?;
            self.records
                .lock()
                .unwrap()
                .insert(process.service.clone(), process.clone());
            Ok(())
        }

        async fn remove(&self, service: &str) -> Result<()> {
            self.check()?;
            if self.failing_removes.load(Ordering::SeqCst) {
                return Err(AppError::Storage("delete rejected".to_string()));
            }
            self.records.lock().unwrap().remove(service);
            Ok(())
        }

        async fn load_all(&self) -> Result<Vec<PersistedProcess>> {
            self.check()?;
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }
    }
}
