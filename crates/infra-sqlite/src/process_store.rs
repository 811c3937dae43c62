// SQLite ProcessStore Implementation

use async_trait::async_trait;
use kcluster_core::error::{AppError, Result};
use kcluster_core::port::{PersistedProcess, ProcessStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite error codes: https://www.sqlite.org/rescode.html
            Some(code) if code.as_ref() == "5" => AppError::Storage(format!(
                "Database locked (SQLITE_BUSY): {}",
                db_err.message()
            )),
            Some(code) if code.as_ref() == "13" => {
                AppError::Storage(format!("Database full: {}", db_err.message()))
            }
            Some(code) => AppError::Storage(format!(
                "Database error [{}]: {}",
                code.as_ref(),
                db_err.message()
            )),
            None => AppError::Storage(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Storage(format!("Column not found: {}", col))
        }
        _ => AppError::Storage(err.to_string()),
    }
}

pub struct SqliteProcessStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteProcessStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl ProcessStore for SqliteProcessStore {
    async fn save(&self, process: &PersistedProcess) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO service_processes (service, pid, started_at, recorded_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&process.service)
        .bind(i64::from(process.pid))
        .bind(process.started_at)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(service = %process.service, pid = %process.pid, "Process identity saved");
        Ok(())
    }

    async fn remove(&self, service: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM service_processes WHERE service = ?")
            .bind(service)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(service = %service, removed = result.rows_affected(), "Process identity removed");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PersistedProcess>> {
        let rows = sqlx::query_as::<_, ProcessRow>(
            "SELECT service, pid, started_at FROM service_processes ORDER BY service",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ProcessRow::into_process).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ProcessRow {
    service: String,
    pid: i64,
    started_at: i64,
}

impl ProcessRow {
    fn into_process(self) -> Result<PersistedProcess> {
        let pid = u32::try_from(self.pid).map_err(|_| {
            AppError::Storage(format!(
                "invalid pid {} stored for {}",
                self.pid, self.service
            ))
        })?;

        Ok(PersistedProcess {
            service: self.service,
            pid,
            started_at: self.started_at,
        })
    }
}
