// kcluster Infrastructure - SQLite Adapter
// Implements: ProcessStore

mod connection;
mod migration;
mod process_store;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use process_store::SqliteProcessStore;

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
