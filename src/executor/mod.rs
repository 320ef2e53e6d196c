//! The SQL executor seam: runs structured statements and returns JSON rows.

mod memory;
mod postgres;

pub use memory::MemoryExecutor;
pub use postgres::{ensure_database_exists, PgExecutor};

use crate::error::BackendError;
use crate::sql::{Delete, Insert, Row, Select, Update};
use async_trait::async_trait;

/// Executes SELECT/INSERT/UPDATE/DELETE for the gateways.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn select(&self, select: &Select) -> Result<Vec<Row>, BackendError>;

    /// Number of rows the select matches, ignoring ordering and LIMIT/OFFSET.
    async fn count(&self, select: &Select) -> Result<u64, BackendError>;

    /// Insert one row; returns the `returning` columns of the stored row (the generated keys).
    async fn insert(&self, insert: &Insert) -> Result<Row, BackendError>;

    /// Returns the number of rows updated.
    async fn update(&self, update: &Update) -> Result<u64, BackendError>;

    /// Returns the number of rows deleted.
    async fn delete(&self, delete: &Delete) -> Result<u64, BackendError>;

    /// Open a consistent read scope for a multi-statement read. `None` means reads
    /// go straight to this executor.
    async fn begin_read(&self) -> Result<Option<Box<dyn SqlExecutor>>, BackendError> {
        Ok(None)
    }
}
