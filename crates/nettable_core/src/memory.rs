//! crates/nettable_core/src/memory.rs
//!
//! An in-process implementation of the `TableStore` port.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Field, NewRow, Row, RowId};
use crate::ports::{PortError, PortResult, TableStore};

/// Keeps the table in memory. Ids and the push happen under one write lock,
/// so the tail of the table is a single point of mutual exclusion.
#[derive(Debug)]
pub struct InMemoryTableStore {
    rows: RwLock<Vec<Row>>,
    available: AtomicBool,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Takes the store offline (or back online). While offline every append
    /// fails with `PortError::Unavailable`; reads keep working.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn append(&self, row: &NewRow) -> PortResult<RowId> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable(
                "the in-memory table is offline".to_string(),
            ));
        }

        let mut rows = self.rows.write().await;
        let id = RowId(rows.last().map_or(1, |last| last.id.0 + 1));
        rows.push(row.clone().into_row(id));
        debug!(row_id = %id, "Row appended to in-memory table");
        Ok(id)
    }

    async fn read_all(&self) -> PortResult<Vec<Row>> {
        Ok(self.rows.read().await.clone())
    }

    async fn find_by_field(&self, field: Field, value: &str) -> PortResult<Vec<Row>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| row.matches(field, value))
            .cloned()
            .collect())
    }
}
