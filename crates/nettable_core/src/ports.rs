//! crates/nettable_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific storage implementations.

use async_trait::async_trait;

use crate::domain::{Field, NewRow, Row, RowId};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The backing medium cannot be reached. Callers may retry.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The shared, append-only network table.
///
/// Implementations serialize concurrent appends so that ids are strictly
/// increasing without gaps or duplicates, and never expose a partially
/// written row to readers.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Appends a completed row and returns the id assigned to it.
    async fn append(&self, row: &NewRow) -> PortResult<RowId>;

    /// A consistent snapshot of the whole table, ordered by id.
    async fn read_all(&self) -> PortResult<Vec<Row>>;

    /// Rows whose `field` equals `value`, ignoring case, ordered by id.
    async fn find_by_field(&self, field: Field, value: &str) -> PortResult<Vec<Row>>;
}
