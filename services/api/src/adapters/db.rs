//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `TableStore` port from the `core` crate. It keeps the committed rows in
//! a SQLite database using `sqlx`, so the table survives restarts.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nettable_core::domain::{Field, NewRow, Row, RowId, UserId};
use nettable_core::ports::{PortError, PortResult, TableStore};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tokio::sync::Mutex;
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, ssid, address, gateway, password, note, created_at FROM network_rows";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `TableStore` port.
pub struct SqliteTableStore {
    pool: SqlitePool,
    /// Serializes appends in this process so ids are handed out one at a time.
    tail: Mutex<()>,
}

impl SqliteTableStore {
    /// Creates a new `SqliteTableStore` over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            tail: Mutex::new(()),
        }
    }

    /// Opens (creating if needed) the database at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct RowRecord {
    id: i64,
    user_id: String,
    ssid: String,
    address: String,
    gateway: String,
    password: String,
    note: String,
    created_at: DateTime<Utc>,
}

impl RowRecord {
    fn to_domain(self) -> Row {
        let fields = BTreeMap::from([
            (Field::Ssid, self.ssid),
            (Field::Address, self.address),
            (Field::Gateway, self.gateway),
            (Field::Password, self.password),
            (Field::Note, self.note),
        ]);
        Row {
            id: RowId(self.id),
            user_id: UserId::new(self.user_id),
            fields,
            created_at: self.created_at,
        }
    }
}

fn column(row: &NewRow, field: Field) -> PortResult<&str> {
    row.fields
        .get(&field)
        .map(String::as_str)
        .ok_or_else(|| PortError::Unexpected(format!("row is missing the '{}' field", field)))
}

fn map_sqlx_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// `TableStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn append(&self, row: &NewRow) -> PortResult<RowId> {
        let _tail = self.tail.lock().await;

        let result = sqlx::query(
            "INSERT INTO network_rows (user_id, ssid, address, gateway, password, note, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(row.user_id.as_str())
        .bind(column(row, Field::Ssid)?)
        .bind(column(row, Field::Address)?)
        .bind(column(row, Field::Gateway)?)
        .bind(column(row, Field::Password)?)
        .bind(column(row, Field::Note)?)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let id = RowId(result.last_insert_rowid());
        debug!(row_id = %id, "Row inserted into network_rows");
        Ok(id)
    }

    async fn read_all(&self) -> PortResult<Vec<Row>> {
        let records = sqlx::query_as::<_, RowRecord>(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let rows = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(rows)
    }

    async fn find_by_field(&self, field: Field, value: &str) -> PortResult<Vec<Row>> {
        // Column names come from the closed `Field` enum, never from user input.
        let sql = format!(
            "{} WHERE {} = ?1 COLLATE NOCASE ORDER BY id ASC",
            SELECT_COLUMNS,
            field.name()
        );
        let records = sqlx::query_as::<_, RowRecord>(&sql)
            .bind(value.trim())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let rows = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(rows)
    }
}
