//! Warehouse session abstraction
//!
//! The loader and the dbt project clients talk to the warehouse only
//! through these traits. A [`Session`] is exclusively owned by the
//! operation that opened it and must be closed on every exit path; backends
//! also roll back any open transaction when a session is dropped.

mod memory;

pub use memory::{MemoryState, MemoryWarehouse};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::identifier::QualifiedName;
use crate::schema::TripRecord;

/// Transaction handling requested when opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Every statement commits on its own
    Autocommit,
    /// Statements accumulate until [`Session::commit`] or [`Session::rollback`]
    Explicit,
}

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Text
    Text(String),
    /// 64-bit integer
    Int(i64),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
}

/// SQL text plus positional (`$1`, `$2`, ...) parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Statement text; identifiers must already be validated
    pub sql: String,
    /// Bound parameters, in placeholder order
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Statement without parameters
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Append a bound parameter
    pub fn bind(mut self, value: SqlValue) -> Self {
        self.params.push(value);
        self
    }
}

/// What the warehouse reported for a single statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementOutcome {
    /// Warehouse-assigned query id, when the backend exposes one
    pub query_id: Option<String>,
    /// Rows inserted, updated or deleted
    pub rows_affected: u64,
}

/// Result of a bulk write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Whether the warehouse considers the write complete
    pub success: bool,
    /// Number of batches sent
    pub chunks: usize,
    /// Rows acknowledged by the warehouse
    pub rows: u64,
}

/// Source of warehouse sessions
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Open a new session
    async fn connect(&self, mode: TransactionMode) -> Result<Box<dyn Session>>;
}

/// One warehouse connection
#[async_trait]
pub trait Session: Send {
    /// Execute a statement
    async fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome>;

    /// Bulk-insert trip rows into `table`
    ///
    /// Backends report partial or rejected writes through
    /// [`WriteReport::success`] rather than only through errors.
    async fn write_trips(&mut self, table: &QualifiedName, rows: &[TripRecord])
    -> Result<WriteReport>;

    /// Commit the current transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection, rolling back anything uncommitted
    async fn close(self: Box<Self>) -> Result<()>;
}
