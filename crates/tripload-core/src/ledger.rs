//! Load ledger
//!
//! One `LOAD_LOG` row per ingestion attempt. Rows are inserted as RUNNING
//! and closed exactly once as SUCCESS or FAILED; this module never deletes
//! them.

use std::fmt;

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::identifier::QualifiedName;
use crate::warehouse::{Session, SqlValue, Statement};

/// Status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadStatus {
    /// Run in progress (or crashed without closing)
    Running,
    /// Rows written and committed
    Success,
    /// Run failed and was rolled back
    Failed,
}

impl LoadStatus {
    /// Value stored in the `STATUS` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Parse a stored `STATUS` value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingestion attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadLedgerEntry {
    /// Unique token minted at run start
    pub load_id: String,
    /// Rows written; 0 until success
    pub row_count: i64,
    /// When the run started
    pub started_at: NaiveDateTime,
    /// When the run finished; `None` while running
    pub finished_at: Option<NaiveDateTime>,
    /// Current status
    pub status: LoadStatus,
}

impl LoadLedgerEntry {
    /// A fresh RUNNING entry stamped with the current time
    pub fn start(load_id: impl Into<String>) -> Self {
        Self {
            load_id: load_id.into(),
            row_count: 0,
            started_at: Utc::now().naive_utc(),
            finished_at: None,
            status: LoadStatus::Running,
        }
    }
}

/// Writer for the `LOAD_LOG` table
#[derive(Debug, Clone)]
pub struct LoadLedger {
    table: QualifiedName,
}

impl LoadLedger {
    /// Ledger backed by `table`
    pub fn new(table: QualifiedName) -> Self {
        Self { table }
    }

    /// Ledger table name
    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// Insert `entry` as RUNNING
    pub async fn open(&self, session: &mut dyn Session, entry: &LoadLedgerEntry) -> Result<()> {
        session.execute(&self.insert_statement(entry, false)).await?;
        tracing::debug!("Ledger entry {} opened", entry.load_id);
        Ok(())
    }

    /// Close an entry with its final status and row count
    ///
    /// Returns the number of ledger rows updated.
    pub async fn close(
        &self,
        session: &mut dyn Session,
        load_id: &str,
        status: LoadStatus,
        row_count: i64,
    ) -> Result<u64> {
        let outcome = session
            .execute(&self.update_statement(load_id, status, row_count))
            .await?;
        tracing::debug!(
            "Ledger entry {} closed as {} ({} row(s) updated)",
            load_id,
            status,
            outcome.rows_affected
        );
        Ok(outcome.rows_affected)
    }

    /// Record `entry` as FAILED with a zero row count
    ///
    /// If a rollback already discarded the RUNNING row, the FAILED row is
    /// inserted instead, keeping the original start time.
    pub async fn mark_failed(
        &self,
        session: &mut dyn Session,
        entry: &LoadLedgerEntry,
    ) -> Result<()> {
        let updated = self
            .close(session, &entry.load_id, LoadStatus::Failed, 0)
            .await?;
        if updated == 0 {
            let failed = LoadLedgerEntry {
                status: LoadStatus::Failed,
                row_count: 0,
                ..entry.clone()
            };
            session.execute(&self.insert_statement(&failed, true)).await?;
        }
        Ok(())
    }

    fn insert_statement(&self, entry: &LoadLedgerEntry, finished: bool) -> Statement {
        let finished_at = if finished { "current_timestamp" } else { "null" };
        Statement::new(format!(
            "insert into {} (LOAD_ID, ROW_COUNT, STARTED_AT, FINISHED_AT, STATUS) \
             values ($1, $2, $3, {finished_at}, $4)",
            self.table
        ))
        .bind(SqlValue::Text(entry.load_id.clone()))
        .bind(SqlValue::Int(entry.row_count))
        .bind(SqlValue::Timestamp(entry.started_at))
        .bind(SqlValue::Text(entry.status.as_str().to_string()))
    }

    fn update_statement(&self, load_id: &str, status: LoadStatus, row_count: i64) -> Statement {
        Statement::new(format!(
            "update {} set ROW_COUNT = $1, FINISHED_AT = current_timestamp, STATUS = $2 \
             where LOAD_ID = $3",
            self.table
        ))
        .bind(SqlValue::Int(row_count))
        .bind(SqlValue::Text(status.as_str().to_string()))
        .bind(SqlValue::Text(load_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{MemoryWarehouse, TransactionMode, Warehouse};

    fn ledger() -> LoadLedger {
        LoadLedger::new(QualifiedName::parse("RAW.LOAD_LOG", "ledger").unwrap())
    }

    #[test]
    fn test_status_round_trip() {
        for status in [LoadStatus::Running, LoadStatus::Success, LoadStatus::Failed] {
            assert_eq!(LoadStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LoadStatus::parse("running"), None);
    }

    #[test]
    fn test_start_entry() {
        let entry = LoadLedgerEntry::start("abc");
        assert_eq!(entry.status, LoadStatus::Running);
        assert_eq!(entry.row_count, 0);
        assert!(entry.finished_at.is_none());
    }

    #[test]
    fn test_statements_bind_values() {
        let entry = LoadLedgerEntry::start("abc");
        let insert = ledger().insert_statement(&entry, false);
        assert!(insert.sql.starts_with("insert into RAW.LOAD_LOG"));
        assert!(insert.sql.contains("$3, null, $4"));
        assert!(!insert.sql.contains("abc"));
        assert_eq!(insert.params[0], SqlValue::Text("abc".into()));

        let update = ledger().update_statement("abc", LoadStatus::Success, 7);
        assert_eq!(
            update.params,
            vec![
                SqlValue::Int(7),
                SqlValue::Text("SUCCESS".into()),
                SqlValue::Text("abc".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_open_then_close() {
        let warehouse = MemoryWarehouse::new();
        let mut session = warehouse.connect(TransactionMode::Autocommit).await.unwrap();
        let entry = LoadLedgerEntry::start("abc");

        ledger().open(session.as_mut(), &entry).await.unwrap();
        let updated = ledger()
            .close(session.as_mut(), "abc", LoadStatus::Success, 12)
            .await
            .unwrap();
        session.close().await.unwrap();

        assert_eq!(updated, 1);
        let row = warehouse.ledger_entry("abc").unwrap();
        assert_eq!(row.status, LoadStatus::Success);
        assert_eq!(row.row_count, 12);
        assert!(row.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_failed_inserts_when_row_was_rolled_back() {
        let warehouse = MemoryWarehouse::new();
        let entry = LoadLedgerEntry::start("gone");

        let mut session = warehouse.connect(TransactionMode::Explicit).await.unwrap();
        ledger().open(session.as_mut(), &entry).await.unwrap();
        session.rollback().await.unwrap();
        assert!(warehouse.ledger_entry("gone").is_none());

        ledger().mark_failed(session.as_mut(), &entry).await.unwrap();
        session.commit().await.unwrap();
        session.close().await.unwrap();

        let row = warehouse.ledger_entry("gone").unwrap();
        assert_eq!(row.status, LoadStatus::Failed);
        assert_eq!(row.row_count, 0);
        assert_eq!(row.started_at, entry.started_at);
        assert!(row.finished_at.is_some());
    }
}
