//! In-memory warehouse
//!
//! Understands exactly the statements this crate issues and keeps committed
//! and uncommitted state apart, so load transactions can be exercised
//! without a database. Used for `--dry-run` and throughout the tests.
//! Faults can be injected per statement, per write and per connection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{Session, SqlValue, Statement, StatementOutcome, TransactionMode, Warehouse, WriteReport};
use crate::error::{Error, Result};
use crate::identifier::QualifiedName;
use crate::ledger::{LoadLedgerEntry, LoadStatus};
use crate::schema::TripRecord;

/// Committed contents of a [`MemoryWarehouse`]
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    /// Schemas, tables, repositories and dbt projects, by name
    pub objects: BTreeSet<String>,
    /// Trip tables and their rows
    pub trips: BTreeMap<String, Vec<TripRecord>>,
    /// Load ledger rows, in insertion order
    pub ledger: Vec<LoadLedgerEntry>,
}

#[derive(Debug, Default)]
struct Faults {
    statement_patterns: Vec<String>,
    reject_writes: bool,
    refuse_connections: bool,
}

#[derive(Debug, Default)]
struct Shared {
    committed: MemoryState,
    statements: Vec<String>,
    opened: usize,
    closed: usize,
    next_query: u64,
    faults: Faults,
}

/// Warehouse held entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryWarehouse {
    /// Empty warehouse
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement whose text contains `pattern` (case-insensitive)
    pub fn failing_on(self, pattern: &str) -> Self {
        self.lock()
            .faults
            .statement_patterns
            .push(pattern.to_lowercase());
        self
    }

    /// Report every bulk write as unsuccessful without raising an error
    pub fn rejecting_writes(self) -> Self {
        self.lock().faults.reject_writes = true;
        self
    }

    /// Refuse to open sessions
    pub fn refusing_connections(self) -> Self {
        self.lock().faults.refuse_connections = true;
        self
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> MemoryState {
        self.lock().committed.clone()
    }

    /// Every statement text issued so far, in order
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Sessions opened and closed so far
    pub fn session_counts(&self) -> (usize, usize) {
        let shared = self.lock();
        (shared.opened, shared.closed)
    }

    /// Committed ledger row for `load_id`
    pub fn ledger_entry(&self, load_id: &str) -> Option<LoadLedgerEntry> {
        self.lock()
            .committed
            .ledger
            .iter()
            .find(|e| e.load_id == load_id)
            .cloned()
    }

    /// Committed rows of a trips table
    pub fn trips(&self, table: &str) -> Vec<TripRecord> {
        self.lock()
            .committed
            .trips
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn connect(&self, mode: TransactionMode) -> Result<Box<dyn Session>> {
        let mut shared = self.lock();
        if shared.faults.refuse_connections {
            return Err(Error::warehouse("connection refused"));
        }
        shared.opened += 1;
        let working = shared.committed.clone();
        drop(shared);

        Ok(Box::new(MemorySession {
            warehouse: self.clone(),
            mode,
            working,
        }))
    }
}

struct MemorySession {
    warehouse: MemoryWarehouse,
    mode: TransactionMode,
    working: MemoryState,
}

impl MemorySession {
    fn publish_if_autocommit(&mut self) {
        if self.mode == TransactionMode::Autocommit {
            self.warehouse.lock().committed = self.working.clone();
        }
    }

    fn apply(&mut self, statement: &Statement, query_id: String) -> Result<StatementOutcome> {
        let sql = statement.sql.trim();
        let lower = sql.to_lowercase();
        let mut outcome = StatementOutcome::default();

        if let Some(name) = object_after(sql, "create schema if not exists ") {
            self.working.objects.insert(name);
        } else if let Some(name) = object_after(sql, "create table if not exists ") {
            if !name.ends_with("LOAD_LOG") {
                self.working.trips.entry(name.clone()).or_default();
            }
            self.working.objects.insert(name);
        } else if let Some(name) = object_after(sql, "truncate table ") {
            let rows = self
                .working
                .trips
                .get_mut(&name)
                .ok_or_else(|| Error::warehouse(format!("table {name} does not exist")))?;
            outcome.rows_affected = rows.len() as u64;
            rows.clear();
        } else if lower.starts_with("insert into ") && lower.contains("load_log") {
            let entry = ledger_insert(statement, lower.contains("current_timestamp"))?;
            self.working.ledger.push(entry);
            outcome.rows_affected = 1;
        } else if lower.starts_with("update ") && lower.contains("load_log") {
            outcome.rows_affected = self.ledger_update(statement)?;
        } else if lower.starts_with("execute dbt project ") {
            outcome.query_id = Some(query_id);
        } else if lower.starts_with("alter git repository ") {
            // fetch has no visible effect here
        } else if let Some(name) = object_after(sql, "create or replace dbt project ") {
            self.working.objects.insert(name);
        } else {
            return Err(Error::warehouse(format!("unsupported statement: {sql}")));
        }

        Ok(outcome)
    }

    fn ledger_update(&mut self, statement: &Statement) -> Result<u64> {
        let (row_count, status, load_id) = match statement.params.as_slice() {
            [SqlValue::Int(rows), SqlValue::Text(status), SqlValue::Text(id)] => {
                (*rows, status_param(status)?, id)
            }
            _ => return Err(Error::warehouse("malformed LOAD_LOG update")),
        };

        let now = Utc::now().naive_utc();
        let mut updated = 0;
        for entry in self.working.ledger.iter_mut().filter(|e| &e.load_id == load_id) {
            entry.row_count = row_count;
            entry.status = status;
            entry.finished_at = Some(now);
            updated += 1;
        }
        Ok(updated)
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome> {
        let query_id = {
            let mut shared = self.warehouse.lock();
            shared.statements.push(statement.sql.clone());
            let lower = statement.sql.to_lowercase();
            if shared
                .faults
                .statement_patterns
                .iter()
                .any(|p| lower.contains(p.as_str()))
            {
                return Err(Error::warehouse(format!(
                    "injected failure for statement: {}",
                    statement.sql
                )));
            }
            shared.next_query += 1;
            format!("mem-{:06}", shared.next_query)
        };

        let outcome = self.apply(statement, query_id)?;
        self.publish_if_autocommit();
        Ok(outcome)
    }

    async fn write_trips(
        &mut self,
        table: &QualifiedName,
        rows: &[TripRecord],
    ) -> Result<WriteReport> {
        if self.warehouse.lock().faults.reject_writes {
            return Ok(WriteReport {
                success: false,
                chunks: 1,
                rows: 0,
            });
        }

        let target = self
            .working
            .trips
            .get_mut(table.as_str())
            .ok_or_else(|| Error::warehouse(format!("table {table} does not exist")))?;
        target.extend_from_slice(rows);
        self.publish_if_autocommit();

        Ok(WriteReport {
            success: true,
            chunks: usize::from(!rows.is_empty()),
            rows: rows.len() as u64,
        })
    }

    async fn commit(&mut self) -> Result<()> {
        self.warehouse.lock().committed = self.working.clone();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.working = self.warehouse.lock().committed.clone();
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.warehouse.lock().closed += 1;
        Ok(())
    }
}

/// Object name following `prefix`, up to whitespace or `(`
fn object_after(sql: &str, prefix: &str) -> Option<String> {
    let head = sql.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let name: String = sql[prefix.len()..]
        .trim_start()
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '(')
        .collect();
    (!name.is_empty()).then_some(name)
}

fn ledger_insert(statement: &Statement, finished: bool) -> Result<LoadLedgerEntry> {
    match statement.params.as_slice() {
        [
            SqlValue::Text(load_id),
            SqlValue::Int(row_count),
            SqlValue::Timestamp(started_at),
            SqlValue::Text(status),
        ] => Ok(LoadLedgerEntry {
            load_id: load_id.clone(),
            row_count: *row_count,
            started_at: *started_at,
            finished_at: finished.then(|| Utc::now().naive_utc()),
            status: status_param(status)?,
        }),
        _ => Err(Error::warehouse("malformed LOAD_LOG insert")),
    }
}

fn status_param(value: &str) -> Result<LoadStatus> {
    LoadStatus::parse(value).ok_or_else(|| Error::warehouse(format!("unknown status {value:?}")))
}
