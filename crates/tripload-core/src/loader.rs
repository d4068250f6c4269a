//! Transactional trip loader
//!
//! One run moves a CSV into the trips table inside a single warehouse
//! transaction and records the attempt in the load ledger:
//!
//! ```text
//! Start -> DdlEnsured -> LedgerOpened -> [Truncated] -> Validated -> Written -> LedgerClosed -> commit
//!                              |______________________________________________|
//!                                      failure: rollback, mark FAILED
//! ```
//!
//! Failures before the ledger entry exists are returned without touching
//! the ledger. The session is closed on every path.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::WarehouseLayout;
use crate::ddl;
use crate::error::{Error, Result};
use crate::identifier::QualifiedName;
use crate::ledger::{LoadLedger, LoadLedgerEntry, LoadStatus};
use crate::schema;
use crate::warehouse::{Session, Statement, TransactionMode, Warehouse, WriteReport};

/// How the target table is treated before loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadMode {
    /// Truncate the trips table, then load
    #[default]
    FullRefresh,
    /// Add rows to whatever is already there
    Append,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FullRefresh => "full-refresh",
            Self::Append => "append",
        })
    }
}

/// Progress of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    /// Nothing done yet
    Start,
    /// Schemas and tables exist
    DdlEnsured,
    /// RUNNING ledger entry inserted
    LedgerOpened,
    /// Trips table truncated (full refresh only)
    Truncated,
    /// Source rows validated
    Validated,
    /// Rows written
    Written,
    /// Ledger entry marked SUCCESS
    LedgerClosed,
}

/// A committed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    /// Ledger id of the run
    pub load_id: String,
    /// Mode the run used
    pub mode: LoadMode,
    /// Rows written
    pub rows: u64,
    /// Write batches
    pub chunks: usize,
}

/// What happened to the ledger after a failed run
#[derive(Debug)]
pub enum FailureLedger {
    /// The run failed before a ledger entry existed
    NotOpened,
    /// The entry was recorded as FAILED
    MarkedFailed,
    /// Recording FAILED itself failed; the entry may still read RUNNING
    UpdateFailed(Error),
}

/// A failed run
#[derive(Debug)]
pub struct RunFailure {
    /// Ledger id of the run
    pub load_id: String,
    /// Last stage reached before the failure
    pub stage: LoadStage,
    /// The error that aborted the run
    pub error: Error,
    /// Outcome of the best-effort ledger update
    pub ledger: FailureLedger,
}

/// Everything one ingestion run works against
struct LoadRun<'r> {
    ledger: LoadLedger,
    entry: LoadLedgerEntry,
    trips_table: QualifiedName,
    mode: LoadMode,
    source: &'r Path,
}

/// Runs ingestion transactions against a warehouse
pub struct TransactionalLoader<'a> {
    warehouse: &'a dyn Warehouse,
    layout: WarehouseLayout,
}

impl<'a> TransactionalLoader<'a> {
    /// Loader writing into the tables of `layout`
    pub fn new(warehouse: &'a dyn Warehouse, layout: WarehouseLayout) -> Self {
        Self { warehouse, layout }
    }

    /// Load `source` and return the run's `load_id`
    ///
    /// On failure the original error is returned; see [`Self::run_with_report`]
    /// for the ledger outcome.
    pub async fn run(&self, mode: LoadMode, source: &Path) -> Result<String> {
        self.run_with_report(mode, source)
            .await
            .map(|outcome| outcome.load_id)
            .map_err(|failure| failure.error)
    }

    /// Load `source`, reporting the ledger outcome on failure
    pub async fn run_with_report(
        &self,
        mode: LoadMode,
        source: &Path,
    ) -> std::result::Result<LoadOutcome, RunFailure> {
        let load_id = Uuid::new_v4().to_string();

        tracing::info!("Starting ingestion with load_id={}", load_id);
        tracing::info!("Mode: {}", mode);
        tracing::info!("CSV source: {}", source.display());

        let not_opened = |error: Error| RunFailure {
            load_id: load_id.clone(),
            stage: LoadStage::Start,
            error,
            ledger: FailureLedger::NotOpened,
        };

        let (trips_table, ledger) = match self.tables() {
            Ok(tables) => tables,
            Err(e) => return Err(not_opened(e)),
        };
        let mut session = match self.warehouse.connect(TransactionMode::Explicit).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Ingestion failed for load_id={}: {}", load_id, e);
                return Err(not_opened(e));
            }
        };

        let run = LoadRun {
            ledger,
            entry: LoadLedgerEntry::start(&load_id),
            trips_table,
            mode,
            source,
        };
        let mut stage = LoadStage::Start;
        let result = self.load(session.as_mut(), &run, &mut stage).await;

        let outcome = match result {
            Ok(report) => {
                tracing::info!("Ingestion completed successfully with load_id={}", load_id);
                Ok(LoadOutcome {
                    load_id: load_id.clone(),
                    mode,
                    rows: report.rows,
                    chunks: report.chunks,
                })
            }
            Err(error) => {
                let ledger_outcome = recover(session.as_mut(), &run, stage).await;
                tracing::error!(
                    "Ingestion failed for load_id={} at stage {:?}: {}",
                    load_id,
                    stage,
                    error
                );
                Err(RunFailure {
                    load_id: load_id.clone(),
                    stage,
                    error,
                    ledger: ledger_outcome,
                })
            }
        };

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close warehouse session for load_id={}: {}", load_id, e);
        }

        outcome
    }

    fn tables(&self) -> Result<(QualifiedName, LoadLedger)> {
        Ok((
            self.layout.trips_table()?,
            LoadLedger::new(self.layout.load_log_table()?),
        ))
    }

    async fn load(
        &self,
        session: &mut dyn Session,
        run: &LoadRun<'_>,
        stage: &mut LoadStage,
    ) -> Result<WriteReport> {
        let LoadRun {
            ledger,
            entry,
            trips_table,
            mode,
            source,
        } = run;

        for statement in ddl::ensure_statements(&self.layout)? {
            session.execute(&statement).await?;
        }
        // DDL is durable on its own so the ledger table outlives a rollback
        session.commit().await?;
        *stage = LoadStage::DdlEnsured;

        ledger.open(session, entry).await?;
        *stage = LoadStage::LedgerOpened;

        if *mode == LoadMode::FullRefresh {
            tracing::info!("Truncating {}", trips_table);
            session
                .execute(&Statement::new(format!("truncate table {trips_table}")))
                .await?;
            *stage = LoadStage::Truncated;
        }

        let records = schema::read_and_validate(source)?;
        *stage = LoadStage::Validated;

        let report = session.write_trips(trips_table, &records).await?;
        if !report.success {
            return Err(Error::WriteFailure {
                table: trips_table.to_string(),
                expected: records.len(),
                written: report.rows,
            });
        }
        *stage = LoadStage::Written;
        tracing::info!("Loaded {} rows across {} chunk(s)", report.rows, report.chunks);

        let row_count = i64::try_from(report.rows).unwrap_or(i64::MAX);
        ledger
            .close(session, &entry.load_id, LoadStatus::Success, row_count)
            .await?;
        *stage = LoadStage::LedgerClosed;

        session.commit().await?;
        Ok(report)
    }
}

/// Roll back, then mark the ledger entry FAILED if one was opened
async fn recover(session: &mut dyn Session, run: &LoadRun<'_>, stage: LoadStage) -> FailureLedger {
    let LoadRun { ledger, entry, .. } = run;
    if let Err(e) = session.rollback().await {
        tracing::error!("Rollback failed for load_id={}: {}", entry.load_id, e);
    }

    if stage < LoadStage::LedgerOpened {
        return FailureLedger::NotOpened;
    }

    let marked: Result<()> = async {
        ledger.mark_failed(session, entry).await?;
        session.commit().await
    }
    .await;

    match marked {
        Ok(()) => FailureLedger::MarkedFailed,
        Err(e) => {
            tracing::error!(
                "Failed to update LOAD_LOG status after ingestion error for load_id={}: {}",
                entry.load_id,
                e
            );
            FailureLedger::UpdateFailed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use std::io::Write;

    const HEADER: &str = "trip_id,pickup_ts,dropoff_ts,vendor_id,passenger_count,trip_distance,\
        fare_amount,tip_amount,total_amount,pickup_borough,dropoff_borough,payment_type,load_ts";

    fn csv_file(rows: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    fn row(id: &str) -> String {
        format!(
            "{id},2024-01-01 08:00:00,2024-01-01 08:30:00,V1,1,2.5,12.0,1.5,13.5,Brooklyn,Manhattan,cash,2024-01-02 00:00:00"
        )
    }

    #[test]
    fn test_mode_display_and_default() {
        assert_eq!(LoadMode::default(), LoadMode::FullRefresh);
        assert_eq!(LoadMode::FullRefresh.to_string(), "full-refresh");
        assert_eq!(LoadMode::Append.to_string(), "append");
    }

    #[test]
    fn test_stage_order() {
        assert!(LoadStage::DdlEnsured < LoadStage::LedgerOpened);
        assert!(LoadStage::Truncated > LoadStage::LedgerOpened);
    }

    #[tokio::test]
    async fn test_statement_order_for_full_refresh() {
        let warehouse = MemoryWarehouse::new();
        let (a, b) = (row("a"), row("b"));
        let file = csv_file(&[&a, &b]);

        let loader = TransactionalLoader::new(&warehouse, WarehouseLayout::default());
        let outcome = loader
            .run_with_report(LoadMode::FullRefresh, file.path())
            .await
            .unwrap();
        assert_eq!(outcome.rows, 2);

        let statements = warehouse.statements();
        let position = |needle: &str| {
            statements
                .iter()
                .position(|s| s.starts_with(needle))
                .unwrap_or_else(|| panic!("missing statement {needle}"))
        };
        assert!(position("create table if not exists RAW.LOAD_LOG") < position("insert into RAW.LOAD_LOG"));
        assert!(position("insert into RAW.LOAD_LOG") < position("truncate table RAW.TRIPS"));
        assert!(position("truncate table RAW.TRIPS") < position("update RAW.LOAD_LOG"));
    }

    #[tokio::test]
    async fn test_connection_failure_never_touches_ledger() {
        let warehouse = MemoryWarehouse::new().refusing_connections();
        let file = csv_file(&[]);
        let loader = TransactionalLoader::new(&warehouse, WarehouseLayout::default());

        let failure = loader
            .run_with_report(LoadMode::Append, file.path())
            .await
            .unwrap_err();
        assert!(matches!(failure.ledger, FailureLedger::NotOpened));
        assert_eq!(failure.stage, LoadStage::Start);
        assert!(warehouse.statements().is_empty());
    }

    #[tokio::test]
    async fn test_ddl_failure_is_not_opened() {
        let warehouse = MemoryWarehouse::new().failing_on("create table");
        let file = csv_file(&[]);
        let loader = TransactionalLoader::new(&warehouse, WarehouseLayout::default());

        let failure = loader
            .run_with_report(LoadMode::FullRefresh, file.path())
            .await
            .unwrap_err();
        assert!(matches!(failure.ledger, FailureLedger::NotOpened));
        assert!(!warehouse.statements().iter().any(|s| s.contains("LOAD_LOG set")));
        assert_eq!(warehouse.session_counts(), (1, 1));
    }

    fn append_run<'r>(source: &'r Path, load_id: &str) -> LoadRun<'r> {
        let layout = WarehouseLayout::default();
        LoadRun {
            ledger: LoadLedger::new(layout.load_log_table().unwrap()),
            entry: LoadLedgerEntry::start(load_id),
            trips_table: layout.trips_table().unwrap(),
            mode: LoadMode::Append,
            source,
        }
    }

    #[tokio::test]
    async fn test_append_run_reaches_ledger_closed_without_truncate() {
        let warehouse = MemoryWarehouse::new();
        let a = row("a");
        let file = csv_file(&[&a]);
        let loader = TransactionalLoader::new(&warehouse, WarehouseLayout::default());
        let run = append_run(file.path(), "run-1");

        let mut session = warehouse.connect(TransactionMode::Explicit).await.unwrap();
        let mut stage = LoadStage::Start;
        let report = loader.load(session.as_mut(), &run, &mut stage).await.unwrap();
        session.close().await.unwrap();

        assert_eq!(report.rows, 1);
        assert_eq!(stage, LoadStage::LedgerClosed);
        assert!(!warehouse.statements().iter().any(|s| s.starts_with("truncate")));
    }

    #[tokio::test]
    async fn test_recover_before_ledger_opened_leaves_ledger_alone() {
        let warehouse = MemoryWarehouse::new();
        let file = csv_file(&[]);
        let run = append_run(file.path(), "run-2");

        let mut session = warehouse.connect(TransactionMode::Explicit).await.unwrap();
        let ledger = recover(session.as_mut(), &run, LoadStage::DdlEnsured).await;
        session.close().await.unwrap();

        assert!(matches!(ledger, FailureLedger::NotOpened));
        assert!(!warehouse.statements().iter().any(|s| s.contains("LOAD_LOG")));
    }
}
