//! Ingest command

use std::path::Path;

use anyhow::Result;
use tripload_core::{FailureLedger, LoadMode, TransactionalLoader};

use super::{Backend, BackendOptions};

/// Load `csv_path` and print the committed load id
pub async fn run(options: &BackendOptions, mode: LoadMode, csv_path: &Path) -> Result<()> {
    let (backend, config) = Backend::open(options).await?;

    let loader = TransactionalLoader::new(backend.warehouse(), config.layout.clone());
    let result = loader.run_with_report(mode, csv_path).await;
    backend.finish().await?;

    match result {
        Ok(outcome) => {
            tracing::info!("✓ Loaded {} rows ({})", outcome.rows, outcome.mode);
            println!("{}", outcome.load_id);
            Ok(())
        }
        Err(failure) => {
            if failure.error.is_validation() {
                tracing::info!(
                    "Check the file offline with: tripload validate --csv-path {}",
                    csv_path.display()
                );
            }
            if let FailureLedger::UpdateFailed(e) = &failure.ledger {
                tracing::warn!(
                    "LOAD_LOG entry {} may still read RUNNING: {}",
                    failure.load_id,
                    e
                );
            }
            Err(anyhow::Error::new(failure.error)
                .context(format!("Ingestion failed for load_id={}", failure.load_id)))
        }
    }
}
