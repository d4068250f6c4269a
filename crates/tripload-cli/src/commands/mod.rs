//! CLI command implementations

pub mod dbt;
pub mod ingest;
pub mod pipeline;
pub mod sample;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tripload_core::{MemoryWarehouse, Warehouse, WarehouseConfig};
use tripload_runtime::PgWarehouse;

use crate::local_db::LocalDatabase;

/// Global flags selecting the warehouse backend
pub struct BackendOptions {
    pub local: bool,
    pub dry_run: bool,
    pub local_dir: PathBuf,
    pub local_port: u16,
}

/// The warehouse a command runs against
pub enum Backend {
    DryRun(MemoryWarehouse),
    Postgres {
        warehouse: PgWarehouse,
        local: Option<LocalDatabase>,
    },
}

impl Backend {
    /// Open the backend selected by `options`
    ///
    /// Returns the configuration actually in effect, with the connection
    /// replaced when a local database was started.
    pub async fn open(options: &BackendOptions) -> Result<(Self, WarehouseConfig)> {
        let config = WarehouseConfig::from_env().context("Failed to load warehouse configuration")?;

        if options.dry_run {
            tracing::info!("Dry run: statements go to an in-memory warehouse");
            return Ok((Self::DryRun(MemoryWarehouse::new()), config));
        }

        let (config, local) = if options.local {
            let db = LocalDatabase::start(&options.local_dir, options.local_port, &config.database)
                .await?;
            (config.with_connection(db.connection()), Some(db))
        } else {
            (config, None)
        };

        let warehouse = PgWarehouse::new(&config)?;
        Ok((Self::Postgres { warehouse, local }, config))
    }

    pub fn warehouse(&self) -> &dyn Warehouse {
        match self {
            Self::DryRun(warehouse) => warehouse,
            Self::Postgres { warehouse, .. } => warehouse,
        }
    }

    /// Release the backend; a dry run prints its statement log to stderr
    pub async fn finish(self) -> Result<()> {
        match self {
            Self::DryRun(warehouse) => {
                for statement in warehouse.statements() {
                    eprintln!("{statement};");
                }
                Ok(())
            }
            Self::Postgres { warehouse, local } => {
                warehouse.close().await;
                match local {
                    Some(db) => db.stop().await,
                    None => Ok(()),
                }
            }
        }
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
