//! Tripload Core Library
//!
//! This crate provides the transactional ingestion-and-execution layer:
//! - Trip CSV schema validation and type coercion
//! - Allow-list validation for identifiers interpolated into SQL
//! - The load ledger and the transactional loader
//! - Native dbt project execution and deployment statements
//! - Reproducible sample trip files
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Schema    │────▶│   Loader    │────▶│  Warehouse  │
//! │  Validator  │     │  + Ledger   │     │   Session   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ┌─────────────┐     ┌─────────────┐            ▲
//! │ Identifier  │────▶│ dbt project │────────────┘
//! │  Validator  │     │   clients   │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tripload_core::{LoadMode, TransactionalLoader, WarehouseConfig};
//!
//! let config = WarehouseConfig::from_env()?;
//! let loader = TransactionalLoader::new(&warehouse, config.layout.clone());
//! let load_id = loader.run(LoadMode::FullRefresh, "data/sample_trips.csv".as_ref()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ddl;
pub mod error;
pub mod identifier;
pub mod ledger;
pub mod loader;
pub mod sample;
pub mod schema;
pub mod transformation;
pub mod warehouse;

pub use config::{ConnectionSettings, WarehouseConfig, WarehouseLayout};
pub use error::{Error, Result};
pub use identifier::{ProjectHandle, QualifiedName};
pub use ledger::{LoadLedger, LoadLedgerEntry, LoadStatus};
pub use loader::{FailureLedger, LoadMode, LoadOutcome, RunFailure, TransactionalLoader};
pub use schema::TripRecord;
pub use transformation::{
    DeployRequest, DeploymentClient, ExecutionClient, TransformationDeploymentResult,
    TransformationExecutionResult,
};
pub use warehouse::{MemoryWarehouse, Session, TransactionMode, Warehouse};
