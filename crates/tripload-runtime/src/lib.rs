//! Tripload Runtime
//!
//! This crate connects the core loader and dbt clients to a real warehouse
//! and sequences them into pipeline jobs.
//!
//! # Features
//!
//! - Postgres warehouse backend via sqlx
//! - Built-in and YAML-declared pipeline jobs
//! - Sequential pipeline engine
//!
//! # Usage
//!
//! ```rust,ignore
//! use tripload_runtime::{JobCatalog, PgWarehouse, Pipeline};
//!
//! let warehouse = PgWarehouse::new(&config)?;
//! let report = Pipeline::new(&warehouse, config.layout.clone())
//!     .run(catalog.get("daily-elt").unwrap())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod jobs;
pub mod postgres;

pub use engine::{Pipeline, PipelineReport, StepOutcome};
pub use error::{Error, Result};
pub use jobs::{JobCatalog, JobDefaults, PipelineJob, PipelineStep};
pub use postgres::PgWarehouse;
