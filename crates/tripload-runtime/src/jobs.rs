//! Pipeline job definitions
//!
//! A job is an ordered list of steps. Two jobs are built in:
//! `daily-elt` (full-refresh ingest, then native dbt build) and
//! `transform-only`. Additional jobs can be declared in YAML:
//!
//! ```yaml
//! - name: nightly-append
//!   steps:
//!     - step: ingest
//!       mode: append
//!       csv_path: data/nightly.csv
//!     - step: transform
//!       project_fqn: PORTFOLIO_DB.MARTS.TRIPS_DBT_PROJECT
//!       args: build --target prod
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tripload_core::LoadMode;

use crate::error::Result;

/// Name of the built-in ingest-then-transform job
pub const DAILY_ELT: &str = "daily-elt";

/// Name of the built-in transform-only job
pub const TRANSFORM_ONLY: &str = "transform-only";

/// One unit of work inside a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PipelineStep {
    /// Load a trip CSV
    Ingest {
        /// Load mode
        #[serde(default)]
        mode: LoadMode,
        /// Source CSV
        csv_path: PathBuf,
    },
    /// Execute a deployed dbt project
    Transform {
        /// Project object name
        project_fqn: String,
        /// dbt CLI arguments
        args: String,
    },
}

impl PipelineStep {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ingest { .. } => "ingest",
            Self::Transform { .. } => "transform",
        }
    }
}

/// A named, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJob {
    /// Job name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Steps, run in order
    pub steps: Vec<PipelineStep>,
}

impl PipelineJob {
    /// Create an empty job
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps: Vec::new(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a step
    pub fn with_step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }
}

/// Inputs for the built-in jobs
#[derive(Debug, Clone)]
pub struct JobDefaults {
    /// Trip CSV for ingest steps
    pub csv_path: PathBuf,
    /// dbt project to execute
    pub project_fqn: String,
    /// dbt arguments
    pub args: String,
}

/// Jobs available to the pipeline command
#[derive(Debug, Clone, Default)]
pub struct JobCatalog {
    jobs: Vec<PipelineJob>,
}

impl JobCatalog {
    /// The built-in jobs
    pub fn builtin(defaults: &JobDefaults) -> Self {
        let transform = PipelineStep::Transform {
            project_fqn: defaults.project_fqn.clone(),
            args: defaults.args.clone(),
        };

        // Full refresh avoids duplicate trip_id accumulation across repeated runs
        let daily = PipelineJob::new(DAILY_ELT)
            .with_description("Full-refresh ingest followed by native dbt execution")
            .with_step(PipelineStep::Ingest {
                mode: LoadMode::FullRefresh,
                csv_path: defaults.csv_path.clone(),
            })
            .with_step(transform.clone());

        let transform_only = PipelineJob::new(TRANSFORM_ONLY)
            .with_description("Native dbt execution without ingestion")
            .with_step(transform);

        Self {
            jobs: vec![daily, transform_only],
        }
    }

    /// Add jobs from a YAML file; later definitions replace earlier ones
    pub fn extend_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file {}", path.display()))?;
        let jobs: Vec<PipelineJob> = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse job file {}", path.display()))?;

        for job in jobs {
            if job.steps.is_empty() {
                anyhow::bail!("job '{}' in {} has no steps", job.name, path.display());
            }
            self.jobs.retain(|existing| existing.name != job.name);
            self.jobs.push(job);
        }
        Ok(())
    }

    /// Look up a job by name
    pub fn get(&self, name: &str) -> Option<&PipelineJob> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// All job names, in definition order
    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }
}
