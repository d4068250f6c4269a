//! Pipeline execution engine

use anyhow::Context;
use serde::Serialize;
use tripload_core::{
    ExecutionClient, LoadOutcome, TransactionalLoader, TransformationExecutionResult, Warehouse,
    WarehouseLayout,
};

use crate::error::Result;
use crate::jobs::{PipelineJob, PipelineStep};

/// Outcome of one completed step
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepOutcome {
    /// An ingest step committed
    Ingest(LoadOutcome),
    /// A transform step was issued
    Transform(TransformationExecutionResult),
}

/// Outcome of a whole job
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Job that ran
    pub job: String,
    /// Completed steps, in order
    pub steps: Vec<StepOutcome>,
}

/// Runs pipeline jobs step by step against one warehouse
pub struct Pipeline<'a> {
    warehouse: &'a dyn Warehouse,
    layout: WarehouseLayout,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline writing into `layout`
    pub fn new(warehouse: &'a dyn Warehouse, layout: WarehouseLayout) -> Self {
        Self { warehouse, layout }
    }

    /// Run every step of `job` in order, stopping at the first failure
    pub async fn run(&self, job: &PipelineJob) -> Result<PipelineReport> {
        tracing::info!("Running job '{}' ({} steps)", job.name, job.steps.len());

        let mut report = PipelineReport {
            job: job.name.clone(),
            steps: Vec::with_capacity(job.steps.len()),
        };

        for (index, step) in job.steps.iter().enumerate() {
            tracing::info!("Step {}/{}: {}", index + 1, job.steps.len(), step.label());
            let outcome = self.run_step(step).await.with_context(|| {
                format!(
                    "step {} ({}) of job '{}' failed",
                    index + 1,
                    step.label(),
                    job.name
                )
            })?;
            report.steps.push(outcome);
        }

        tracing::info!("Job '{}' completed", job.name);
        Ok(report)
    }

    async fn run_step(&self, step: &PipelineStep) -> Result<StepOutcome> {
        match step {
            PipelineStep::Ingest { mode, csv_path } => {
                let loader = TransactionalLoader::new(self.warehouse, self.layout.clone());
                let outcome = loader
                    .run_with_report(*mode, csv_path)
                    .await
                    .map_err(|failure| failure.error)?;
                Ok(StepOutcome::Ingest(outcome))
            }
            PipelineStep::Transform { project_fqn, args } => {
                let result = ExecutionClient::new(self.warehouse)
                    .execute(project_fqn, args)
                    .await?;
                tracing::info!(
                    "Native dbt execution query_id={}",
                    result.query_id.as_deref().unwrap_or("unknown")
                );
                Ok(StepOutcome::Transform(result))
            }
        }
    }
}
