//! Pipeline command

use std::path::Path;

use anyhow::Result;
use tripload_runtime::{JobCatalog, JobDefaults, Pipeline};

use super::{Backend, BackendOptions, print_json};

/// Run the named job and print its report
pub async fn run(
    options: &BackendOptions,
    job: &str,
    jobs_file: Option<&Path>,
    defaults: &JobDefaults,
) -> Result<()> {
    let mut catalog = JobCatalog::builtin(defaults);
    if let Some(path) = jobs_file {
        catalog.extend_from_file(path)?;
    }

    let Some(job) = catalog.get(job) else {
        anyhow::bail!(
            "unknown job '{}'. Available jobs: {}",
            job,
            catalog.names().join(", ")
        );
    };

    let (backend, config) = Backend::open(options).await?;
    let report = Pipeline::new(backend.warehouse(), config.layout.clone())
        .run(job)
        .await;
    backend.finish().await?;

    print_json(&report?)
}
