//! Native dbt project commands

use anyhow::Result;
use tripload_core::{DeployRequest, DeploymentClient, ExecutionClient};

use super::{Backend, BackendOptions, print_json};

/// Execute a deployed project and print the result
pub async fn execute(options: &BackendOptions, project_fqn: &str, args: &str) -> Result<()> {
    // Reject bad input before a backend (possibly a local server) is started
    ExecutionClient::statement(project_fqn, args)?;

    let (backend, _) = Backend::open(options).await?;
    let result = ExecutionClient::new(backend.warehouse())
        .execute(project_fqn, args)
        .await;
    backend.finish().await?;

    print_json(&result?)
}

/// Deploy a project and print the result
pub async fn deploy(options: &BackendOptions, request: &DeployRequest) -> Result<()> {
    request.validate()?;

    let (backend, _) = Backend::open(options).await?;
    let result = DeploymentClient::new(backend.warehouse())
        .deploy(request)
        .await;
    backend.finish().await?;

    print_json(&result?)
}

/// Combine repeated flags with the comma-separated environment list
///
/// Blank entries are dropped and the first occurrence of a name wins.
pub fn merge_integrations(flags: Vec<String>, from_env: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for name in flags.into_iter().chain(from_env) {
        let name = name.trim();
        if !name.is_empty() && !merged.iter().any(|existing| existing == name) {
            merged.push(name.to_string());
        }
    }
    merged
}
