//! `create or replace dbt project` from a git repository object

use serde::Serialize;

use crate::error::Result;
use crate::identifier::{ProjectHandle, QualifiedName, validate_ref_path, validate_target};
use crate::warehouse::{Statement, TransactionMode, Warehouse};

/// Unvalidated deployment inputs
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    /// Project object to create or replace
    pub project_fqn: String,
    /// Git repository object holding the dbt sources
    pub git_repo_fqn: String,
    /// Branch to deploy from
    pub branch: String,
    /// Path of the dbt project inside the repository
    pub project_root: String,
    /// Default dbt target of the project
    pub default_target: String,
    /// External access integrations (for `dbt deps` downloads)
    pub external_access_integrations: Vec<String>,
}

/// Result of one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformationDeploymentResult {
    /// Project that was created or replaced
    pub project_fqn: ProjectHandle,
    /// Repository it was deployed from
    pub git_repo_fqn: QualifiedName,
    /// Stage path the project was created from
    pub source_location: String,
}

/// Validated statements for a deployment
#[derive(Debug, Clone)]
struct DeployPlan {
    project: ProjectHandle,
    repo: QualifiedName,
    source_location: String,
    fetch: Statement,
    create: Statement,
}

/// `@{repo}/branches/{branch}/{root}` for already-validated parts
pub fn source_location(repo: &QualifiedName, branch: &str, project_root: &str) -> String {
    format!("@{repo}/branches/{branch}/{project_root}")
}

impl DeployRequest {
    /// Check every field without contacting the warehouse
    pub fn validate(&self) -> Result<()> {
        self.plan().map(|_| ())
    }

    fn plan(&self) -> Result<DeployPlan> {
        let project = ProjectHandle::parse(&self.project_fqn, "project_fqn")?;
        let repo = QualifiedName::parse(&self.git_repo_fqn, "git_repo_fqn")?;
        let branch = validate_ref_path(&self.branch, "branch")?;
        let project_root = validate_ref_path(&self.project_root, "project_root")?;
        let default_target = validate_target(&self.default_target, "default_target")?;
        let integrations = self
            .external_access_integrations
            .iter()
            .map(|i| QualifiedName::parse(i, "external access integration"))
            .collect::<Result<Vec<_>>>()?;

        let source_location = source_location(&repo, &branch, &project_root);

        let mut create = format!(
            "create or replace dbt project {project} from '{source_location}' default_target = '{default_target}'"
        );
        if !integrations.is_empty() {
            let names: Vec<&str> = integrations.iter().map(QualifiedName::as_str).collect();
            create.push_str(&format!(
                " external_access_integrations = ({})",
                names.join(", ")
            ));
        }

        Ok(DeployPlan {
            fetch: Statement::new(format!("alter git repository {repo} fetch")),
            create: Statement::new(create),
            project,
            repo,
            source_location,
        })
    }
}

/// Deploys dbt projects from git repository objects
pub struct DeploymentClient<'a> {
    warehouse: &'a dyn Warehouse,
}

impl<'a> DeploymentClient<'a> {
    /// Client issuing statements through `warehouse`
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse }
    }

    /// Fetch the repository, then create or replace the project
    ///
    /// Every input is validated before a session is opened. Replaces any
    /// existing definition, so retrying with the same inputs is safe.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<TransformationDeploymentResult> {
        let plan = request.plan()?;

        let mut session = self.warehouse.connect(TransactionMode::Autocommit).await?;
        let result = async {
            tracing::info!("Fetching latest refs from {}", plan.repo);
            session.execute(&plan.fetch).await?;

            tracing::info!(
                "Deploying dbt project {} from {}",
                plan.project,
                plan.source_location
            );
            session.execute(&plan.create).await
        }
        .await;
        let closed = session.close().await;

        result?;
        closed?;

        Ok(TransformationDeploymentResult {
            project_fqn: plan.project,
            git_repo_fqn: plan.repo,
            source_location: plan.source_location,
        })
    }
}
