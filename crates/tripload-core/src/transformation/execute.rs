//! `execute dbt project`

use serde::Serialize;

use crate::error::{Error, Result};
use crate::identifier::ProjectHandle;
use crate::warehouse::{SqlValue, Statement, TransactionMode, Warehouse};

/// Result of one native dbt execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformationExecutionResult {
    /// Project that was executed
    pub project_fqn: ProjectHandle,
    /// Trimmed dbt argument string that was bound
    pub args: String,
    /// Warehouse query id of the run, if reported
    pub query_id: Option<String>,
}

/// Runs deployed dbt projects
pub struct ExecutionClient<'a> {
    warehouse: &'a dyn Warehouse,
}

impl<'a> ExecutionClient<'a> {
    /// Client issuing statements through `warehouse`
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self { warehouse }
    }

    /// Build the statement for `project_fqn` without running it
    pub fn statement(project_fqn: &str, args: &str) -> Result<(ProjectHandle, Statement)> {
        let project = ProjectHandle::parse(project_fqn, "project_fqn")?;
        let args = args.trim();
        if args.is_empty() {
            return Err(Error::EmptyArguments);
        }

        let statement = Statement::new(format!("execute dbt project {project} args = $1"))
            .bind(SqlValue::Text(args.to_string()));
        Ok((project, statement))
    }

    /// Execute `project_fqn` with the dbt CLI arguments `args`
    ///
    /// Not idempotent: every call starts a new dbt run.
    pub async fn execute(
        &self,
        project_fqn: &str,
        args: &str,
    ) -> Result<TransformationExecutionResult> {
        let (project, statement) = Self::statement(project_fqn, args)?;
        let args = args.trim().to_string();

        let mut session = self.warehouse.connect(TransactionMode::Autocommit).await?;
        tracing::info!("Executing native dbt project {} with args={}", project, args);
        let result = session.execute(&statement).await;
        let closed = session.close().await;

        let outcome = result?;
        closed?;

        tracing::info!(
            "Native dbt execution completed for {} (query_id={})",
            project,
            outcome.query_id.as_deref().unwrap_or("unknown")
        );

        Ok(TransformationExecutionResult {
            project_fqn: project,
            args,
            query_id: outcome.query_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;

    #[test]
    fn test_args_are_bound_not_interpolated() {
        let (project, statement) =
            ExecutionClient::statement("DB.S.P", " build --select 'x'; drop ").unwrap();
        assert_eq!(project.as_str(), "DB.S.P");
        assert_eq!(statement.sql, "execute dbt project DB.S.P args = $1");
        assert_eq!(
            statement.params,
            vec![SqlValue::Text("build --select 'x'; drop".into())]
        );
    }

    #[tokio::test]
    async fn test_execute_returns_query_id() {
        let warehouse = MemoryWarehouse::new();
        let result = ExecutionClient::new(&warehouse)
            .execute(" PORTFOLIO_DB.MARTS.TRIPS_DBT_PROJECT ", "build --target prod ")
            .await
            .unwrap();

        assert_eq!(result.project_fqn.as_str(), "PORTFOLIO_DB.MARTS.TRIPS_DBT_PROJECT");
        assert_eq!(result.args, "build --target prod");
        assert!(result.query_id.is_some());
        assert_eq!(warehouse.session_counts(), (1, 1));
    }

    #[tokio::test]
    async fn test_empty_args_fail_before_connecting() {
        let warehouse = MemoryWarehouse::new();
        let err = ExecutionClient::new(&warehouse)
            .execute("DB.S.P", "   ")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmptyArguments));
        assert!(warehouse.statements().is_empty());
        assert_eq!(warehouse.session_counts(), (0, 0));
    }

    #[tokio::test]
    async fn test_bad_project_fails_before_connecting() {
        let warehouse = MemoryWarehouse::new();
        let err = ExecutionClient::new(&warehouse)
            .execute("DB; DROP TABLE X", "build")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidIdentifier { .. }));
        assert_eq!(warehouse.session_counts(), (0, 0));
    }

    #[tokio::test]
    async fn test_session_closed_when_statement_fails() {
        let warehouse = MemoryWarehouse::new().failing_on("execute dbt project");
        let err = ExecutionClient::new(&warehouse)
            .execute("DB.S.P", "run")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Warehouse { .. }));
        assert_eq!(warehouse.session_counts(), (1, 1));
    }
}
