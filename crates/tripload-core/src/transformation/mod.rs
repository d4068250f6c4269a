//! Native dbt project statements
//!
//! Dbt projects live inside the warehouse as objects and are driven with
//! native statements. Object names, branch refs and target names are
//! interpolated into statement text (the dialect cannot bind them) and are
//! therefore allow-listed first; free-text dbt arguments are always bound.

mod deploy;
mod execute;

pub use deploy::{DeployRequest, DeploymentClient, TransformationDeploymentResult, source_location};
pub use execute::{ExecutionClient, TransformationExecutionResult};
