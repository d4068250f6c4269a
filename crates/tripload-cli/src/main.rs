//! Tripload CLI
//!
//! Operator tool for trip ingestion, native dbt execution and pipeline jobs.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod local_db;

use commands::BackendOptions;

/// Tripload - transactional trip ingestion and dbt orchestration
#[derive(Parser)]
#[command(name = "tripload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Run against an embedded local PostgreSQL
    #[arg(long, global = true, conflicts_with = "dry_run")]
    local: bool,

    /// Run against an in-memory warehouse and print every statement
    #[arg(long, global = true)]
    dry_run: bool,

    /// Data directory for the embedded database
    #[arg(long, global = true, env = "TRIPLOAD_LOCAL_DIR", default_value = ".tripload")]
    local_dir: PathBuf,

    /// Port for the embedded database
    #[arg(long, global = true, env = "TRIPLOAD_LOCAL_PORT", default_value_t = 5433)]
    local_port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a trip CSV into the raw trips table
    Ingest {
        /// Truncate the trips table before loading (default)
        #[arg(long, conflicts_with = "append")]
        full_refresh: bool,

        /// Keep existing rows and append
        #[arg(long)]
        append: bool,

        /// Source CSV
        #[arg(long, default_value = "data/sample_trips.csv")]
        csv_path: PathBuf,
    },

    /// Validate a trip CSV without touching the warehouse
    Validate {
        /// Source CSV
        #[arg(long, default_value = "data/sample_trips.csv")]
        csv_path: PathBuf,
    },

    /// Write a reproducible sample trip CSV
    Sample {
        /// Number of trips
        #[arg(long, default_value_t = 10_000)]
        rows: usize,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output path
        #[arg(long, default_value = "data/sample_trips.csv")]
        output: PathBuf,
    },

    /// Manage native dbt projects
    Dbt {
        #[command(subcommand)]
        command: DbtCommands,
    },

    /// Run a pipeline job
    Pipeline {
        /// Job name (daily-elt, transform-only, or one from --jobs-file)
        job: String,

        /// YAML file with additional job definitions
        #[arg(long)]
        jobs_file: Option<PathBuf>,

        /// Source CSV for ingest steps of built-in jobs
        #[arg(long, default_value = "data/sample_trips.csv")]
        csv_path: PathBuf,

        #[command(flatten)]
        project: ExecuteArgs,
    },
}

#[derive(Subcommand)]
enum DbtCommands {
    /// Execute a deployed dbt project
    Execute(ExecuteArgs),

    /// Create or replace a dbt project from a git repository object
    Deploy(DeployArgs),
}

/// Which project to execute, and how
#[derive(Args)]
struct ExecuteArgs {
    /// dbt project object
    #[arg(
        long,
        env = "DBT_PROJECT_FQN",
        default_value = "PORTFOLIO_DB.MARTS.TRIPS_DBT_PROJECT"
    )]
    project_fqn: String,

    /// dbt CLI arguments
    #[arg(
        long,
        env = "DBT_ARGS",
        default_value = "build --target prod",
        allow_hyphen_values = true
    )]
    args: String,
}

#[derive(Args)]
struct DeployArgs {
    /// dbt project object to create or replace
    #[arg(
        long,
        env = "DBT_PROJECT_FQN",
        default_value = "PORTFOLIO_DB.MARTS.TRIPS_DBT_PROJECT"
    )]
    project_fqn: String,

    /// Git repository object
    #[arg(
        long,
        env = "DBT_GIT_REPO_FQN",
        default_value = "PORTFOLIO_DB.RAW.PORTFOLIO_GIT_REPO"
    )]
    git_repo_fqn: String,

    /// Branch to deploy from
    #[arg(long, env = "DBT_BRANCH", default_value = "main")]
    branch: String,

    /// dbt project path inside the repository
    #[arg(long, env = "DBT_PROJECT_ROOT", default_value = "dbt")]
    project_root: String,

    /// Default dbt target
    #[arg(long, env = "DBT_DEFAULT_TARGET", default_value = "prod")]
    default_target: String,

    /// External access integration (repeatable)
    #[arg(long = "external-access-integration")]
    external_access_integration: Vec<String>,

    /// Comma-separated integrations from the environment
    #[arg(
        long,
        env = "DBT_EXTERNAL_ACCESS_INTEGRATIONS",
        value_delimiter = ',',
        hide = true
    )]
    external_access_integrations: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let backend = BackendOptions {
        local: cli.local,
        dry_run: cli.dry_run,
        local_dir: cli.local_dir,
        local_port: cli.local_port,
    };

    match cli.command {
        Commands::Ingest {
            full_refresh: _,
            append,
            csv_path,
        } => {
            let mode = if append {
                tripload_core::LoadMode::Append
            } else {
                tripload_core::LoadMode::FullRefresh
            };
            commands::ingest::run(&backend, mode, &csv_path).await?;
        }
        Commands::Validate { csv_path } => {
            commands::validate::run(&csv_path)?;
        }
        Commands::Sample { rows, seed, output } => {
            commands::sample::run(&output, rows, seed)?;
        }
        Commands::Dbt { command } => match command {
            DbtCommands::Execute(args) => {
                commands::dbt::execute(&backend, &args.project_fqn, &args.args).await?;
            }
            DbtCommands::Deploy(args) => {
                let request = tripload_core::DeployRequest {
                    project_fqn: args.project_fqn,
                    git_repo_fqn: args.git_repo_fqn,
                    branch: args.branch,
                    project_root: args.project_root,
                    default_target: args.default_target,
                    external_access_integrations: commands::dbt::merge_integrations(
                        args.external_access_integration,
                        args.external_access_integrations,
                    ),
                };
                commands::dbt::deploy(&backend, &request).await?;
            }
        },
        Commands::Pipeline {
            job,
            jobs_file,
            csv_path,
            project,
        } => {
            let defaults = tripload_runtime::JobDefaults {
                csv_path,
                project_fqn: project.project_fqn,
                args: project.args,
            };
            commands::pipeline::run(&backend, &job, jobs_file.as_deref(), &defaults).await?;
        }
    }

    Ok(())
}
