//! Warehouse configuration
//!
//! Configuration is read once per process from environment variables by a
//! pure function ([`WarehouseConfig::from_lookup`]) and then passed
//! explicitly to every component.
//!
//! # Variables
//!
//! - `WAREHOUSE_URL` - full `postgres://` connection URL, or the parts
//!   `WAREHOUSE_HOST`, `WAREHOUSE_USER`, `WAREHOUSE_PASSWORD` and optional
//!   `WAREHOUSE_PORT`
//! - `WAREHOUSE_DATABASE` - database name (default `PORTFOLIO_DB`); connected
//!   to in lower case when the parts are given, and overridden by the
//!   database in `WAREHOUSE_URL` when a URL is given
//! - `WAREHOUSE_SCHEMA_RAW` / `_STAGING` / `_MARTS` - schema names
//! - `WAREHOUSE_QUERY_TAG` - session tag reported to the warehouse

use std::fmt;

use crate::error::{Error, Result};
use crate::identifier::{QualifiedName, validate_identifier};

const DEFAULT_DATABASE: &str = "PORTFOLIO_DB";
const DEFAULT_RAW_SCHEMA: &str = "RAW";
const DEFAULT_STAGING_SCHEMA: &str = "STAGING";
const DEFAULT_MARTS_SCHEMA: &str = "MARTS";
const DEFAULT_QUERY_TAG: &str = "tripload-orchestrated-pipeline";
const DEFAULT_PORT: u16 = 5432;

/// How to reach the warehouse
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionSettings {
    /// Complete connection URL
    Url(String),
    /// Individual connection parameters
    Parts {
        /// Host name
        host: String,
        /// TCP port
        port: u16,
        /// Login user
        user: String,
        /// Login password
        password: String,
    },
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(_) => f.write_str("Url(<redacted>)"),
            Self::Parts {
                host, port, user, ..
            } => f
                .debug_struct("Parts")
                .field("host", host)
                .field("port", port)
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Schema names the loader creates and writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseLayout {
    /// Landing schema for raw trips and the load ledger
    pub raw_schema: QualifiedName,
    /// Schema for staging models
    pub staging_schema: QualifiedName,
    /// Schema for mart models
    pub marts_schema: QualifiedName,
}

impl WarehouseLayout {
    /// Raw trips table
    pub fn trips_table(&self) -> Result<QualifiedName> {
        self.raw_schema.child("TRIPS")
    }

    /// Load ledger table
    pub fn load_log_table(&self) -> Result<QualifiedName> {
        self.raw_schema.child("LOAD_LOG")
    }

    /// All schemas, in creation order
    pub fn schemas(&self) -> [&QualifiedName; 3] {
        [&self.raw_schema, &self.staging_schema, &self.marts_schema]
    }
}

impl Default for WarehouseLayout {
    fn default() -> Self {
        Self {
            raw_schema: QualifiedName::parse(DEFAULT_RAW_SCHEMA, "raw schema")
                .expect("default raw schema is a valid identifier"),
            staging_schema: QualifiedName::parse(DEFAULT_STAGING_SCHEMA, "staging schema")
                .expect("default staging schema is a valid identifier"),
            marts_schema: QualifiedName::parse(DEFAULT_MARTS_SCHEMA, "marts schema")
                .expect("default marts schema is a valid identifier"),
        }
    }
}

/// Process-wide warehouse configuration
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Connection settings, if any were provided
    pub connection: Option<ConnectionSettings>,
    /// Database name
    pub database: String,
    /// Schema layout
    pub layout: WarehouseLayout,
    /// Session tag (reported as the application name)
    pub query_tag: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            connection: None,
            database: DEFAULT_DATABASE.to_string(),
            layout: WarehouseLayout::default(),
            query_tag: DEFAULT_QUERY_TAG.to_string(),
        }
    }
}

impl WarehouseConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let connection = match get("WAREHOUSE_URL") {
            Some(url) => Some(ConnectionSettings::Url(normalize_url(&url)?)),
            None => connection_parts(&get)?,
        };

        let database = get("WAREHOUSE_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let database = validate_identifier(&database, "WAREHOUSE_DATABASE")
            .map_err(|e| Error::configuration(e.to_string()))?;

        let schema = |key: &str, default: &str| {
            let value = get(key).unwrap_or_else(|| default.to_string());
            QualifiedName::parse(&value, key).map_err(|e| Error::configuration(e.to_string()))
        };

        let layout = WarehouseLayout {
            raw_schema: schema("WAREHOUSE_SCHEMA_RAW", DEFAULT_RAW_SCHEMA)?,
            staging_schema: schema("WAREHOUSE_SCHEMA_STAGING", DEFAULT_STAGING_SCHEMA)?,
            marts_schema: schema("WAREHOUSE_SCHEMA_MARTS", DEFAULT_MARTS_SCHEMA)?,
        };

        Ok(Self {
            connection,
            database,
            layout,
            query_tag: get("WAREHOUSE_QUERY_TAG").unwrap_or_else(|| DEFAULT_QUERY_TAG.to_string()),
        })
    }

    /// Replace the connection settings (used for the embedded local database)
    pub fn with_connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Connection settings, or a configuration error if none were given
    pub fn require_connection(&self) -> Result<&ConnectionSettings> {
        self.connection.as_ref().ok_or_else(|| {
            Error::configuration(
                "no warehouse connection configured. Set WAREHOUSE_URL or \
                 WAREHOUSE_HOST/WAREHOUSE_USER/WAREHOUSE_PASSWORD (see .env.example)",
            )
        })
    }
}

fn connection_parts<G>(get: &G) -> Result<Option<ConnectionSettings>>
where
    G: Fn(&str) -> Option<String>,
{
    const REQUIRED: [&str; 3] = ["WAREHOUSE_HOST", "WAREHOUSE_USER", "WAREHOUSE_PASSWORD"];

    let values: Vec<Option<String>> = REQUIRED.iter().map(|key| get(*key)).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let missing: Vec<&str> = REQUIRED
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(key, _)| *key)
        .collect();
    if !missing.is_empty() {
        return Err(Error::configuration(format!(
            "missing warehouse environment variables: {}. Copy .env.example to .env and set the values.",
            missing.join(", ")
        )));
    }

    let port = match get("WAREHOUSE_PORT") {
        Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
            Error::configuration(format!("WAREHOUSE_PORT is not a valid port: {raw:?}"))
        })?,
        None => DEFAULT_PORT,
    };

    let mut values = values.into_iter().flatten();
    match (values.next(), values.next(), values.next()) {
        (Some(host), Some(user), Some(password)) => Ok(Some(ConnectionSettings::Parts {
            host: host.trim().to_string(),
            port,
            user: user.trim().to_string(),
            password,
        })),
        _ => Err(Error::configuration("incomplete warehouse connection parts")),
    }
}

/// Trim, drop trailing slashes and insist on a Postgres scheme
fn normalize_url(raw: &str) -> Result<String> {
    let normalized = raw.trim().trim_end_matches('/');
    if normalized.starts_with("postgres://") || normalized.starts_with("postgresql://") {
        Ok(normalized.to_string())
    } else {
        Err(Error::configuration(
            "WAREHOUSE_URL must start with postgres:// or postgresql://",
        ))
    }
}
