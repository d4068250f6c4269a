//! PostgreSQL warehouse backend
//!
//! Each [`PgWarehouse`] owns a pool capped at a single connection, so a
//! session always has the connection to itself. Explicit sessions hold a
//! `sqlx` transaction, which rolls back on drop if it was never committed.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tripload_core::ddl::TRIPS_INSERT_COLUMNS;
use tripload_core::warehouse::{SqlValue, Statement, StatementOutcome, WriteReport};
use tripload_core::{
    ConnectionSettings, Error, QualifiedName, Result, Session, TransactionMode, TripRecord,
    Warehouse, WarehouseConfig,
};

/// Rows per insert batch (13 binds per row stays well under the 65535 limit)
const CHUNK_ROWS: usize = 1000;

/// Warehouse backed by a PostgreSQL database
#[derive(Debug, Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    /// Build a warehouse from configuration
    ///
    /// No connection is made until the first session is opened.
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close the pool, waiting for open connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connection options for the configured warehouse, tagged with the query tag
///
/// A database named in `WAREHOUSE_URL` wins over `WAREHOUSE_DATABASE`. On the
/// host/port path the database name is folded to lower case, matching how
/// Postgres resolves unquoted identifiers and how the embedded database is
/// created.
pub fn connect_options(config: &WarehouseConfig) -> Result<PgConnectOptions> {
    let options = match config.require_connection()? {
        ConnectionSettings::Url(url) => url
            .parse::<PgConnectOptions>()
            .map_err(|e| Error::configuration(format!("invalid WAREHOUSE_URL: {e}")))?,
        ConnectionSettings::Parts {
            host,
            port,
            user,
            password,
        } => PgConnectOptions::new()
            .host(host)
            .port(*port)
            .username(user)
            .password(password)
            .database(&config.database.to_lowercase()),
    };
    Ok(options.application_name(&config.query_tag))
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn connect(&self, mode: TransactionMode) -> Result<Box<dyn Session>> {
        let tx = match mode {
            TransactionMode::Explicit => Some(self.pool.begin().await.map_err(Error::warehouse)?),
            TransactionMode::Autocommit => None,
        };
        tracing::debug!("Opened warehouse session ({:?})", mode);
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            mode,
            tx,
        }))
    }
}

struct PgSession {
    pool: PgPool,
    mode: TransactionMode,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    /// Current transaction, beginning a new one after a commit or rollback
    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await.map_err(Error::warehouse)?);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| Error::warehouse("transaction unavailable"))
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Text(value) => query.bind(value.as_str()),
            SqlValue::Int(value) => query.bind(*value),
            SqlValue::Timestamp(value) => query.bind(*value),
        };
    }
    query
}

fn insert_builder(table: &QualifiedName, chunk: &[TripRecord]) -> QueryBuilder<'static, Postgres> {
    let mut builder =
        QueryBuilder::new(format!("insert into {table} ({TRIPS_INSERT_COLUMNS}) "));
    builder.push_values(chunk, |mut row, trip| {
        row.push_bind(trip.trip_id.clone())
            .push_bind(trip.pickup_ts)
            .push_bind(trip.dropoff_ts)
            .push_bind(trip.vendor_id.clone())
            .push_bind(trip.passenger_count)
            .push_bind(trip.trip_distance)
            .push_bind(trip.fare_amount)
            .push_bind(trip.tip_amount)
            .push_bind(trip.total_amount)
            .push_bind(trip.pickup_borough.clone())
            .push_bind(trip.dropoff_borough.clone())
            .push_bind(trip.payment_type.clone())
            .push_bind(trip.load_ts);
    });
    builder
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, statement: &Statement) -> Result<StatementOutcome> {
        tracing::debug!("Executing: {}", statement.sql);
        let query = bind_params(sqlx::query(&statement.sql), &statement.params);
        let result = match self.mode {
            TransactionMode::Autocommit => query.execute(&self.pool).await,
            TransactionMode::Explicit => {
                let tx = self.transaction().await?;
                query.execute(&mut **tx).await
            }
        }
        .map_err(Error::warehouse)?;

        // Postgres assigns no query id to a statement
        Ok(StatementOutcome {
            query_id: None,
            rows_affected: result.rows_affected(),
        })
    }

    async fn write_trips(
        &mut self,
        table: &QualifiedName,
        rows: &[TripRecord],
    ) -> Result<WriteReport> {
        let mut written = 0u64;
        let mut chunks = 0usize;

        for chunk in rows.chunks(CHUNK_ROWS) {
            let mut builder = insert_builder(table, chunk);
            let query = builder.build();
            let result = match self.mode {
                TransactionMode::Autocommit => query.execute(&self.pool).await,
                TransactionMode::Explicit => {
                    let tx = self.transaction().await?;
                    query.execute(&mut **tx).await
                }
            }
            .map_err(Error::warehouse)?;

            written += result.rows_affected();
            chunks += 1;
            tracing::debug!("Wrote chunk {} ({} rows) into {}", chunks, chunk.len(), table);
        }

        Ok(WriteReport {
            success: written == rows.len() as u64,
            chunks,
            rows: written,
        })
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await.map_err(Error::warehouse)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(Error::warehouse)?;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let PgSession { tx, .. } = *self;
        if let Some(tx) = tx {
            tx.rollback().await.map_err(Error::warehouse)?;
        }
        tracing::debug!("Closed warehouse session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> WarehouseConfig {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WarehouseConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_connect_options_from_url() {
        let options = connect_options(&config(&[(
            "WAREHOUSE_URL",
            "postgres://loader:pw@db.internal:6543/trips",
        )]))
        .unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("trips"));
        assert_eq!(
            options.get_application_name(),
            Some("tripload-orchestrated-pipeline")
        );
    }

    #[test]
    fn test_connect_options_from_parts() {
        let options = connect_options(&config(&[
            ("WAREHOUSE_HOST", "db"),
            ("WAREHOUSE_USER", "loader"),
            ("WAREHOUSE_PASSWORD", "pw"),
            ("WAREHOUSE_DATABASE", "ANALYTICS"),
        ]))
        .unwrap();
        assert_eq!(options.get_username(), "loader");
        assert_eq!(options.get_database(), Some("analytics"));
    }

    #[test]
    fn test_url_database_wins_over_warehouse_database() {
        let options = connect_options(&config(&[
            ("WAREHOUSE_URL", "postgres://loader:pw@db/trips"),
            ("WAREHOUSE_DATABASE", "ANALYTICS"),
        ]))
        .unwrap();
        assert_eq!(options.get_database(), Some("trips"));
    }

    #[test]
    fn test_missing_connection_is_configuration_error() {
        let err = connect_options(&config(&[])).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_insert_builder_sql() {
        let table = QualifiedName::parse("RAW.TRIPS", "table").unwrap();
        let ts = midnight();
        let trip = TripRecord {
            trip_id: Some("t1".into()),
            pickup_ts: ts,
            dropoff_ts: ts,
            vendor_id: None,
            passenger_count: 1,
            trip_distance: Some(1.0),
            fare_amount: Some(1.0),
            tip_amount: None,
            total_amount: Some(1.0),
            pickup_borough: None,
            dropoff_borough: None,
            payment_type: None,
            load_ts: ts,
        };
        let builder = insert_builder(&table, &[trip.clone(), trip]);
        let sql = builder.sql();
        assert!(sql.starts_with("insert into RAW.TRIPS (TRIP_ID, PICKUP_TS"));
        assert!(sql.contains("$26"));
        assert!(!sql.contains("$27"));
    }

    fn midnight() -> sqlx::types::chrono::NaiveDateTime {
        tripload_core::schema::parse_timestamp("2024-01-01 00:00:00").unwrap()
    }
}
