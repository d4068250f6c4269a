//! Idempotent DDL for the landing schemas and tables

use crate::config::WarehouseLayout;
use crate::error::Result;
use crate::warehouse::Statement;

const TRIPS_COLUMNS: &str = "
    TRIP_ID varchar,
    PICKUP_TS timestamp,
    DROPOFF_TS timestamp,
    VENDOR_ID varchar,
    PASSENGER_COUNT bigint,
    TRIP_DISTANCE double precision,
    FARE_AMOUNT double precision,
    TIP_AMOUNT double precision,
    TOTAL_AMOUNT double precision,
    PICKUP_BOROUGH varchar,
    DROPOFF_BOROUGH varchar,
    PAYMENT_TYPE varchar,
    LOAD_TS timestamp
";

const LOAD_LOG_COLUMNS: &str = "
    LOAD_ID varchar,
    ROW_COUNT bigint,
    STARTED_AT timestamp,
    FINISHED_AT timestamp,
    STATUS varchar
";

/// Trip table columns, in insert order
pub const TRIPS_INSERT_COLUMNS: &str = "TRIP_ID, PICKUP_TS, DROPOFF_TS, VENDOR_ID, PASSENGER_COUNT, \
    TRIP_DISTANCE, FARE_AMOUNT, TIP_AMOUNT, TOTAL_AMOUNT, PICKUP_BOROUGH, DROPOFF_BOROUGH, \
    PAYMENT_TYPE, LOAD_TS";

/// `create ... if not exists` statements for every object the loader needs
pub fn ensure_statements(layout: &WarehouseLayout) -> Result<Vec<Statement>> {
    let mut statements: Vec<Statement> = layout
        .schemas()
        .iter()
        .map(|schema| Statement::new(format!("create schema if not exists {schema}")))
        .collect();

    statements.push(Statement::new(format!(
        "create table if not exists {} ({TRIPS_COLUMNS})",
        layout.trips_table()?
    )));
    statements.push(Statement::new(format!(
        "create table if not exists {} ({LOAD_LOG_COLUMNS})",
        layout.load_log_table()?
    )));

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_statements_are_idempotent_ddl() {
        let statements = ensure_statements(&WarehouseLayout::default()).unwrap();
        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0].sql, "create schema if not exists RAW");
        assert_eq!(statements[2].sql, "create schema if not exists MARTS");
        assert!(statements[3].sql.starts_with("create table if not exists RAW.TRIPS ("));
        assert!(statements[4].sql.starts_with("create table if not exists RAW.LOAD_LOG ("));
        assert!(statements.iter().all(|s| s.params.is_empty()));
        assert!(statements.iter().all(|s| s.sql.contains("if not exists")));
    }

    #[test]
    fn test_trips_table_has_thirteen_columns() {
        assert_eq!(TRIPS_COLUMNS.trim().lines().count(), 13);
        assert_eq!(TRIPS_INSERT_COLUMNS.split(',').count(), 13);
    }
}
