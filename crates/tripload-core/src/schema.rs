//! Trip CSV schema validation
//!
//! Validation is column-major: each typed column is coerced as a whole and
//! the first bad value rejects the entire batch. Nothing is admitted
//! partially.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Required trip columns, in warehouse order
pub const EXPECTED_COLUMNS: [&str; 13] = [
    "trip_id",
    "pickup_ts",
    "dropoff_ts",
    "vendor_id",
    "passenger_count",
    "trip_distance",
    "fare_amount",
    "tip_amount",
    "total_amount",
    "pickup_borough",
    "dropoff_borough",
    "payment_type",
    "load_ts",
];

const TIMESTAMP_COLUMNS: [&str; 3] = ["pickup_ts", "dropoff_ts", "load_ts"];
const INTEGER_COLUMNS: [&str; 1] = ["passenger_count"];
const FLOAT_COLUMNS: [&str; 4] = ["trip_distance", "fare_amount", "tip_amount", "total_amount"];

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// One validated trip row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRecord {
    /// Trip identifier (not checked for uniqueness)
    pub trip_id: Option<String>,
    /// Pickup time
    pub pickup_ts: NaiveDateTime,
    /// Dropoff time
    pub dropoff_ts: NaiveDateTime,
    /// Vendor identifier
    pub vendor_id: Option<String>,
    /// Passenger count
    pub passenger_count: i64,
    /// Distance travelled; `None` when the source cell is empty
    pub trip_distance: Option<f64>,
    /// Metered fare
    pub fare_amount: Option<f64>,
    /// Tip
    pub tip_amount: Option<f64>,
    /// Total charged
    pub total_amount: Option<f64>,
    /// Pickup borough
    pub pickup_borough: Option<String>,
    /// Dropoff borough
    pub dropoff_borough: Option<String>,
    /// Payment type
    pub payment_type: Option<String>,
    /// Source extraction time
    pub load_ts: NaiveDateTime,
}

/// Untyped tabular data: a header row plus string cells
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Column names as they appear in the source
    pub headers: Vec<String>,
    /// Data rows; each row is aligned with `headers`
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read a delimited file with a header row
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::SourceNotFound {
                path: path.display().to_string(),
            });
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// A table reduced to a fixed column set, in a fixed order
#[derive(Debug, Clone)]
pub struct ProjectedTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ProjectedTable {
    /// Column names in projected order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn cells<'a>(&'a self, column: &str) -> impl Iterator<Item = &'a str> + 'a {
        let idx = self.columns.iter().position(|c| c == column);
        self.rows
            .iter()
            .map(move |row| idx.and_then(|i| row.get(i)).map_or("", |s| s.as_str()))
    }
}

/// Keep exactly `expected` columns, in that order
///
/// Fails with every missing column, sorted, if any are absent. Extra columns
/// are dropped.
pub fn project(table: &RawTable, expected: &[&str]) -> Result<ProjectedTable> {
    let missing: BTreeSet<&str> = expected
        .iter()
        .copied()
        .filter(|c| table.column_index(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingColumns {
            columns: missing.into_iter().map(str::to_string).collect(),
        });
    }

    let indices: Vec<usize> = expected
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    let rows = table
        .rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(ProjectedTable {
        columns: expected.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

/// Project and coerce a raw table into trip records
pub fn validate(table: &RawTable) -> Result<Vec<TripRecord>> {
    let projected = project(table, &EXPECTED_COLUMNS)?;

    let [pickup, dropoff, load] = TIMESTAMP_COLUMNS.map(|c| coerce_column(&projected, c, parse_timestamp));
    let (pickup, dropoff, load) = (pickup?, dropoff?, load?);
    let passengers = coerce_integer_column(&projected, INTEGER_COLUMNS[0])?;
    let [distance, fare, tip, total] = FLOAT_COLUMNS.map(|c| coerce_float_column(&projected, c));
    let (distance, fare, tip, total) = (distance?, fare?, tip?, total?);

    let text = |column: &str| -> Vec<Option<String>> {
        projected
            .cells(column)
            .map(|v| {
                let v = v.trim();
                (!v.is_empty()).then(|| v.to_string())
            })
            .collect()
    };
    let trip_ids = text("trip_id");
    let vendors = text("vendor_id");
    let pickup_boroughs = text("pickup_borough");
    let dropoff_boroughs = text("dropoff_borough");
    let payment_types = text("payment_type");

    let records = (0..projected.len())
        .map(|i| TripRecord {
            trip_id: trip_ids[i].clone(),
            pickup_ts: pickup[i],
            dropoff_ts: dropoff[i],
            vendor_id: vendors[i].clone(),
            passenger_count: passengers[i],
            trip_distance: distance[i],
            fare_amount: fare[i],
            tip_amount: tip[i],
            total_amount: total[i],
            pickup_borough: pickup_boroughs[i].clone(),
            dropoff_borough: dropoff_boroughs[i].clone(),
            payment_type: payment_types[i].clone(),
            load_ts: load[i],
        })
        .collect();

    Ok(records)
}

/// Read and validate a trip CSV in one step
pub fn read_and_validate(path: &Path) -> Result<Vec<TripRecord>> {
    let table = RawTable::from_csv_path(path)?;
    let records = validate(&table)?;
    tracing::debug!("Validated {} rows from {}", records.len(), path.display());
    Ok(records)
}

fn coerce_column<T>(
    table: &ProjectedTable,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<T>> {
    table
        .cells(column)
        .enumerate()
        .map(|(i, raw)| {
            parse(raw.trim()).ok_or_else(|| Error::InvalidTimestamp {
                column: column.to_string(),
                row: i + 1,
                value: raw.to_string(),
            })
        })
        .collect()
}

fn coerce_integer_column(table: &ProjectedTable, column: &str) -> Result<Vec<i64>> {
    numeric_column(table, column, parse_integer)
}

fn coerce_float_column(table: &ProjectedTable, column: &str) -> Result<Vec<Option<f64>>> {
    numeric_column(table, column, parse_float)
}

fn numeric_column<T>(
    table: &ProjectedTable,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Vec<T>> {
    table
        .cells(column)
        .enumerate()
        .map(|(i, raw)| {
            parse(raw.trim()).ok_or_else(|| Error::InvalidNumeric {
                column: column.to_string(),
                row: i + 1,
                value: raw.to_string(),
            })
        })
        .collect()
}

/// Parse a timestamp; offsets are normalized to UTC and dropped
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Integer coercion; float text is truncated toward zero
fn parse_integer(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    (value.is_finite() && value.abs() < i64::MAX as f64).then(|| value.trunc() as i64)
}

/// Float coercion; empty and NaN cells are admitted as null
fn parse_float(raw: &str) -> Option<Option<f64>> {
    if raw.is_empty() {
        return Some(None);
    }
    let value = raw.parse::<f64>().ok()?;
    Some((!value.is_nan()).then_some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HEADER: &str = "trip_id,pickup_ts,dropoff_ts,vendor_id,passenger_count,trip_distance,\
        fare_amount,tip_amount,total_amount,pickup_borough,dropoff_borough,payment_type,load_ts";

    fn table(header: &str, rows: &[&str]) -> RawTable {
        RawTable {
            headers: header.split(',').map(str::to_string).collect(),
            rows: rows
                .iter()
                .map(|r| r.split(',').map(str::to_string).collect())
                .collect(),
        }
    }

    fn good_row(id: &str) -> String {
        format!(
            "{id},2024-01-01 08:00:00,2024-01-01 08:20:00,V1,2,3.4,14.5,2.0,16.5,Manhattan,Queens,card,2024-01-02T00:00:00Z"
        )
    }

    #[test]
    fn test_validate_good_rows() {
        let rows = [good_row("t-1"), good_row("t-2")];
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        let records = validate(&table(HEADER, &rows)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].trip_id.as_deref(), Some("t-1"));
        assert_eq!(records[0].passenger_count, 2);
        assert_eq!(records[0].total_amount, Some(16.5));
        assert_eq!(
            records[0].load_ts,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_missing_columns_are_sorted() {
        let header = "trip_id,pickup_ts,vendor_id,passenger_count,trip_distance,fare_amount,\
            tip_amount,total_amount,pickup_borough,payment_type";
        let err = validate(&table(header, &[])).unwrap_err();
        match err {
            Error::MissingColumns { columns } => {
                assert_eq!(columns, vec!["dropoff_borough", "dropoff_ts", "load_ts"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_projection_drops_extras_and_reorders() {
        let mut reversed: Vec<&str> = EXPECTED_COLUMNS.iter().rev().copied().collect();
        reversed.push("surcharge");
        let raw = RawTable {
            headers: reversed.iter().map(|s| s.to_string()).collect(),
            rows: vec![reversed.iter().map(|s| format!("v_{s}")).collect()],
        };

        let projected = project(&raw, &EXPECTED_COLUMNS).unwrap();
        assert_eq!(projected.columns(), EXPECTED_COLUMNS.map(String::from));
        assert_eq!(projected.rows[0][0], "v_trip_id");
        assert_eq!(projected.rows[0][12], "v_load_ts");
        assert_eq!(projected.rows[0].len(), 13);
    }

    #[rstest]
    #[case(1, "pickup_ts")]
    #[case(2, "dropoff_ts")]
    #[case(12, "load_ts")]
    fn test_bad_timestamp_rejects_batch(#[case] position: usize, #[case] column: &str) {
        let good = good_row("t-1");
        let mut cells: Vec<String> = good_row("t-2").split(',').map(str::to_string).collect();
        cells[position] = "not-a-date".to_string();
        let bad = cells.join(",");

        let err = validate(&table(HEADER, &[&good, &bad])).unwrap_err();
        match err {
            Error::InvalidTimestamp { column: c, row, .. } => {
                assert_eq!(c, column);
                assert_eq!(row, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_timestamp_is_invalid() {
        let mut cells: Vec<String> = good_row("t-1").split(',').map(str::to_string).collect();
        cells[1].clear();
        let row = cells.join(",");
        assert!(matches!(
            validate(&table(HEADER, &[&row])),
            Err(Error::InvalidTimestamp { .. })
        ));
    }

    #[rstest]
    #[case(4, "two", "passenger_count")]
    #[case(4, "", "passenger_count")]
    #[case(5, "far", "trip_distance")]
    #[case(8, "12.5.0", "total_amount")]
    fn test_bad_numeric_rejects_batch(
        #[case] position: usize,
        #[case] value: &str,
        #[case] column: &str,
    ) {
        let mut cells: Vec<String> = good_row("t-1").split(',').map(str::to_string).collect();
        cells[position] = value.to_string();
        let row = cells.join(",");

        match validate(&table(HEADER, &[&row])).unwrap_err() {
            Error::InvalidNumeric { column: c, .. } => assert_eq!(c, column),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_integral_float_passenger_count() {
        let mut cells: Vec<String> = good_row("t-1").split(',').map(str::to_string).collect();
        cells[4] = "3.0".to_string();
        let row = cells.join(",");
        let records = validate(&table(HEADER, &[&row])).unwrap();
        assert_eq!(records[0].passenger_count, 3);
    }

    #[rstest]
    #[case("2.5", 2)]
    #[case("2.99", 2)]
    #[case("-1.5", -1)]
    #[case("4", 4)]
    fn test_fractional_passenger_count_truncates(#[case] raw: &str, #[case] expected: i64) {
        let mut cells: Vec<String> = good_row("t-1").split(',').map(str::to_string).collect();
        cells[4] = raw.to_string();
        let row = cells.join(",");
        let records = validate(&table(HEADER, &[&row])).unwrap();
        assert_eq!(records[0].passenger_count, expected);
    }

    #[rstest]
    #[case(5)]
    #[case(6)]
    #[case(7)]
    #[case(8)]
    fn test_empty_float_cell_becomes_null(#[case] position: usize) {
        let mut cells: Vec<String> = good_row("t-1").split(',').map(str::to_string).collect();
        cells[position].clear();
        let row = cells.join(",");
        let records = validate(&table(HEADER, &[&row])).unwrap();
        let floats = [
            records[0].trip_distance,
            records[0].fare_amount,
            records[0].tip_amount,
            records[0].total_amount,
        ];
        assert_eq!(floats[position - 5], None);
        assert_eq!(floats.iter().filter(|v| v.is_some()).count(), 3);
    }

    #[test]
    fn test_empty_text_becomes_null() {
        let mut cells: Vec<String> = good_row("t-1").split(',').map(str::to_string).collect();
        cells[9].clear();
        let row = cells.join(",");
        let records = validate(&table(HEADER, &[&row])).unwrap();
        assert_eq!(records[0].pickup_borough, None);
    }

    #[rstest]
    #[case("2024-03-05 10:11:12")]
    #[case("2024-03-05T10:11:12")]
    #[case("2024-03-05 10:11:12.250")]
    #[case("2024-03-05T12:11:12+02:00")]
    #[case("2024-03-05 10:11")]
    fn test_timestamp_formats(#[case] raw: &str) {
        let parsed = parse_timestamp(raw).unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(parsed.format("%H:%M").to_string(), "10:11");
    }

    #[test]
    fn test_date_only_is_midnight() {
        let parsed = parse_timestamp("2024-03-05").unwrap();
        assert_eq!(parsed.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn test_missing_file() {
        let err = RawTable::from_csv_path(Path::new("/nonexistent/trips.csv")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }
}
