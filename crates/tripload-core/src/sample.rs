//! Reproducible sample trip data
//!
//! Generates synthetic trips with plausible durations, fares and tips for
//! local runs and demos. The same seed always yields the same file.

use std::fs::File;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Gamma;

use crate::error::{Error, Result};
use crate::schema::{EXPECTED_COLUMNS, TripRecord};

const BOROUGHS: [&str; 5] = ["Manhattan", "Brooklyn", "Queens", "Bronx", "Staten Island"];
const PICKUP_WEIGHTS: [f64; 5] = [0.34, 0.27, 0.22, 0.12, 0.05];
const DROPOFF_WEIGHTS: [f64; 5] = [0.31, 0.28, 0.23, 0.12, 0.06];
const VENDORS: [&str; 4] = ["V001", "V002", "V003", "V004"];
const VENDOR_WEIGHTS: [f64; 4] = [0.35, 0.30, 0.20, 0.15];
const PASSENGER_WEIGHTS: [f64; 6] = [0.45, 0.3, 0.12, 0.08, 0.03, 0.02];
const PAYMENT_TYPES: [&str; 3] = ["Card", "Cash", "Other"];
const PAYMENT_WEIGHTS: [f64; 3] = [0.72, 0.24, 0.04];

const DISTANCE_SHAPE: f64 = 2.2;
const DISTANCE_SCALE: f64 = 1.8;

/// Pickups fall within this many minutes of the epoch below (180 days)
const PICKUP_WINDOW_MINUTES: i64 = 180 * 24 * 60;

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn weighted(weights: &[f64]) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(weights)
        .map_err(|e| Error::configuration(format!("invalid sample weights: {e}")))
}

/// Distributions shared by every generated trip
struct Sampler {
    vendor: WeightedIndex<f64>,
    passengers: WeightedIndex<f64>,
    payment: WeightedIndex<f64>,
    pickup: WeightedIndex<f64>,
    dropoff: WeightedIndex<f64>,
    /// Right-skewed, mean about 4 miles
    distance: Gamma<f64>,
}

impl Sampler {
    fn new() -> Result<Self> {
        Ok(Self {
            vendor: weighted(&VENDOR_WEIGHTS)?,
            passengers: weighted(&PASSENGER_WEIGHTS)?,
            payment: weighted(&PAYMENT_WEIGHTS)?,
            pickup: weighted(&PICKUP_WEIGHTS)?,
            dropoff: weighted(&DROPOFF_WEIGHTS)?,
            distance: Gamma::new(DISTANCE_SHAPE, DISTANCE_SCALE)
                .map_err(|e| Error::configuration(format!("invalid distance shape: {e}")))?,
        })
    }

    fn trip(&self, rng: &mut StdRng, index: usize, start: NaiveDateTime) -> TripRecord {
        let pickup_ts = start + Duration::minutes(rng.gen_range(0..=PICKUP_WINDOW_MINUTES));
        let trip_minutes: i64 = rng.gen_range(4..=75);
        let dropoff_ts = pickup_ts + Duration::minutes(trip_minutes);

        let vendor = VENDORS[self.vendor.sample(rng)];
        let passenger_count = self.passengers.sample(rng) as i64 + 1;

        let trip_distance = round2(self.distance.sample(rng).max(0.2));
        let fare_amount = round2(
            (2.5 + trip_distance * 2.1 + trip_minutes as f64 * 0.32 + rng.gen_range(-1.0..2.0))
                .max(2.5),
        );

        let payment_type = PAYMENT_TYPES[self.payment.sample(rng)];
        let tip_rate = match payment_type {
            "Card" => rng.gen_range(0.08..0.30),
            "Cash" => rng.gen_range(0.0..0.07),
            _ => rng.gen_range(0.0..0.12),
        };
        let tip_amount = round2(fare_amount * tip_rate);
        let total_amount = round2(fare_amount + tip_amount + rng.gen_range(0.0..2.75));

        let pickup_borough = BOROUGHS[self.pickup.sample(rng)];
        let dropoff_borough = BOROUGHS[self.dropoff.sample(rng)];
        let load_ts = dropoff_ts + Duration::minutes(rng.gen_range(20..=3 * 24 * 60));

        TripRecord {
            trip_id: Some(format!("T{index:08}")),
            pickup_ts,
            dropoff_ts,
            vendor_id: Some(vendor.to_string()),
            passenger_count,
            trip_distance: Some(trip_distance),
            fare_amount: Some(fare_amount),
            tip_amount: Some(tip_amount),
            total_amount: Some(total_amount),
            pickup_borough: Some(pickup_borough.to_string()),
            dropoff_borough: Some(dropoff_borough.to_string()),
            payment_type: Some(payment_type.to_string()),
            load_ts,
        }
    }
}

/// Generate `rows` trips from `seed`
pub fn generate(rows: usize, seed: u64) -> Result<Vec<TripRecord>> {
    let sampler = Sampler::new()?;
    let mut rng = StdRng::seed_from_u64(seed);
    let start = epoch();

    Ok((1..=rows)
        .map(|index| sampler.trip(&mut rng, index, start))
        .collect())
}

/// Write `records` as a trip CSV, creating parent directories
pub fn write_csv(records: &[TripRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(EXPECTED_COLUMNS)?;

    let ts = |t: &NaiveDateTime| t.format("%Y-%m-%d %H:%M:%S").to_string();
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let amount = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_default();
    for r in records {
        writer.write_record([
            text(&r.trip_id),
            ts(&r.pickup_ts),
            ts(&r.dropoff_ts),
            text(&r.vendor_id),
            r.passenger_count.to_string(),
            amount(r.trip_distance),
            amount(r.fare_amount),
            amount(r.tip_amount),
            amount(r.total_amount),
            text(&r.pickup_borough),
            text(&r.dropoff_borough),
            text(&r.payment_type),
            ts(&r.load_ts),
        ])?;
    }
    writer.flush()?;

    tracing::debug!("Wrote {} sample trips to {}", records.len(), path.display());
    Ok(())
}

/// Generate and write a sample file in one step
pub fn write_sample(path: &Path, rows: usize, seed: u64) -> Result<usize> {
    if rows == 0 {
        return Err(Error::configuration("rows must be at least 1"));
    }
    let records = generate(rows, seed)?;
    write_csv(&records, path)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn test_same_seed_same_trips() {
        assert_eq!(generate(25, 7).unwrap(), generate(25, 7).unwrap());
        assert_ne!(generate(25, 7).unwrap(), generate(25, 8).unwrap());
    }

    #[test]
    fn test_generated_values_are_plausible() {
        for trip in generate(200, 42).unwrap() {
            assert!(trip.dropoff_ts > trip.pickup_ts);
            assert!(trip.load_ts > trip.dropoff_ts);
            assert!((1..=6).contains(&trip.passenger_count));
            let fare = trip.fare_amount.unwrap();
            assert!(trip.trip_distance.unwrap() >= 0.2);
            assert!(fare >= 2.5);
            assert!(trip.total_amount.unwrap() >= fare);
        }
    }

    #[test]
    fn test_every_category_is_drawn() {
        let trips = generate(2_000, 3).unwrap();
        for borough in BOROUGHS {
            assert!(
                trips
                    .iter()
                    .any(|t| t.pickup_borough.as_deref() == Some(borough))
            );
        }
        for payment in PAYMENT_TYPES {
            assert!(
                trips
                    .iter()
                    .any(|t| t.payment_type.as_deref() == Some(payment))
            );
        }
        let mean = trips.iter().filter_map(|t| t.trip_distance).sum::<f64>() / trips.len() as f64;
        assert!((3.0..5.0).contains(&mean), "mean distance {mean}");
    }

    #[test]
    fn test_missing_amount_written_as_empty_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trips.csv");
        let mut trips = generate(1, 42).unwrap();
        trips[0].tip_amount = None;
        write_csv(&trips, &path).unwrap();

        let records = schema::read_and_validate(&path).unwrap();
        assert_eq!(records[0].tip_amount, None);
        assert_eq!(records[0].fare_amount, trips[0].fare_amount);
    }

    #[test]
    fn test_written_sample_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("sample_trips.csv");

        assert_eq!(write_sample(&path, 50, 42).unwrap(), 50);

        let records = schema::read_and_validate(&path).unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(records[0].trip_id.as_deref(), Some("T00000001"));
    }

    #[test]
    fn test_zero_rows_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_sample(&dir.path().join("x.csv"), 0, 1).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
