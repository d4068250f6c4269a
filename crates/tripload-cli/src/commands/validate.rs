//! Validate a trip CSV offline

use std::path::Path;

use anyhow::{Context, Result};
use tripload_core::schema;

/// Run the validate command
pub fn run(csv_path: &Path) -> Result<()> {
    tracing::info!("Validating {}", csv_path.display());

    let records = schema::read_and_validate(csv_path)
        .with_context(|| format!("{} is not a valid trip file", csv_path.display()))?;

    tracing::info!("✓ All {} columns present", schema::EXPECTED_COLUMNS.len());
    println!("{} rows valid", records.len());
    Ok(())
}
