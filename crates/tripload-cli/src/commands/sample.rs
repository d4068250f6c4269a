//! Generate a sample trip file

use std::path::Path;

use anyhow::{Context, Result};
use tripload_core::sample;

/// Write `rows` seeded trips to `output`
pub fn run(output: &Path, rows: usize, seed: u64) -> Result<()> {
    let written = sample::write_sample(output, rows, seed)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote {} rows to {}", written, output.display());
    Ok(())
}
