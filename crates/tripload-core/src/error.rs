//! Error types for tripload-core

use thiserror::Error;

/// Result type alias for tripload-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tripload-core
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid connection/environment configuration
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of what's missing or invalid
        message: String,
    },

    /// Source file does not exist
    #[error("input CSV not found: {path}")]
    SourceNotFound {
        /// Path that was requested
        path: String,
    },

    /// Source dataset lacks required columns
    #[error("CSV is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        /// Missing column names, sorted
        columns: Vec<String>,
    },

    /// A timestamp column holds a value that cannot be parsed
    #[error("column '{column}' contains invalid timestamp values (row {row}: {value:?})")]
    InvalidTimestamp {
        /// Offending column
        column: String,
        /// First offending data row (1-based)
        row: usize,
        /// First offending raw value
        value: String,
    },

    /// A numeric column holds a value that cannot be coerced
    #[error("column '{column}' contains non-numeric values (row {row}: {value:?})")]
    InvalidNumeric {
        /// Offending column
        column: String,
        /// First offending data row (1-based)
        row: usize,
        /// First offending raw value
        value: String,
    },

    /// A string destined for SQL text failed its allow-list
    #[error("{label} {reason}")]
    InvalidIdentifier {
        /// Which input was being validated
        label: String,
        /// Trimmed candidate value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Transformation arguments were blank
    #[error("args cannot be empty")]
    EmptyArguments,

    /// The warehouse reported an unsuccessful bulk write
    #[error("bulk write into {table} reported failure ({written} of {expected} rows written)")]
    WriteFailure {
        /// Target table
        table: String,
        /// Rows handed to the writer
        expected: usize,
        /// Rows the warehouse acknowledged
        written: u64,
    },

    /// Statement or connection failure reported by the warehouse
    #[error("warehouse error: {message}")]
    Warehouse {
        /// Driver-provided description
        message: String,
    },

    /// CSV decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::Configuration`] from any message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`Error::Warehouse`] from any displayable driver error
    pub fn warehouse(err: impl std::fmt::Display) -> Self {
        Self::Warehouse {
            message: err.to_string(),
        }
    }

    /// True for failures detected before any warehouse call was made
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingColumns { .. }
                | Self::InvalidTimestamp { .. }
                | Self::InvalidNumeric { .. }
                | Self::InvalidIdentifier { .. }
                | Self::EmptyArguments
        )
    }
}
