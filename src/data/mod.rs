//! Bar storage
//!
//! Parquet files for historical bars and a buffered recorder for captured
//! stream data.

mod parquet;
mod recorder;

pub use self::parquet::{bar_schema, read_bars, write_bars, ParquetReader, ParquetWriter};
pub use recorder::{BarRecorder, RecorderConfig, RecorderStats};

use std::path::PathBuf;
use thiserror::Error;

/// Data storage errors
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    /// Column missing or of the wrong type
    #[error("Missing or invalid column: {0}")]
    InvalidColumn(&'static str),
    /// Cell could not be parsed
    #[error("Invalid value in column {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
    /// Data source does not exist
    #[error("Data source not found: {0}")]
    NotFound(PathBuf),
}
