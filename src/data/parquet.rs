//! Parquet bar storage with time-based file rotation
//!
//! Decimals are stored as strings to keep full precision; timestamps are
//! UTC microseconds.

use super::DataError;
use crate::market::Bar;
use arrow::array::{Array, ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Duration, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const DECIMAL_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// OHLCV bar schema
pub fn bar_schema() -> Schema {
    let mut fields = vec![
        Field::new(
            "timestamp",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("symbol", DataType::Utf8, false),
    ];
    fields.extend(
        DECIMAL_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false)),
    );
    Schema::new(fields)
}

/// Parquet file writer with time-based rotation
pub struct ParquetWriter {
    output_dir: PathBuf,
    rotation_interval: Duration,
    current_file_start: Option<DateTime<Utc>>,
    sequence: u32,
}

impl ParquetWriter {
    /// Create a writer that starts a new file window every
    /// `rotation_interval_secs`
    pub fn new(output_dir: impl Into<PathBuf>, rotation_interval_secs: u64) -> Self {
        Self {
            output_dir: output_dir.into(),
            rotation_interval: Duration::seconds(rotation_interval_secs as i64),
            current_file_start: None,
            sequence: 0,
        }
    }

    /// Ensure output directory exists
    pub fn ensure_dir(&self) -> Result<(), DataError> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    /// Check if the current window has expired
    pub fn needs_rotation(&self, now: DateTime<Utc>) -> bool {
        match self.current_file_start {
            None => true,
            Some(start) => now - start >= self.rotation_interval,
        }
    }

    /// Start a new window at `timestamp`
    pub fn mark_rotation(&mut self, timestamp: DateTime<Utc>) {
        self.current_file_start = Some(timestamp);
        self.sequence = 0;
    }

    /// Path for the next file in the current window
    ///
    /// Files are named `<prefix>_<window start>_<sequence>.parquet` so
    /// repeated flushes within a window never overwrite each other.
    pub fn next_path(&mut self, prefix: &str, now: DateTime<Utc>) -> PathBuf {
        if self.needs_rotation(now) {
            self.mark_rotation(now);
        }
        let start = self.current_file_start.unwrap_or(now);
        let path = self.output_dir.join(format!(
            "{}_{}_{:04}.parquet",
            prefix,
            start.format("%Y%m%d_%H%M%S"),
            self.sequence
        ));
        self.sequence += 1;
        path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write bars to a Parquet file
    pub fn write_bars(&self, path: &Path, bars: &[Bar]) -> Result<(), DataError> {
        if bars.is_empty() {
            return Ok(());
        }

        self.ensure_dir()?;
        write_bars(path, bars)
    }
}

/// Write bars to `path`, replacing any existing file
pub fn write_bars(path: &Path, bars: &[Bar]) -> Result<(), DataError> {
    let schema = Arc::new(bar_schema());
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp_micros()).collect();
    let symbols: Vec<&str> = bars.iter().map(|b| b.symbol.as_str()).collect();

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
        Arc::new(StringArray::from(symbols)),
    ];

    let fields: [fn(&Bar) -> Decimal; 5] = [
        |b| b.open,
        |b| b.high,
        |b| b.low,
        |b| b.close,
        |b| b.volume,
    ];
    for field in fields {
        let values: Vec<String> = bars.iter().map(|b| field(b).to_string()).collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    let batch = RecordBatch::try_new(schema, columns)?;
    writer.write(&batch)?;
    writer.close()?;

    tracing::debug!(path = ?path, count = bars.len(), "Wrote bars to Parquet");
    Ok(())
}

/// Reader for Parquet bar files
pub struct ParquetReader {
    path: PathBuf,
}

impl ParquetReader {
    /// Create a new reader for a Parquet file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every bar in the file
    pub fn read_bars(&self) -> Result<Vec<Bar>, DataError> {
        let file = File::open(&self.path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut bars = Vec::new();
        for batch in reader {
            let batch = batch?;

            let timestamps = column::<TimestampMicrosecondArray>(&batch, "timestamp")?;
            let symbols = column::<StringArray>(&batch, "symbol")?;
            let decimals = DECIMAL_COLUMNS
                .iter()
                .map(|name| column::<StringArray>(&batch, *name))
                .collect::<Result<Vec<_>, _>>()?;

            for i in 0..batch.num_rows() {
                let timestamp = DateTime::from_timestamp_micros(timestamps.value(i))
                    .ok_or_else(|| DataError::InvalidValue {
                        column: "timestamp",
                        value: timestamps.value(i).to_string(),
                    })?;

                let mut values = [Decimal::ZERO; 5];
                for (slot, (name, array)) in values
                    .iter_mut()
                    .zip(DECIMAL_COLUMNS.iter().zip(&decimals))
                {
                    let raw = array.value(i);
                    *slot = Decimal::from_str(raw).map_err(|_| DataError::InvalidValue {
                        column: *name,
                        value: raw.to_string(),
                    })?;
                }
                let [open, high, low, close, volume] = values;

                bars.push(Bar {
                    timestamp,
                    symbol: symbols.value(i).to_string(),
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
            }
        }

        tracing::debug!(path = ?self.path, count = bars.len(), "Read bars from Parquet");
        Ok(bars)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a T, DataError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or(DataError::InvalidColumn(name))
}

/// Read bars from a Parquet file or from every `.parquet` file in a
/// directory, in file name order
pub fn read_bars(source: &Path) -> Result<Vec<Bar>, DataError> {
    if !source.exists() {
        return Err(DataError::NotFound(source.to_path_buf()));
    }

    if source.is_file() {
        return ParquetReader::new(source).read_bars();
    }

    let mut files: Vec<PathBuf> = fs::read_dir(source)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "parquet"))
        .collect();
    files.sort();

    let mut bars = Vec::new();
    for file in &files {
        bars.extend(ParquetReader::new(file).read_bars()?);
    }

    tracing::info!(path = ?source, files = files.len(), bars = bars.len(), "Loaded bar files");
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn sample_bars() -> Vec<Bar> {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        vec![
            Bar::new(ts, "AAPL", dec!(185.10), dec!(186.25), dec!(184.90), dec!(185.95), dec!(1200.5)),
            Bar::new(
                ts + Duration::minutes(1),
                "MSFT",
                dec!(370),
                dec!(371),
                dec!(369.5),
                dec!(370.75),
                dec!(800),
            ),
        ]
    }

    #[test]
    fn test_write_and_read_bars() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path(), 3600);
        let path = dir.path().join("bars.parquet");

        let bars = sample_bars();
        writer.write_bars(&path, &bars).unwrap();

        let read = ParquetReader::new(&path).read_bars().unwrap();
        assert_eq!(read, bars);
        assert_eq!(read[0].open.to_string(), "185.10");
    }

    #[test]
    fn test_empty_write_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let writer = ParquetWriter::new(dir.path().join("out"), 3600);
        let path = dir.path().join("out/bars.parquet");
        writer.write_bars(&path, &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_read_directory_in_name_order() {
        let dir = TempDir::new().unwrap();
        let bars = sample_bars();
        write_bars(&dir.path().join("b.parquet"), &bars[1..]).unwrap();
        write_bars(&dir.path().join("a.parquet"), &bars[..1]).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let read = read_bars(dir.path()).unwrap();
        assert_eq!(read, bars);
    }

    #[test]
    fn test_read_missing_source() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_bars(&dir.path().join("missing")),
            Err(DataError::NotFound(_))
        ));
    }

    #[test]
    fn test_next_path_sequences_within_window() {
        let mut writer = ParquetWriter::new("/tmp/bars", 3600);
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let first = writer.next_path("bars", start);
        let second = writer.next_path("bars", start + Duration::minutes(5));
        let rotated = writer.next_path("bars", start + Duration::hours(1));

        assert_eq!(first, PathBuf::from("/tmp/bars/bars_20240102_000000_0000.parquet"));
        assert_eq!(second, PathBuf::from("/tmp/bars/bars_20240102_000000_0001.parquet"));
        assert_eq!(rotated, PathBuf::from("/tmp/bars/bars_20240102_010000_0000.parquet"));
    }
}
