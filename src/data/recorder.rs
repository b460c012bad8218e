//! Buffered bar recorder writing rotated Parquet files

use super::parquet::ParquetWriter;
use crate::market::Bar;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Configuration for bar recording
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Output directory for Parquet files
    pub output_dir: PathBuf,
    /// Rotation interval in seconds
    pub rotation_interval_secs: u64,
    /// Buffer size before flushing
    pub buffer_size: usize,
    /// Maximum time between flushes
    pub flush_interval_secs: u64,
    /// Bars queued between producers and the writer task
    pub channel_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            rotation_interval_secs: 3600,
            buffer_size: 1000,
            flush_interval_secs: 60,
            channel_capacity: 10_000,
        }
    }
}

/// Recording statistics
#[derive(Debug, Default, Clone)]
pub struct RecorderStats {
    pub bars_received: u64,
    pub bars_written: u64,
    pub files_written: u64,
    pub write_errors: u64,
    pub last_flush: Option<DateTime<Utc>>,
}

/// Records bars to Parquet files from a background writer task
pub struct BarRecorder {
    config: RecorderConfig,
    tx: mpsc::Sender<Bar>,
    stats: Arc<RwLock<RecorderStats>>,
    task: JoinHandle<()>,
}

impl BarRecorder {
    /// Create a recorder and spawn its writer task
    pub fn new(config: RecorderConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let stats = Arc::new(RwLock::new(RecorderStats::default()));

        let writer = ParquetWriter::new(config.output_dir.clone(), config.rotation_interval_secs);
        let task = tokio::spawn(Self::run_writer(rx, writer, config.clone(), stats.clone()));

        Self {
            config,
            tx,
            stats,
            task,
        }
    }

    /// Create a recorder with default settings
    pub fn with_output_dir(output_dir: PathBuf) -> Self {
        Self::new(RecorderConfig {
            output_dir,
            ..Default::default()
        })
    }

    async fn run_writer(
        mut rx: mpsc::Receiver<Bar>,
        mut writer: ParquetWriter,
        config: RecorderConfig,
        stats: Arc<RwLock<RecorderStats>>,
    ) {
        let mut buffer: Vec<Bar> = Vec::with_capacity(config.buffer_size);
        let mut last_flush = Utc::now();
        let flush_interval = Duration::seconds(config.flush_interval_secs as i64);
        let tick = tokio::time::Duration::from_secs(config.flush_interval_secs.max(1));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(bar) => {
                            stats.write().await.bars_received += 1;
                            buffer.push(bar);

                            if buffer.len() >= config.buffer_size {
                                Self::flush(&mut buffer, &mut writer, &stats).await;
                                last_flush = Utc::now();
                            }
                        }
                        None => {
                            Self::flush(&mut buffer, &mut writer, &stats).await;
                            tracing::info!("Bar writer shutting down");
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep(tick) => {
                    let now = Utc::now();
                    if now - last_flush >= flush_interval && !buffer.is_empty() {
                        Self::flush(&mut buffer, &mut writer, &stats).await;
                        last_flush = now;
                    }
                }
            }
        }
    }

    /// Write the buffer to a new file in the current rotation window
    async fn flush(
        buffer: &mut Vec<Bar>,
        writer: &mut ParquetWriter,
        stats: &Arc<RwLock<RecorderStats>>,
    ) {
        if buffer.is_empty() {
            return;
        }

        let now = Utc::now();
        let path = writer.next_path("bars", now);
        let count = buffer.len();

        match writer.write_bars(&path, buffer) {
            Ok(()) => {
                let mut s = stats.write().await;
                s.bars_written += count as u64;
                s.files_written += 1;
                s.last_flush = Some(now);
                tracing::debug!(count, path = ?path, "Flushed bars");
            }
            Err(e) => {
                stats.write().await.write_errors += 1;
                tracing::error!(error = %e, count, "Failed to write bars");
            }
        }

        buffer.clear();
    }

    /// Queue a bar, waiting for channel space
    pub async fn record(&self, bar: Bar) -> anyhow::Result<()> {
        self.tx
            .send(bar)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to queue bar: {}", e))
    }

    /// Queue a bar without waiting
    pub fn try_record(&self, bar: Bar) -> anyhow::Result<()> {
        self.tx
            .try_send(bar)
            .map_err(|e| anyhow::anyhow!("Failed to queue bar: {}", e))
    }

    /// Sender feeding the writer task
    ///
    /// The writer only stops once every clone has been dropped.
    pub fn sender(&self) -> mpsc::Sender<Bar> {
        self.tx.clone()
    }

    /// Get output directory
    pub fn output_dir(&self) -> &PathBuf {
        &self.config.output_dir
    }

    /// Get current statistics
    pub async fn stats(&self) -> RecorderStats {
        self.stats.read().await.clone()
    }

    /// Flush buffered bars, stop the writer and return final statistics
    pub async fn shutdown(self) -> RecorderStats {
        let Self { tx, stats, task, .. } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Bar writer task failed");
        }
        let final_stats = stats.read().await.clone();
        final_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read_bars;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn config(dir: &TempDir, buffer_size: usize) -> RecorderConfig {
        RecorderConfig {
            output_dir: dir.path().to_path_buf(),
            rotation_interval_secs: 3600,
            buffer_size,
            flush_interval_secs: 60,
            channel_capacity: 16,
        }
    }

    fn bar(i: i64) -> Bar {
        Bar::flat(
            Utc::now() + Duration::seconds(i),
            "AAPL",
            dec!(100) + rust_decimal::Decimal::from(i),
            dec!(5),
        )
    }

    #[tokio::test]
    async fn test_recorder_creation() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = BarRecorder::new(config(&temp_dir, 10));
        assert_eq!(recorder.output_dir(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_flushes_when_buffer_full() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = BarRecorder::new(config(&temp_dir, 2));

        for i in 0..4 {
            recorder.record(bar(i)).await.unwrap();
        }

        let stats = recorder.shutdown().await;
        assert_eq!(stats.bars_received, 4);
        assert_eq!(stats.bars_written, 4);
        assert_eq!(stats.files_written, 2);

        let bars = read_bars(temp_dir.path()).unwrap();
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[3].close, dec!(103));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_partial_buffer() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = BarRecorder::new(config(&temp_dir, 100));

        recorder.try_record(bar(0)).unwrap();
        let stats = recorder.shutdown().await;

        assert_eq!(stats.bars_written, 1);
        assert_eq!(stats.files_written, 1);
        assert!(stats.last_flush.is_some());
    }

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.rotation_interval_secs, 3600);
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.flush_interval_secs, 60);
    }
}
