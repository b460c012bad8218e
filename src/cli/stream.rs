//! Stream command implementation

use crate::config::{parse_symbols, Config};
use crate::data::{BarRecorder, RecorderConfig};
use crate::stream::{MarketDataStream, MarketEvent};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Comma-separated symbols (defaults to DEFAULT_SYMBOLS)
    #[arg(long)]
    pub symbols: Option<String>,

    /// Record received bars to Parquet
    #[arg(long)]
    pub record: bool,

    /// Output directory for recorded bars (defaults to DATA_DIR)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,

    /// Log every event, not only bars
    #[arg(short, long)]
    pub verbose: bool,
}

impl StreamArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let symbols = self
            .symbols
            .as_deref()
            .map(parse_symbols)
            .unwrap_or_else(|| config.market.default_symbols.clone());

        let mut stream = MarketDataStream::from_config(config);
        stream.subscribe(&symbols.iter().map(String::as_str).collect::<Vec<_>>())?;

        let verbose = self.verbose;
        stream.on_message("log", move |event: &MarketEvent| -> anyhow::Result<()> {
            match event {
                MarketEvent::Bar(bar) => tracing::info!(
                    symbol = %bar.symbol,
                    close = %bar.close,
                    volume = %bar.volume,
                    "Bar"
                ),
                other if verbose => tracing::info!(event = ?other, "Event"),
                _ => {}
            }
            Ok(())
        });

        let recorder = if self.record {
            let output_dir = self.output.clone().unwrap_or_else(|| config.data.data_dir.clone());
            let recorder = BarRecorder::new(RecorderConfig {
                output_dir,
                ..Default::default()
            });
            let (bar_id, mut bars) = stream.bar_channel(1024);
            let sink = recorder.sender();
            tokio::spawn(async move {
                while let Some(bar) = bars.recv().await {
                    if sink.send(bar).await.is_err() {
                        break;
                    }
                }
            });
            Some((bar_id, recorder))
        } else {
            None
        };

        let mut failures = stream.start().await?;
        tracing::info!(symbols = ?stream.symbols(), endpoint = stream.endpoint(), "Streaming");

        let deadline = async {
            match self.duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    break;
                }
                _ = &mut deadline => break,
                Some(failure) = failures.recv() => {
                    tracing::warn!(
                        subscriber = %failure.name,
                        error = %failure.error,
                        unsubscribed = failure.unsubscribed,
                        "Subscriber failed"
                    );
                }
            }
        }

        if let Some(stats) = stream.stop().await {
            tracing::info!(
                frames = stats.frames,
                events = stats.events,
                decode_errors = stats.decode_errors,
                "Stream stopped"
            );
        }

        if let Some((bar_id, recorder)) = recorder {
            // Closes the forwarding channel so the writer can drain
            stream.unsubscribe_handler(bar_id);
            let stats = recorder.shutdown().await;
            println!(
                "Recorded {} bars into {} files ({} write errors)",
                stats.bars_written, stats.files_written, stats.write_errors
            );
        }

        Ok(())
    }
}
