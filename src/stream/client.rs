//! Market data stream over a WebSocket connection
//!
//! The connection task inside [`WsClient`] owns the socket. A dispatch task
//! reads its bounded channel, decodes frames and fans events out to the
//! subscriber registry, so slow subscribers never block network reads.

use super::subscribers::{MarketDataHandler, SubscriberRegistry, DEFAULT_MAX_CONSECUTIVE_FAILURES};
use super::types::{
    decode_frame, ControlFrame, MarketEvent, StreamError, StreamStats, SubscriberFailure,
    SubscriberId,
};
use crate::config::Config;
use crate::market::Bar;
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use crate::utils::validate_symbol;
use crate::ws::{WsClient, WsConfig, WsMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// State shared between the stream owner and the dispatch task
#[derive(Clone)]
struct Shared {
    symbols: Arc<Mutex<Vec<String>>>,
    registry: Arc<Mutex<SubscriberRegistry>>,
    connected: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Real-time market data stream
pub struct MarketDataStream {
    endpoint: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    ws_config: Option<WsConfig>,
    shared: Shared,
    outgoing: Option<mpsc::Sender<String>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<StreamStats>>,
}

impl MarketDataStream {
    /// Create a stream for `symbols` on `endpoint`
    ///
    /// Invalid symbols are dropped with a warning.
    pub fn new(endpoint: impl Into<String>, symbols: &[String], api_key: Option<String>) -> Self {
        let stream = Self {
            endpoint: endpoint.into(),
            api_key,
            api_secret: None,
            ws_config: None,
            shared: Shared {
                symbols: Arc::new(Mutex::new(Vec::new())),
                registry: Arc::new(Mutex::new(SubscriberRegistry::new(
                    DEFAULT_MAX_CONSECUTIVE_FAILURES,
                ))),
                connected: Arc::new(AtomicBool::new(false)),
            },
            outgoing: None,
            shutdown: None,
            task: None,
        };

        {
            let mut current = lock(&stream.shared.symbols);
            for symbol in symbols {
                if validate_symbol(symbol) {
                    push_unique(&mut current, symbol);
                }
            }
        }

        tracing::info!(
            endpoint = %stream.endpoint,
            symbols = stream.symbols().len(),
            "Market data stream created"
        );
        stream
    }

    /// Build a stream from application configuration
    pub fn from_config(config: &Config) -> Self {
        let mut stream = Self::new(
            config.api.websocket_endpoint.clone(),
            &config.market.default_symbols,
            config.api.api_key.clone(),
        );
        stream.api_secret = config.api.api_secret.clone();
        stream
    }

    /// Set the secret sent with the auth frame
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(secret.into());
        self
    }

    /// Override connection settings; the URL is always the stream endpoint
    pub fn with_ws_config(mut self, config: WsConfig) -> Self {
        self.ws_config = Some(config);
        self
    }

    /// Consecutive handler failures before a subscriber is removed
    pub fn with_max_consecutive_failures(self, max: u32) -> Self {
        lock(&self.shared.registry).set_max_consecutive_failures(max);
        self
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Currently subscribed symbols
    pub fn symbols(&self) -> Vec<String> {
        lock(&self.shared.symbols).clone()
    }

    /// Whether the socket is currently connected
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether the dispatch task is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Add symbols to the subscription
    ///
    /// Symbols are uppercased and de-duplicated. If the stream is connected
    /// a subscribe frame for the new symbols is sent right away; otherwise
    /// they are included in the subscribe frame on the next connect.
    pub fn subscribe(&self, symbols: &[&str]) -> Result<Vec<String>, StreamError> {
        if let Some(bad) = symbols.iter().find(|s| !validate_symbol(s)) {
            return Err(StreamError::InvalidSymbol(bad.to_string()));
        }

        let added: Vec<String> = {
            let mut current = lock(&self.shared.symbols);
            symbols
                .iter()
                .filter_map(|s| push_unique(&mut current, s))
                .collect()
        };

        if added.is_empty() {
            return Ok(added);
        }

        tracing::info!(symbols = ?added, "Subscribed to symbols");

        if self.is_connected() {
            if let Some(outgoing) = &self.outgoing {
                let frame = ControlFrame::Subscribe {
                    symbols: added.clone(),
                }
                .to_json()?;
                outgoing
                    .try_send(frame)
                    .map_err(|_| StreamError::ConnectionClosed)?;
            }
        }

        Ok(added)
    }

    /// Register a handler for decoded events
    pub fn on_message<H>(&self, name: impl Into<String>, handler: H) -> SubscriberId
    where
        H: MarketDataHandler + 'static,
    {
        lock(&self.shared.registry).add(name, Box::new(handler))
    }

    /// Remove a handler, returning whether it was registered
    pub fn unsubscribe_handler(&self, id: SubscriberId) -> bool {
        lock(&self.shared.registry).remove(id)
    }

    /// Register a subscriber that forwards bars into a bounded channel
    ///
    /// A full or closed channel counts as a handler failure.
    pub fn bar_channel(&self, capacity: usize) -> (SubscriberId, mpsc::Receiver<Bar>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.on_message("bar-channel", move |event: &MarketEvent| -> anyhow::Result<()> {
            if let MarketEvent::Bar(bar) = event {
                tx.try_send(bar.clone())
                    .map_err(|e| anyhow::anyhow!("bar channel: {e}"))?;
            }
            Ok(())
        });
        (id, rx)
    }

    /// Connect and start dispatching
    ///
    /// Returns the channel on which subscriber failures are reported.
    pub async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<SubscriberFailure>, StreamError> {
        if self.is_running() {
            return Err(StreamError::AlreadyRunning);
        }
        if lock(&self.shared.symbols).is_empty() {
            return Err(StreamError::NoSymbols);
        }

        let mut ws_config = self
            .ws_config
            .clone()
            .unwrap_or_else(|| WsConfig::new(self.endpoint.clone()));
        ws_config.url = self.endpoint.clone();

        if let Some(key) = &self.api_key {
            let auth = ControlFrame::Auth {
                key: key.clone(),
                secret: self.api_secret.clone(),
            }
            .to_json()?;
            ws_config = ws_config.on_connect(auth);
        }

        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        lock(&self.shared.registry).set_failure_channel(failure_tx);

        let connection = WsClient::new(ws_config).connect();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.task = Some(tokio::spawn(dispatch_loop(
            connection.messages,
            connection.outgoing.clone(),
            self.shared.clone(),
            shutdown_rx,
        )));
        self.outgoing = Some(connection.outgoing);
        self.shutdown = Some(shutdown_tx);

        tracing::info!(endpoint = %self.endpoint, "Market data stream started");
        Ok(failure_rx)
    }

    /// Signal shutdown and wait for the dispatch task
    ///
    /// Returns the session counters, or `None` if the stream was not started.
    pub async fn stop(&mut self) -> Option<StreamStats> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        // Dropping the last sender closes the socket
        self.outgoing = None;

        let task = self.task.take()?;
        let stats = match task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch task failed");
                StreamStats::default()
            }
        };
        self.shared.connected.store(false, Ordering::SeqCst);

        tracing::info!(
            frames = stats.frames,
            events = stats.events,
            decode_errors = stats.decode_errors,
            "Market data stream stopped"
        );
        Some(stats)
    }
}

/// Uppercase and append `symbol` unless already present
fn push_unique(symbols: &mut Vec<String>, symbol: &str) -> Option<String> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbols.contains(&symbol) {
        None
    } else {
        symbols.push(symbol.clone());
        Some(symbol)
    }
}

/// Read connection events until shutdown or disconnect
async fn dispatch_loop(
    mut messages: mpsc::Receiver<WsMessage>,
    outgoing: mpsc::Sender<String>,
    shared: Shared,
    mut shutdown: watch::Receiver<bool>,
) -> StreamStats {
    let mut stats = StreamStats::default();

    loop {
        let msg = tokio::select! {
            msg = messages.recv() => msg,
            _ = shutdown.changed() => {
                tracing::debug!("Shutdown requested");
                break;
            }
        };

        let text = match msg {
            Some(WsMessage::Connected) => {
                shared.connected.store(true, Ordering::SeqCst);
                let symbols = lock(&shared.symbols).clone();
                if symbols.is_empty() {
                    continue;
                }
                match (ControlFrame::Subscribe { symbols }).to_json() {
                    Ok(frame) => {
                        if outgoing.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode subscribe frame"),
                }
                continue;
            }
            Some(WsMessage::Reconnecting { attempt }) => {
                shared.connected.store(false, Ordering::SeqCst);
                tracing::warn!(attempt, "Stream reconnecting");
                continue;
            }
            Some(WsMessage::Disconnected) | None => {
                shared.connected.store(false, Ordering::SeqCst);
                break;
            }
            Some(WsMessage::Text(text)) => text,
            Some(WsMessage::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    stats.frames += 1;
                    stats.decode_errors += 1;
                    telemetry::increment(CounterMetric::StreamDecodeErrors, 1);
                    tracing::warn!("Dropping non UTF-8 binary frame");
                    continue;
                }
            },
        };

        stats.frames += 1;
        let events = match decode_frame(&text) {
            Ok(events) => events,
            Err(e) => {
                stats.decode_errors += 1;
                telemetry::increment(CounterMetric::StreamDecodeErrors, 1);
                tracing::warn!(error = %e, "Dropping undecodable frame");
                continue;
            }
        };

        let started = Instant::now();
        {
            let mut registry = lock(&shared.registry);
            for event in &events {
                let report = registry.dispatch(event);
                stats.subscriber_failures += report.failed as u64;
            }
        }

        stats.events += events.len() as u64;
        telemetry::increment(CounterMetric::StreamMessages, events.len() as u64);
        telemetry::record_latency(LatencyMetric::StreamDispatch, started.elapsed());
    }

    shared.connected.store(false, Ordering::SeqCst);
    stats
}
