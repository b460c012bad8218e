//! WebSocket client with automatic reconnection

use super::types::{WsConfig, WsError, WsMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Outcome of one connection session
enum SessionEnd {
    /// Server closed or local side asked to stop
    Closed,
    /// Inbound receiver dropped
    ReceiverGone,
}

/// Channels for a running connection
///
/// Dropping `outgoing` closes the socket and ends the connection task.
pub struct WsConnection {
    /// Inbound frames and connection status events
    pub messages: mpsc::Receiver<WsMessage>,
    /// Outbound text frames
    pub outgoing: mpsc::Sender<String>,
}

/// Reusable WebSocket client with automatic reconnection and ping/pong handling
pub struct WsClient {
    config: WsConfig,
}

impl WsClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Create a new client with just a URL using default config
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WsConfig::new(url))
    }

    /// Get the configured URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Get the configuration
    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Connect in a background task
    ///
    /// The task reconnects with exponential backoff, resends the configured
    /// handshake after every connect, and keeps the socket alive with pings.
    /// Status events (Connected, Reconnecting, Disconnected) are delivered on
    /// the same channel as data frames.
    pub fn connect(&self) -> WsConnection {
        let (msg_tx, msg_rx) = mpsc::channel(self.config.channel_capacity);
        let (send_tx, send_rx) = mpsc::channel(256);
        let config = self.config.clone();

        tokio::spawn(async move {
            if let Err(e) = Self::run_connection_loop(config, msg_tx, send_rx).await {
                tracing::error!(error = %e, "WebSocket connection loop failed");
            }
        });

        WsConnection {
            messages: msg_rx,
            outgoing: send_tx,
        }
    }

    /// Run the connection loop with automatic reconnection
    async fn run_connection_loop(
        config: WsConfig,
        tx: mpsc::Sender<WsMessage>,
        mut send_rx: mpsc::Receiver<String>,
    ) -> Result<(), WsError> {
        let mut attempts = 0;

        loop {
            match Self::run_session(&config, &tx, &mut send_rx, &mut attempts).await {
                Ok(SessionEnd::Closed) => {
                    tracing::info!("WebSocket connection closed cleanly");
                    let _ = tx.send(WsMessage::Disconnected).await;
                    return Ok(());
                }
                Ok(SessionEnd::ReceiverGone) => {
                    tracing::debug!("Receiver dropped, closing connection");
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = attempts,
                        "WebSocket connection error, reconnecting..."
                    );

                    if config.max_reconnect_attempts > 0 && attempts >= config.max_reconnect_attempts
                    {
                        tracing::error!("Max reconnection attempts reached");
                        let _ = tx.send(WsMessage::Disconnected).await;
                        return Err(WsError::MaxReconnectsExceeded);
                    }

                    if tx.is_closed() {
                        tracing::info!("Receiver dropped, stopping reconnection");
                        return Ok(());
                    }

                    let _ = tx.send(WsMessage::Reconnecting { attempt: attempts }).await;
                    sleep(config.backoff_delay(attempts)).await;
                }
            }
        }
    }

    /// Connect once and pump frames until the session ends
    async fn run_session(
        config: &WsConfig,
        tx: &mpsc::Sender<WsMessage>,
        send_rx: &mut mpsc::Receiver<String>,
        attempts: &mut u32,
    ) -> Result<SessionEnd, WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(config.url.as_str())
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        for frame in &config.handshake {
            write
                .send(Message::Text(frame.clone()))
                .await
                .map_err(|e| WsError::SendFailed(e.to_string()))?;
        }

        tracing::info!(handshake_frames = config.handshake.len(), "WebSocket connected");
        *attempts = 0;

        if tx.send(WsMessage::Connected).await.is_err() {
            return Ok(SessionEnd::ReceiverGone);
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately
        ping_interval.tick().await;

        let mut ping_sent_at: Option<Instant> = None;

        loop {
            let pong_deadline = ping_sent_at.map(|sent| sent + config.pong_timeout);

            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(WsMessage::Text(text)).await.is_err() {
                                return Ok(SessionEnd::ReceiverGone);
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            if tx.send(WsMessage::Binary(data)).await.is_err() {
                                return Ok(SessionEnd::ReceiverGone);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            ping_sent_at = None;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Received close frame");
                            return Ok(SessionEnd::Closed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            return Err(WsError::ConnectionFailed(e.to_string()));
                        }
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                    }
                }

                outgoing = send_rx.recv() => {
                    match outgoing {
                        Some(text) => {
                            write.send(Message::Text(text)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(SessionEnd::Closed);
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if ping_sent_at.is_none() {
                        write.send(Message::Ping(vec![])).await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        ping_sent_at = Some(Instant::now());
                    }
                }

                _ = async move {
                    match pong_deadline {
                        Some(deadline) => sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                } => {
                    return Err(WsError::PongTimeout);
                }
            }
        }
    }
}
