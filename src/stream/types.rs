//! Stream message types

use crate::market::Bar;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Subscriber identifier
pub type SubscriberId = Uuid;

/// A single trade print
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: Decimal,
    pub size: Decimal,
}

/// Top-of-book quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    #[serde(default)]
    pub bid_size: Decimal,
    #[serde(default)]
    pub ask_size: Decimal,
}

/// Provider status notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotice {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// A decoded market data event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarketEvent {
    /// Completed OHLCV bar
    Bar(Bar),
    /// Trade print
    Trade(TradeTick),
    /// Quote update
    Quote(Quote),
    /// Provider status message
    Status(StatusNotice),
}

impl MarketEvent {
    /// Symbol the event refers to, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            MarketEvent::Bar(bar) => Some(&bar.symbol),
            MarketEvent::Trade(trade) => Some(&trade.symbol),
            MarketEvent::Quote(quote) => Some(&quote.symbol),
            MarketEvent::Status(_) => None,
        }
    }
}

/// Outbound control frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Authenticate the session
    Auth {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },
    /// Subscribe to symbols
    Subscribe { symbols: Vec<String> },
    /// Unsubscribe from symbols
    Unsubscribe { symbols: Vec<String> },
}

impl ControlFrame {
    /// Serialize to a JSON text frame
    pub fn to_json(&self) -> Result<String, StreamError> {
        serde_json::to_string(self).map_err(|e| StreamError::Encode(e.to_string()))
    }
}

/// A subscriber handler failure
#[derive(Debug, Clone)]
pub struct SubscriberFailure {
    /// Failing subscriber
    pub id: SubscriberId,
    /// Subscriber name given at registration
    pub name: String,
    /// Error returned by the handler
    pub error: String,
    /// Consecutive failures including this one
    pub consecutive_failures: u32,
    /// Whether the supervisor removed the subscriber
    pub unsubscribed: bool,
}

/// Counters for a stream session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Text or binary frames received
    pub frames: u64,
    /// Events decoded from frames
    pub events: u64,
    /// Frames that failed to decode
    pub decode_errors: u64,
    /// Handler failures
    pub subscriber_failures: u64,
}

/// Stream errors
#[derive(Debug, Error)]
pub enum StreamError {
    /// Stream already started
    #[error("Stream already running")]
    AlreadyRunning,
    /// Nothing to subscribe to
    #[error("No symbols to subscribe to")]
    NoSymbols,
    /// Symbol failed validation
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),
    /// Frame could not be decoded
    #[error("Failed to decode frame: {0}")]
    Decode(String),
    /// Frame could not be encoded
    #[error("Failed to encode frame: {0}")]
    Encode(String),
    /// Connection task is gone
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Decode a text frame into events
///
/// A frame may hold a single event object or an array of them.
pub fn decode_frame(text: &str) -> Result<Vec<MarketEvent>, StreamError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| StreamError::Decode(e.to_string()))?;

    let decode = |v: serde_json::Value| {
        serde_json::from_value::<MarketEvent>(v).map_err(|e| StreamError::Decode(e.to_string()))
    };

    match value {
        serde_json::Value::Array(items) => items.into_iter().map(decode).collect(),
        other => Ok(vec![decode(other)?]),
    }
}
