//! Real-time market data stream
//!
//! Subscribes to symbols over a WebSocket, decodes JSON frames into
//! [`MarketEvent`]s and fans them out to registered handlers.

mod client;
mod subscribers;
mod types;

pub use client::MarketDataStream;
pub use subscribers::{
    DispatchReport, MarketDataHandler, SubscriberRegistry, DEFAULT_MAX_CONSECUTIVE_FAILURES,
};
pub use types::{
    decode_frame, ControlFrame, MarketEvent, Quote, StatusNotice, StreamError, StreamStats,
    SubscriberFailure, SubscriberId, TradeTick,
};
