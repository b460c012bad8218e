//! Market data stream against a local WebSocket server

use futures_util::{SinkExt, StreamExt};
use rt_investor::stream::MarketDataStream;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;

const BAR_FRAME: &str = r#"[
    {"type":"bar","timestamp":"2024-01-02T14:30:00Z","symbol":"AAPL",
     "open":"185.1","high":"186","low":"184.9","close":"185.5","volume":"12000"},
    {"type":"status","status":"ok","message":"heartbeat"}
]"#;

/// Accepts one client, records its control frames and answers the
/// subscribe frame with a bar
async fn serve_once(listener: TcpListener, frames_tx: oneshot::Sender<Vec<String>>) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

    let mut frames = Vec::new();
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            let subscribed = text.contains("\"subscribe\"");
            frames.push(text.to_string());
            if subscribed {
                ws.send(Message::Text(BAR_FRAME.into())).await.unwrap();
                break;
            }
        }
    }
    let _ = frames_tx.send(frames);

    // Keep the socket open until the client goes away
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn test_stream_authenticates_subscribes_and_delivers_bars() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (frames_tx, frames_rx) = oneshot::channel();
    tokio::spawn(serve_once(listener, frames_tx));

    let mut stream = MarketDataStream::new(
        endpoint,
        &["aapl".to_string(), "MSFT".to_string()],
        Some("key-123".to_string()),
    )
    .with_secret("secret-456");
    let (_, mut bars) = stream.bar_channel(16);
    let _failures = stream.start().await.unwrap();

    let bar = tokio::time::timeout(Duration::from_secs(5), bars.recv())
        .await
        .expect("timed out waiting for bar")
        .expect("bar channel closed");
    assert_eq!(bar.symbol, "AAPL");
    assert_eq!(bar.close, dec!(185.5));

    let frames = tokio::time::timeout(Duration::from_secs(5), frames_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].contains("\"auth\"") && frames[0].contains("key-123"));
    assert!(frames[1].contains("AAPL") && frames[1].contains("MSFT"));

    let stats = stream.stop().await.unwrap();
    assert_eq!(stats.events, 2);
    assert_eq!(stats.decode_errors, 0);
    assert!(!stream.is_running());
}
