//! Binance WebSocket feed
//!
//! Consumes aggTrade events from the combined spot stream.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::feed::{ConnectorState, FeedSource, SourceEvent};
use crate::types::{Asset, NormalizedTrade, Provider};

const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/stream";

pub struct BinanceFeed {
    subscriptions: Vec<Asset>,
}

impl BinanceFeed {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    fn build_stream_url(&self) -> String {
        let streams: Vec<String> = self
            .subscriptions
            .iter()
            .map(|a| format!("{}@aggTrade", a.trading_pair().to_lowercase()))
            .collect();
        format!("{}?streams={}", BINANCE_WS_URL, streams.join("/"))
    }
}

impl Default for BinanceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for BinanceFeed {
    fn provider(&self) -> Provider {
        Provider::Binance
    }

    fn subscribe(&mut self, assets: &[Asset]) {
        self.subscriptions = assets.to_vec();
    }

    async fn connect(&mut self, tx: Sender<SourceEvent>) -> Result<()> {
        if self.subscriptions.is_empty() {
            bail!("No subscriptions configured for Binance");
        }

        let url = self.build_stream_url();
        let (ws_stream, _) = connect_async(&url)
            .await
            .context("Failed to connect to Binance WebSocket")?;

        let (mut write, mut read) = ws_stream.split();

        // The combined-stream URL subscribes implicitly; nothing to send.
        let _ = tx.send(SourceEvent::Connected(Provider::Binance)).await;
        tracing::info!(
            source = %"Binance",
            state = %ConnectorState::Subscribed,
            "Connected to Binance WebSocket"
        );

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    // Malformed or non-trade messages are expected; drop them.
                    if let Some(trade) = parse_message(&text) {
                        let _ = tx.send(SourceEvent::Trade(trade)).await;
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    tracing::warn!(source = %"Binance", "Connection closed by server");
                    break;
                }
                Err(e) => {
                    tracing::error!(source = %"Binance", error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }

        let _ = tx.send(SourceEvent::Disconnected(Provider::Binance)).await;
        Ok(())
    }
}

/// Parse one combined-stream message into zero-or-one normalized trade.
///
/// Format: `{"stream":"btcusdt@aggTrade","data":{"s":"BTCUSDT","p":"...",
/// "q":"...","T":1700000000000,...}}`
fn parse_message(text: &str) -> Option<NormalizedTrade> {
    let wrapper: serde_json::Value = serde_json::from_str(text).ok()?;

    let stream = wrapper["stream"].as_str()?;
    if !stream.contains("@aggTrade") {
        return None;
    }

    let data = &wrapper["data"];
    let asset = Asset::parse(data["s"].as_str()?)?;
    let price: f64 = data["p"].as_str()?.parse().ok()?;
    let volume: f64 = data["q"].as_str()?.parse().ok()?;
    let ts = data["T"].as_i64()?;

    if price <= 0.0 || volume < 0.0 {
        return None;
    }

    Some(NormalizedTrade {
        ts,
        asset,
        price,
        volume,
        provider: Provider::Binance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agg_trade() {
        let text = r#"{"stream":"btcusdt@aggTrade","data":{"e":"aggTrade","E":1700000000100,"s":"BTCUSDT","a":12345,"p":"45000.10","q":"0.5","T":1700000000000,"m":false}}"#;
        let trade = parse_message(text).unwrap();
        assert_eq!(trade.asset, Asset::BTC);
        assert_eq!(trade.provider, Provider::Binance);
        assert_eq!(trade.price, 45000.10);
        assert_eq!(trade.volume, 0.5);
        assert_eq!(trade.ts, 1700000000000);
    }

    #[test]
    fn test_parse_ignores_other_streams() {
        let text = r#"{"stream":"btcusdt@bookTicker","data":{"s":"BTCUSDT","b":"45000","a":"45001"}}"#;
        assert!(parse_message(text).is_none());
    }

    #[test]
    fn test_parse_rejects_invalid_price() {
        let text = r#"{"stream":"ethusdt@aggTrade","data":{"s":"ETHUSDT","p":"0","q":"1.0","T":1700000000000}}"#;
        assert!(parse_message(text).is_none());
    }

    #[test]
    fn test_parse_drops_garbage() {
        assert!(parse_message("not json").is_none());
        assert!(parse_message("{}").is_none());
    }
}
