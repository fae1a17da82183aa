//! Coinbase Advanced Trade WebSocket feed
//!
//! Consumes the market_trades channel for real-time executions.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::feed::{ConnectorState, FeedSource, SourceEvent};
use crate::types::{Asset, NormalizedTrade, Provider};

const COINBASE_WS_URL: &str = "wss://advanced-trade-ws.coinbase.com";

#[derive(Debug, Clone, Serialize)]
struct SubscribeMsg {
    #[serde(rename = "type")]
    msg_type: String,
    product_ids: Vec<String>,
    channel: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinbaseMessage {
    channel: Option<String>,
    events: Option<Vec<CoinbaseEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinbaseEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    trades: Option<Vec<CoinbaseTrade>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinbaseTrade {
    product_id: String,
    price: String,
    size: String,
    time: String,
}

pub struct CoinbaseFeed {
    subscriptions: Vec<Asset>,
}

impl CoinbaseFeed {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }
}

impl Default for CoinbaseFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for CoinbaseFeed {
    fn provider(&self) -> Provider {
        Provider::Coinbase
    }

    fn subscribe(&mut self, assets: &[Asset]) {
        self.subscriptions = assets.to_vec();
    }

    async fn connect(&mut self, tx: Sender<SourceEvent>) -> Result<()> {
        let product_ids: Vec<String> = self
            .subscriptions
            .iter()
            .map(|a| a.coinbase_pair().to_string())
            .collect();

        if product_ids.is_empty() {
            bail!("No subscriptions configured for Coinbase");
        }

        let (ws_stream, _) = connect_async(COINBASE_WS_URL)
            .await
            .context("Failed to connect to Coinbase WebSocket")?;

        let (mut write, mut read) = ws_stream.split();

        let sub_msg = SubscribeMsg {
            msg_type: "subscribe".to_string(),
            product_ids,
            channel: "market_trades".to_string(),
        };
        write
            .send(Message::Text(serde_json::to_string(&sub_msg)?))
            .await?;

        let _ = tx.send(SourceEvent::Connected(Provider::Coinbase)).await;
        tracing::info!(
            source = %"Coinbase",
            state = %ConnectorState::Subscribed,
            "Connected to Coinbase WebSocket"
        );

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    for trade in parse_message(&text) {
                        let _ = tx.send(SourceEvent::Trade(trade)).await;
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    tracing::warn!(source = %"Coinbase", "Connection closed by server");
                    break;
                }
                Err(e) => {
                    tracing::error!(source = %"Coinbase", error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }

        let _ = tx.send(SourceEvent::Disconnected(Provider::Coinbase)).await;
        Ok(())
    }
}

/// Parse one channel message into its normalized trades. Subscription
/// confirmations, heartbeats and other channels yield an empty batch.
fn parse_message(text: &str) -> Vec<NormalizedTrade> {
    let msg: CoinbaseMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => return Vec::new(),
    };

    if msg.channel.as_deref() != Some("market_trades") {
        return Vec::new();
    }

    let events = match msg.events {
        Some(e) => e,
        None => return Vec::new(),
    };

    let mut out = Vec::new();
    for event in events {
        // "snapshot" carries history we do not backfill from; only updates.
        if event.event_type.as_deref() != Some("update") {
            continue;
        }
        for trade in event.trades.into_iter().flatten() {
            if let Some(normalized) = normalize_trade(&trade) {
                out.push(normalized);
            }
        }
    }
    out
}

fn normalize_trade(trade: &CoinbaseTrade) -> Option<NormalizedTrade> {
    let asset = Asset::parse(&trade.product_id)?;
    let price: f64 = trade.price.parse().ok()?;
    let volume: f64 = trade.size.parse().ok()?;
    let ts = DateTime::parse_from_rfc3339(&trade.time)
        .ok()?
        .timestamp_millis();

    if price <= 0.0 || volume < 0.0 {
        return None;
    }

    Some(NormalizedTrade {
        ts,
        asset,
        price,
        volume,
        provider: Provider::Coinbase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_market_trades_update() {
        let text = r#"{"channel":"market_trades","client_id":"","timestamp":"2023-11-14T22:13:20.000Z","sequence_num":3,"events":[{"type":"update","trades":[{"trade_id":"1","product_id":"BTC-USD","price":"45000.25","size":"0.01","side":"BUY","time":"2023-11-14T22:13:20.000Z"}]}]}"#;
        let trades = parse_message(text);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].asset, Asset::BTC);
        assert_eq!(trades[0].provider, Provider::Coinbase);
        assert_eq!(trades[0].price, 45000.25);
        assert_eq!(trades[0].ts, 1700000000000);
    }

    #[test]
    fn test_parse_ignores_snapshot_events() {
        let text = r#"{"channel":"market_trades","events":[{"type":"snapshot","trades":[{"trade_id":"1","product_id":"BTC-USD","price":"45000","size":"1","side":"BUY","time":"2023-11-14T22:13:20.000Z"}]}]}"#;
        assert!(parse_message(text).is_empty());
    }

    #[test]
    fn test_parse_ignores_subscriptions_channel() {
        let text = r#"{"channel":"subscriptions","events":[{"subscriptions":{"market_trades":["BTC-USD"]}}]}"#;
        assert!(parse_message(text).is_empty());
    }

    #[test]
    fn test_normalize_rejects_bad_time() {
        let trade = CoinbaseTrade {
            product_id: "BTC-USD".to_string(),
            price: "45000".to_string(),
            size: "1".to_string(),
            time: "yesterday".to_string(),
        };
        assert!(normalize_trade(&trade).is_none());
    }
}
