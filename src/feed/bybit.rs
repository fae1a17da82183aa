//! Bybit WebSocket feed
//!
//! Consumes publicTrade batches from the V5 public spot stream.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::feed::{ConnectorState, FeedSource, SourceEvent};
use crate::types::{Asset, NormalizedTrade, Provider};

const BYBIT_WS_URL: &str = "wss://stream.bybit.com/v5/public/spot";
const PING_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Serialize)]
struct SubscribeMsg {
    req_id: Option<String>,
    op: String,
    args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BybitMessage {
    topic: Option<String>,
    data: Option<serde_json::Value>,
    success: Option<bool>,
    op: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BybitTrade {
    #[serde(rename = "T")]
    ts: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "v")]
    size: String,
}

pub struct BybitFeed {
    subscriptions: Vec<Asset>,
}

impl BybitFeed {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }
}

impl Default for BybitFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for BybitFeed {
    fn provider(&self) -> Provider {
        Provider::Bybit
    }

    fn subscribe(&mut self, assets: &[Asset]) {
        self.subscriptions = assets.to_vec();
    }

    async fn connect(&mut self, tx: Sender<SourceEvent>) -> Result<()> {
        let topics: Vec<String> = self
            .subscriptions
            .iter()
            .map(|a| format!("publicTrade.{}", a.trading_pair()))
            .collect();

        if topics.is_empty() {
            bail!("No subscriptions configured for Bybit");
        }

        let (ws_stream, _) = connect_async(BYBIT_WS_URL)
            .await
            .context("Failed to connect to Bybit WebSocket")?;

        let (mut write, mut read) = ws_stream.split();

        let sub_msg = SubscribeMsg {
            req_id: Some("sub_1".to_string()),
            op: "subscribe".to_string(),
            args: topics,
        };
        write
            .send(Message::Text(serde_json::to_string(&sub_msg)?))
            .await?;

        let _ = tx.send(SourceEvent::Connected(Provider::Bybit)).await;
        tracing::info!(
            source = %"Bybit",
            state = %ConnectorState::Subscribed,
            "Connected to Bybit WebSocket"
        );

        // Bybit expects an application-level ping to keep the stream alive.
        let mut ping_timer = tokio::time::interval(PING_INTERVAL);
        ping_timer.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    let ping = serde_json::json!({"op": "ping"}).to_string();
                    if write.send(Message::Text(ping)).await.is_err() {
                        break;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            for trade in parse_message(&text) {
                                let _ = tx.send(SourceEvent::Trade(trade)).await;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::warn!(source = %"Bybit", "Connection closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::error!(source = %"Bybit", error = %e, "WebSocket error");
                            break;
                        }
                        None => {
                            tracing::warn!(source = %"Bybit", "Stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        let _ = tx.send(SourceEvent::Disconnected(Provider::Bybit)).await;
        Ok(())
    }
}

/// Parse one stream message into its normalized trades. Subscription acks,
/// pong responses and unrelated topics yield an empty batch.
fn parse_message(text: &str) -> Vec<NormalizedTrade> {
    let msg: BybitMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => return Vec::new(),
    };

    if msg.op.as_deref() == Some("pong") || msg.success.is_some() {
        return Vec::new();
    }

    match msg.topic.as_deref() {
        Some(t) if t.starts_with("publicTrade.") => {}
        _ => return Vec::new(),
    }

    let trades: Vec<BybitTrade> = match msg.data.and_then(|d| serde_json::from_value(d).ok()) {
        Some(t) => t,
        None => return Vec::new(),
    };

    trades
        .into_iter()
        .filter_map(|t| {
            let asset = Asset::parse(&t.symbol)?;
            let price: f64 = t.price.parse().ok()?;
            let volume: f64 = t.size.parse().ok()?;
            if price <= 0.0 || volume < 0.0 {
                return None;
            }
            Some(NormalizedTrade {
                ts: t.ts,
                asset,
                price,
                volume,
                provider: Provider::Bybit,
            })
        })
        .collect()
}
