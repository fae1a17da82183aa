//! Feed connectors (Binance, Bybit, Coinbase)
//!
//! Each connector owns one long-lived WebSocket connection to an upstream
//! provider and translates its wire format into `NormalizedTrade` events on
//! the shared intake channel.

mod binance;
mod bybit;
mod coinbase;

pub use binance::BinanceFeed;
pub use bybit::BybitFeed;
pub use coinbase::CoinbaseFeed;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

use crate::types::{Asset, NormalizedTrade, Provider};

/// Events from feed connectors
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// New normalized trade received
    Trade(NormalizedTrade),
    /// Connection established and subscriptions sent
    Connected(Provider),
    /// Connection lost (error or remote close)
    Disconnected(Provider),
    /// Connector-level error
    Error(Provider, String),
}

/// Trait for upstream feed connectors
#[async_trait]
pub trait FeedSource: Send {
    /// Provider identity
    fn provider(&self) -> Provider;

    /// Record which instruments to subscribe to on connect
    fn subscribe(&mut self, assets: &[Asset]);

    /// Run one full connection lifetime: connect, subscribe, stream trades
    /// into `tx`. Returns when the connection drops; errors mean the
    /// connection could not be established or was lost abnormally.
    async fn connect(&mut self, tx: Sender<SourceEvent>) -> Result<()>;
}

/// Connector lifecycle; no terminal state while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorState::Disconnected => write!(f, "disconnected"),
            ConnectorState::Connecting => write!(f, "connecting"),
            ConnectorState::Subscribed => write!(f, "subscribed"),
        }
    }
}

/// Supervise one connector forever.
///
/// Connection failure is never fatal: every exit from `connect`, clean or
/// not, is followed by a fixed delay and another attempt. No retry ceiling,
/// no exponential growth.
pub async fn run_source(
    mut source: Box<dyn FeedSource>,
    tx: Sender<SourceEvent>,
    reconnect_delay: Duration,
) {
    let provider = source.provider();
    loop {
        tracing::info!(
            source = %provider,
            state = %ConnectorState::Connecting,
            "Connecting to upstream feed"
        );

        match source.connect(tx.clone()).await {
            Ok(()) => {
                tracing::warn!(
                    source = %provider,
                    state = %ConnectorState::Disconnected,
                    "Feed connection closed"
                );
            }
            Err(e) => {
                tracing::error!(
                    source = %provider,
                    state = %ConnectorState::Disconnected,
                    error = %e,
                    "Feed connection failed"
                );
                let _ = tx.send(SourceEvent::Error(provider, e.to_string())).await;
            }
        }

        // Intake channel gone means the engine is shutting down.
        if tx.is_closed() {
            return;
        }

        tracing::info!(
            source = %provider,
            delay_ms = reconnect_delay.as_millis() as u64,
            "Reconnecting after delay"
        );
        tokio::time::sleep(reconnect_delay).await;
    }
}
