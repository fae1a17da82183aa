//! Configuration management for PriceHub
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub feeds: FeedsConfig,
    pub market: MarketConfig,
    pub candles: CandlesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP/WebSocket query surface
    pub bind_addr: String,
    /// Broadcast channel capacity; a subscriber that falls this far behind
    /// is dropped rather than allowed to stall the pipeline
    pub broadcast_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// Enable Binance trade feed
    pub binance_enabled: bool,
    /// Enable Bybit trade feed
    pub bybit_enabled: bool,
    /// Enable Coinbase trade feed
    pub coinbase_enabled: bool,
    /// Fixed delay between reconnect attempts in milliseconds
    pub reconnect_delay_ms: u64,
    /// Shared intake channel buffer (trade events from all connectors)
    pub intake_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Instruments to track (e.g., ["BTC", "ETH"])
    pub instruments: Vec<String>,
    /// Quotes older than this are excluded from the median round.
    /// 0 disables expiry: a silent provider keeps voting its last price.
    pub quote_staleness_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandlesConfig {
    /// Maximum candles retained per (instrument, timeframe) series
    pub max_history: usize,
    /// Candles per timeframe carried in snapshots and broadcast updates
    pub snapshot_limit: usize,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Server defaults
            .set_default("server.bind_addr", "0.0.0.0:8081")?
            .set_default("server.broadcast_capacity", 256)?
            // Feed defaults
            .set_default("feeds.binance_enabled", true)?
            .set_default("feeds.bybit_enabled", true)?
            .set_default("feeds.coinbase_enabled", true)?
            .set_default("feeds.reconnect_delay_ms", 5000)?
            .set_default("feeds.intake_buffer", 1024)?
            // Market defaults
            .set_default("market.instruments", vec!["BTC", "ETH"])?
            .set_default("market.quote_staleness_ms", 0)?
            // Candle defaults
            .set_default("candles.max_history", 500)?
            .set_default("candles.snapshot_limit", 100)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (PRICEHUB_*)
            .add_source(Environment::with_prefix("PRICEHUB").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Generate a digest of the config for the startup log line
    pub fn digest(&self) -> String {
        format!(
            "bind={} instruments={:?} feeds=[binance={} bybit={} coinbase={}] reconnect_ms={} history={}",
            self.server.bind_addr,
            self.market.instruments,
            self.feeds.binance_enabled,
            self.feeds.bybit_enabled,
            self.feeds.coinbase_enabled,
            self.feeds.reconnect_delay_ms,
            self.candles.max_history,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
