//! Core types used throughout PriceHub
//!
//! Defines the shared vocabulary: instruments, providers, timeframes,
//! normalized trades and candle data.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tracked instruments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    BTC,
    ETH,
    SOL,
    XRP,
}

impl Asset {
    /// Trading pair for Binance/Bybit style APIs (e.g., "BTCUSDT")
    pub fn trading_pair(&self) -> &'static str {
        match self {
            Asset::BTC => "BTCUSDT",
            Asset::ETH => "ETHUSDT",
            Asset::SOL => "SOLUSDT",
            Asset::XRP => "XRPUSDT",
        }
    }

    /// Trading pair for Coinbase (e.g., "BTC-USD")
    pub fn coinbase_pair(&self) -> &'static str {
        match self {
            Asset::BTC => "BTC-USD",
            Asset::ETH => "ETH-USD",
            Asset::SOL => "SOL-USD",
            Asset::XRP => "XRP-USD",
        }
    }

    /// Parse from a symbol string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BTC" | "BTCUSDT" | "BTC-USD" => Some(Asset::BTC),
            "ETH" | "ETHUSDT" | "ETH-USD" => Some(Asset::ETH),
            "SOL" | "SOLUSDT" | "SOL-USD" => Some(Asset::SOL),
            "XRP" | "XRPUSDT" | "XRP-USD" => Some(Asset::XRP),
            _ => None,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::BTC => write!(f, "BTC"),
            Asset::ETH => write!(f, "ETH"),
            Asset::SOL => write!(f, "SOL"),
            Asset::XRP => write!(f, "XRP"),
        }
    }
}

/// Upstream market-data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Binance,
    Bybit,
    Coinbase,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Binance => write!(f, "Binance"),
            Provider::Bybit => write!(f, "Bybit"),
            Provider::Coinbase => write!(f, "Coinbase"),
        }
    }
}

/// Supported candle timeframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Day1,
}

impl Timeframe {
    /// Every supported timeframe; each series is built directly from raw
    /// trades, never derived from a smaller frame.
    pub const ALL: [Timeframe; 9] = [
        Timeframe::Min1,
        Timeframe::Min3,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Min30,
        Timeframe::Hour1,
        Timeframe::Hour2,
        Timeframe::Hour4,
        Timeframe::Day1,
    ];

    /// Bucket duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60_000,
            Timeframe::Min3 => 3 * 60_000,
            Timeframe::Min5 => 5 * 60_000,
            Timeframe::Min15 => 15 * 60_000,
            Timeframe::Min30 => 30 * 60_000,
            Timeframe::Hour1 => 3_600_000,
            Timeframe::Hour2 => 2 * 3_600_000,
            Timeframe::Hour4 => 4 * 3_600_000,
            Timeframe::Day1 => 86_400_000,
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "1m" => Some(Timeframe::Min1),
            "3m" => Some(Timeframe::Min3),
            "5m" => Some(Timeframe::Min5),
            "15m" => Some(Timeframe::Min15),
            "30m" => Some(Timeframe::Min30),
            "1h" => Some(Timeframe::Hour1),
            "2h" => Some(Timeframe::Hour2),
            "4h" => Some(Timeframe::Hour4),
            "1d" => Some(Timeframe::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Min1 => write!(f, "1m"),
            Timeframe::Min3 => write!(f, "3m"),
            Timeframe::Min5 => write!(f, "5m"),
            Timeframe::Min15 => write!(f, "15m"),
            Timeframe::Min30 => write!(f, "30m"),
            Timeframe::Hour1 => write!(f, "1h"),
            Timeframe::Hour2 => write!(f, "2h"),
            Timeframe::Hour4 => write!(f, "4h"),
            Timeframe::Day1 => write!(f, "1d"),
        }
    }
}

/// Provider-agnostic representation of one executed trade.
///
/// Produced by a feed connector, consumed by the aggregator and the candle
/// builder, never stored beyond in-flight processing. Connectors guarantee
/// `price > 0` and `volume >= 0` before emitting.
#[derive(Debug, Clone)]
pub struct NormalizedTrade {
    /// Exchange timestamp in milliseconds
    pub ts: i64,
    pub asset: Asset,
    pub price: f64,
    pub volume: f64,
    pub provider: Provider,
}

/// Latest observed quote for one (instrument, provider) pair.
/// Overwritten on every new trade from that provider.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderQuote {
    pub price: f64,
    pub volume: f64,
    pub ts: i64,
}

/// The single current price derived from all provider quotes that pass the
/// outlier filter.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AggregatedPrice {
    pub price: f64,
    pub updated_at: i64,
}

/// OHLCV candle over one timeframe bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, milliseconds, aligned to the timeframe duration
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn from_trade(open_time: i64, price: f64, volume: f64) -> Self {
        Self {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

/// Current wall-clock time in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_parse_variants() {
        assert_eq!(Asset::parse("btc"), Some(Asset::BTC));
        assert_eq!(Asset::parse("ETHUSDT"), Some(Asset::ETH));
        assert_eq!(Asset::parse("SOL-USD"), Some(Asset::SOL));
        assert_eq!(Asset::parse("DOGE"), None);
    }

    #[test]
    fn test_timeframe_roundtrip() {
        for tf in Timeframe::ALL {
            assert_eq!(Timeframe::parse(&tf.to_string()), Some(tf));
        }
    }

    #[test]
    fn test_timeframe_durations_ascending() {
        let mut last = 0;
        for tf in Timeframe::ALL {
            assert!(tf.duration_ms() > last);
            last = tf.duration_ms();
        }
    }
}
