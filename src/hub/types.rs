//! Hub wire types
//!
//! DTOs for the HTTP/WebSocket query surface.

use serde::Serialize;
use std::collections::HashMap;

use crate::types::{Candle, Provider, ProviderQuote};

/// Incremental update, one per trade-triggering change
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMessage {
    pub instrument: String,
    pub price: f64,
    pub timestamp: i64,
    /// Last N candles per timeframe name
    pub candles: HashMap<String, Vec<Candle>>,
}

/// Per-instrument slice of the full snapshot
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSnapshot {
    pub price: Option<f64>,
    pub timestamp: Option<i64>,
    pub candles: HashMap<String, Vec<Candle>>,
}

/// Full snapshot, sent once per subscriber before any incremental message.
/// Incremental updates are bare `UpdateMessage`s; only the hello carries a
/// type tag.
#[derive(Debug, Clone, Serialize)]
pub struct InitialMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: HashMap<String, InstrumentSnapshot>,
}

impl InitialMessage {
    pub fn new(data: HashMap<String, InstrumentSnapshot>) -> Self {
        Self {
            kind: "initial",
            data,
        }
    }
}

/// REST response for the price endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PriceResponse {
    pub instrument: String,
    pub price: f64,
    pub timestamp: i64,
    pub provider_quotes: HashMap<String, ProviderQuote>,
}

impl PriceResponse {
    pub fn new(
        instrument: String,
        price: f64,
        timestamp: i64,
        quotes: &HashMap<Provider, ProviderQuote>,
    ) -> Self {
        Self {
            instrument,
            price,
            timestamp,
            provider_quotes: quotes
                .iter()
                .map(|(provider, quote)| (provider.to_string(), *quote))
                .collect(),
        }
    }
}

/// Standard REST envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
