//! PriceHub Library
//!
//! Multi-provider price aggregation and OHLC candle engine

pub mod config;
pub mod engine;
pub mod feed;
pub mod hub;
pub mod registry;
pub mod types;
