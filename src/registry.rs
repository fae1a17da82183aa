//! Instrument Registry
//!
//! Static list of tracked instruments and the fixed timeframe set, built
//! once at startup and consulted for validation in every query path.

use anyhow::{bail, Result};

use crate::config::MarketConfig;
use crate::types::{Asset, Timeframe};

#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    instruments: Vec<Asset>,
    timeframes: Vec<Timeframe>,
}

impl InstrumentRegistry {
    /// Build from configuration. Unknown or duplicate symbols are a startup
    /// error, caught before any upstream connection is opened.
    pub fn from_config(cfg: &MarketConfig) -> Result<Self> {
        if cfg.instruments.is_empty() {
            bail!("No instruments configured");
        }

        let mut instruments = Vec::with_capacity(cfg.instruments.len());
        for name in &cfg.instruments {
            let asset = match Asset::parse(name) {
                Some(a) => a,
                None => bail!("Unknown instrument in config: {}", name),
            };
            if instruments.contains(&asset) {
                bail!("Duplicate instrument in config: {}", name);
            }
            instruments.push(asset);
        }

        Ok(Self {
            instruments,
            timeframes: Timeframe::ALL.to_vec(),
        })
    }

    pub fn instruments(&self) -> &[Asset] {
        &self.instruments
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    pub fn contains(&self, asset: Asset) -> bool {
        self.instruments.contains(&asset)
    }

    /// Resolve an instrument name from a query path. Unknown names are a
    /// "not found" for the caller, never a crash.
    pub fn resolve(&self, name: &str) -> Option<Asset> {
        Asset::parse(name).filter(|a| self.contains(*a))
    }

    pub fn resolve_timeframe(&self, name: &str) -> Option<Timeframe> {
        Timeframe::parse(name).filter(|tf| self.timeframes.contains(tf))
    }
}
