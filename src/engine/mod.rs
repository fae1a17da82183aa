//! Engine - per-instrument aggregation pipeline
//!
//! Routes every trade for an instrument through that instrument's single
//! worker task, which owns the aggregator and candle state. Readers only see
//! published results; connectors only submit events. A read lock over one
//! instrument's state yields a consistent price/candle snapshot.

mod aggregator;
mod candles;

pub use aggregator::PriceAggregator;
pub use candles::{CandleBuilder, CandleEvent};

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

use crate::config::AppConfig;
use crate::feed::SourceEvent;
use crate::hub::{Broadcaster, InstrumentSnapshot, UpdateMessage};
use crate::registry::InstrumentRegistry;
use crate::types::{
    now_ms, AggregatedPrice, Asset, Candle, NormalizedTrade, Provider, ProviderQuote, Timeframe,
};

/// Errors on the query surface; reported to the caller, never fatal
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),
    #[error("no price yet for {0}")]
    PriceUnavailable(String),
}

/// Consistent point-in-time view of one instrument's price
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    pub asset: Asset,
    pub price: AggregatedPrice,
    pub quotes: HashMap<Provider, ProviderQuote>,
}

/// Mutable per-instrument state; written only by that instrument's worker
struct InstrumentState {
    aggregator: PriceAggregator,
    candles: CandleBuilder,
}

/// Handle to the running pipeline: trade intake plus snapshot queries
#[derive(Clone)]
pub struct Engine {
    registry: Arc<InstrumentRegistry>,
    states: Arc<HashMap<Asset, Arc<RwLock<InstrumentState>>>>,
    intake_tx: mpsc::Sender<SourceEvent>,
    snapshot_limit: usize,
}

impl Engine {
    /// Build per-instrument state and spawn the router plus one worker task
    /// per instrument.
    pub fn spawn(
        registry: InstrumentRegistry,
        cfg: &AppConfig,
        broadcaster: Broadcaster,
    ) -> Engine {
        let registry = Arc::new(registry);
        let snapshot_limit = cfg.candles.snapshot_limit;

        let mut states = HashMap::new();
        let mut workers: HashMap<Asset, mpsc::Sender<NormalizedTrade>> = HashMap::new();

        for &asset in registry.instruments() {
            let state = Arc::new(RwLock::new(InstrumentState {
                aggregator: PriceAggregator::new(cfg.market.quote_staleness_ms),
                candles: CandleBuilder::new(registry.timeframes(), cfg.candles.max_history),
            }));
            states.insert(asset, state.clone());

            let (worker_tx, worker_rx) = mpsc::channel(cfg.feeds.intake_buffer);
            workers.insert(asset, worker_tx);

            tokio::spawn(run_worker(
                asset,
                worker_rx,
                state,
                registry.timeframes().to_vec(),
                snapshot_limit,
                broadcaster.clone(),
            ));
        }

        let (intake_tx, intake_rx) = mpsc::channel(cfg.feeds.intake_buffer);
        tokio::spawn(run_router(intake_rx, workers, registry.clone()));

        Engine {
            registry,
            states: Arc::new(states),
            intake_tx,
            snapshot_limit,
        }
    }

    /// Sender for the shared intake channel; connectors submit events here
    pub fn intake(&self) -> mpsc::Sender<SourceEvent> {
        self.intake_tx.clone()
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Candle depth carried by snapshots, broadcast updates and the REST
    /// candle endpoint
    pub fn snapshot_limit(&self) -> usize {
        self.snapshot_limit
    }

    /// Tracked instrument identifiers
    pub fn instruments(&self) -> Vec<String> {
        self.registry
            .instruments()
            .iter()
            .map(|a| a.to_string())
            .collect()
    }

    /// Current aggregated price with per-provider raw quotes
    pub async fn price(&self, instrument: &str) -> Result<PriceSnapshot, QueryError> {
        let asset = self.resolve(instrument)?;
        let state = self.states[&asset].read().await;

        let price = state
            .aggregator
            .price()
            .ok_or_else(|| QueryError::PriceUnavailable(instrument.to_string()))?;

        Ok(PriceSnapshot {
            asset,
            price,
            quotes: state.aggregator.quotes().clone(),
        })
    }

    /// Latest raw quote per provider, regardless of whether a price exists
    pub async fn raw_quotes(
        &self,
        instrument: &str,
    ) -> Result<HashMap<Provider, ProviderQuote>, QueryError> {
        let asset = self.resolve(instrument)?;
        let state = self.states[&asset].read().await;
        Ok(state.aggregator.quotes().clone())
    }

    /// Last `limit` candles, chronological, most-recent-last
    pub async fn candles(
        &self,
        instrument: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, QueryError> {
        let asset = self.resolve(instrument)?;
        let tf = self
            .registry
            .resolve_timeframe(timeframe)
            .ok_or_else(|| QueryError::UnknownTimeframe(timeframe.to_string()))?;

        let state = self.states[&asset].read().await;
        Ok(state.candles.last_n(tf, limit))
    }

    /// Full snapshot of every instrument for the subscription hello message
    pub async fn snapshot(&self) -> HashMap<String, InstrumentSnapshot> {
        let mut data = HashMap::new();
        for &asset in self.registry.instruments() {
            let state = self.states[&asset].read().await;
            data.insert(
                asset.to_string(),
                build_snapshot(&state, self.registry.timeframes(), self.snapshot_limit),
            );
        }
        data
    }

    fn resolve(&self, instrument: &str) -> Result<Asset, QueryError> {
        self.registry
            .resolve(instrument)
            .ok_or_else(|| QueryError::UnknownInstrument(instrument.to_string()))
    }
}

fn build_snapshot(
    state: &InstrumentState,
    timeframes: &[Timeframe],
    limit: usize,
) -> InstrumentSnapshot {
    let price = state.aggregator.price();
    InstrumentSnapshot {
        price: price.map(|p| p.price),
        timestamp: price.map(|p| p.updated_at),
        candles: timeframes
            .iter()
            .map(|tf| (tf.to_string(), state.candles.last_n(*tf, limit)))
            .collect(),
    }
}

/// Consume the shared intake channel and forward each trade to its
/// instrument's worker. Awaiting a full worker buffer backpressures the
/// intake, never the subscribers.
async fn run_router(
    mut intake_rx: mpsc::Receiver<SourceEvent>,
    workers: HashMap<Asset, mpsc::Sender<NormalizedTrade>>,
    registry: Arc<InstrumentRegistry>,
) {
    while let Some(event) = intake_rx.recv().await {
        match event {
            SourceEvent::Trade(trade) => {
                if !registry.contains(trade.asset) {
                    continue;
                }
                if let Some(worker) = workers.get(&trade.asset) {
                    if worker.send(trade).await.is_err() {
                        return;
                    }
                }
            }
            SourceEvent::Connected(provider) => {
                tracing::info!(source = %provider, "Feed connected");
            }
            SourceEvent::Disconnected(provider) => {
                tracing::warn!(source = %provider, "Feed disconnected");
            }
            SourceEvent::Error(provider, error) => {
                tracing::error!(source = %provider, error = %error, "Feed error");
            }
        }
    }
}

/// Single writer for one instrument: apply the trade, then publish one
/// update to the broadcast hub.
async fn run_worker(
    asset: Asset,
    mut rx: mpsc::Receiver<NormalizedTrade>,
    state: Arc<RwLock<InstrumentState>>,
    timeframes: Vec<Timeframe>,
    snapshot_limit: usize,
    broadcaster: Broadcaster,
) {
    while let Some(trade) = rx.recv().await {
        let update = {
            let mut state = state.write().await;
            state.aggregator.apply(&trade, now_ms());
            state.candles.apply(&trade);

            // No update until the first qualifying trade sets a price.
            state.aggregator.price().map(|price| UpdateMessage {
                instrument: asset.to_string(),
                price: price.price,
                timestamp: price.updated_at,
                candles: timeframes
                    .iter()
                    .map(|tf| (tf.to_string(), state.candles.last_n(*tf, snapshot_limit)))
                    .collect(),
            })
        };

        if let Some(update) = update {
            broadcaster.broadcast_update(&update);
        }
    }
}
