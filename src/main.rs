//! PriceHub entry point
//!
//! Wires config, registry, engine, feed connectors and the HTTP/WS surface.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use pricehub::config::AppConfig;
use pricehub::engine::Engine;
use pricehub::feed::{self, BinanceFeed, BybitFeed, CoinbaseFeed, FeedSource};
use pricehub::hub::{create_router, Broadcaster};
use pricehub::registry::InstrumentRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::load()?;
    tracing::info!(config = %cfg.digest(), "Starting PriceHub");

    let registry = InstrumentRegistry::from_config(&cfg.market)?;
    let broadcaster = Broadcaster::new(cfg.server.broadcast_capacity);
    let engine = Engine::spawn(registry, &cfg, broadcaster.clone());

    // One supervised connector task per enabled provider; each retries
    // forever with a fixed delay.
    let reconnect_delay = Duration::from_millis(cfg.feeds.reconnect_delay_ms);
    let mut sources: Vec<Box<dyn FeedSource>> = Vec::new();
    if cfg.feeds.binance_enabled {
        sources.push(Box::new(BinanceFeed::new()));
    }
    if cfg.feeds.bybit_enabled {
        sources.push(Box::new(BybitFeed::new()));
    }
    if cfg.feeds.coinbase_enabled {
        sources.push(Box::new(CoinbaseFeed::new()));
    }

    let mut connector_tasks = Vec::new();
    for mut source in sources {
        source.subscribe(engine.registry().instruments());
        connector_tasks.push(tokio::spawn(feed::run_source(
            source,
            engine.intake(),
            reconnect_delay,
        )));
    }

    let router = create_router(engine, broadcaster);
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind_addr))?;
    tracing::info!(addr = %cfg.server.bind_addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    for task in connector_tasks {
        task.abort();
    }

    Ok(())
}
