//! Price Aggregator - combines trades from multiple providers
//!
//! Keeps the latest quote per provider and recomputes a single robust price
//! on every trade: median-based outlier rejection followed by a
//! volume-weighted average of the surviving quotes.

use std::collections::HashMap;

use crate::types::{AggregatedPrice, NormalizedTrade, Provider, ProviderQuote};

/// Maximum relative deviation from the median before a provider is excluded
/// from the current round
const DEVIATION_LIMIT: f64 = 0.01;

/// Per-instrument price aggregator.
///
/// Quotes are last-write-wins per provider and are never deleted; a provider
/// outside the deviation band merely sits out the round. With
/// `staleness_ms > 0`, quotes older than the window also sit out (but resume
/// voting if the provider comes back).
#[derive(Debug)]
pub struct PriceAggregator {
    quotes: HashMap<Provider, ProviderQuote>,
    current: Option<AggregatedPrice>,
    staleness_ms: i64,
}

impl PriceAggregator {
    pub fn new(staleness_ms: i64) -> Self {
        Self {
            quotes: HashMap::new(),
            current: None,
            staleness_ms,
        }
    }

    /// Apply one trade and recompute the aggregated price.
    ///
    /// `now` is the wall-clock time stamped onto the result. The degenerate
    /// cases (no quote survives the filter, or the survivors carry zero
    /// volume) leave the previous price in place.
    pub fn apply(&mut self, trade: &NormalizedTrade, now: i64) {
        self.quotes.insert(
            trade.provider,
            ProviderQuote {
                price: trade.price,
                volume: trade.volume,
                ts: trade.ts,
            },
        );

        let staleness_ms = self.staleness_ms;
        let live: Vec<ProviderQuote> = self
            .quotes
            .values()
            .filter(|q| staleness_ms <= 0 || now - q.ts <= staleness_ms)
            .copied()
            .collect();

        if live.is_empty() {
            return;
        }

        let median = median_price(&live);

        let mut weighted_sum = 0.0;
        let mut volume_sum = 0.0;
        for quote in &live {
            if ((quote.price - median) / median).abs() <= DEVIATION_LIMIT {
                weighted_sum += quote.price * quote.volume;
                volume_sum += quote.volume;
            }
        }

        if volume_sum <= 0.0 {
            return;
        }

        self.current = Some(AggregatedPrice {
            price: weighted_sum / volume_sum,
            updated_at: now,
        });
    }

    /// Current aggregated price; `None` until the first qualifying trade.
    pub fn price(&self) -> Option<AggregatedPrice> {
        self.current
    }

    /// Latest raw quote per provider
    pub fn quotes(&self) -> &HashMap<Provider, ProviderQuote> {
        &self.quotes
    }
}

fn median_price(quotes: &[ProviderQuote]) -> f64 {
    let mut prices: Vec<f64> = quotes.iter().map(|q| q.price).collect();
    prices.sort_by(|a, b| a.total_cmp(b));
    let mid = prices.len() / 2;
    if prices.len() % 2 == 0 {
        (prices[mid - 1] + prices[mid]) / 2.0
    } else {
        prices[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Asset;

    fn make_trade(provider: Provider, price: f64, volume: f64, ts: i64) -> NormalizedTrade {
        NormalizedTrade {
            ts,
            asset: Asset::BTC,
            price,
            volume,
            provider,
        }
    }

    #[test]
    fn test_single_provider() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 50000.0, 1.0, 1000), 1000);

        let price = agg.price().unwrap();
        assert_eq!(price.price, 50000.0);
        assert_eq!(price.updated_at, 1000);
    }

    #[test]
    fn test_outlier_excluded_from_average() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1000), 1000);
        agg.apply(&make_trade(Provider::Bybit, 101.0, 1.0, 1001), 1001);
        // Coinbase reports 200 - far outside 1% of the median (101)
        agg.apply(&make_trade(Provider::Coinbase, 200.0, 5.0, 1002), 1002);

        let price = agg.price().unwrap();
        // VWAP of Binance and Bybit only, equal volumes
        assert!((price.price - 100.5).abs() < 1e-9);
        // The outlier quote is retained for future rounds
        assert_eq!(agg.quotes().len(), 3);
    }

    #[test]
    fn test_all_within_band_vwap() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1000), 1000);
        agg.apply(&make_trade(Provider::Bybit, 100.5, 3.0, 1001), 1001);

        let price = agg.price().unwrap();
        let expected = (100.0 * 1.0 + 100.5 * 3.0) / 4.0;
        assert!((price.price - expected).abs() < 1e-9);
    }

    #[test]
    fn test_last_write_wins_per_provider() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1000), 1000);
        agg.apply(&make_trade(Provider::Binance, 110.0, 2.0, 1001), 1001);

        assert_eq!(agg.quotes().len(), 1);
        let quote = agg.quotes()[&Provider::Binance];
        assert_eq!(quote.price, 110.0);
        assert_eq!(quote.volume, 2.0);
        assert_eq!(agg.price().unwrap().price, 110.0);
    }

    #[test]
    fn test_zero_volume_preserves_last_price() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1000), 1000);
        let before = agg.price().unwrap();

        // Survivor set has zero total volume; price must not move
        agg.apply(&make_trade(Provider::Binance, 105.0, 0.0, 1001), 1001);
        let after = agg.price().unwrap();
        assert_eq!(after.price, before.price);
        assert_eq!(after.updated_at, before.updated_at);
        // But the quote itself was still overwritten
        assert_eq!(agg.quotes()[&Provider::Binance].price, 105.0);
    }

    #[test]
    fn test_stale_quotes_sit_out_when_enabled() {
        let mut agg = PriceAggregator::new(5_000);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1_000), 1_000);
        // 10s later only Bybit is fresh; Binance should not vote
        agg.apply(&make_trade(Provider::Bybit, 200.0, 1.0, 11_000), 11_000);

        let price = agg.price().unwrap();
        assert_eq!(price.price, 200.0);
        // Stale quote retained, not deleted
        assert_eq!(agg.quotes().len(), 2);
    }

    #[test]
    fn test_stale_provider_keeps_voting_by_default() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1_000), 1_000);
        agg.apply(&make_trade(Provider::Bybit, 100.2, 1.0, 900_000), 900_000);

        // Both vote regardless of age; median is between them, both in band
        let price = agg.price().unwrap();
        assert!((price.price - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_even_count_median_band() {
        let mut agg = PriceAggregator::new(0);
        agg.apply(&make_trade(Provider::Binance, 100.0, 1.0, 1000), 1000);
        agg.apply(&make_trade(Provider::Bybit, 103.0, 1.0, 1001), 1001);

        // Median of {100, 103} is 101.5; both deviate >1% and sit out, so
        // the price stays at the previous round's value.
        let price = agg.price().unwrap();
        assert_eq!(price.price, 100.0);
    }
}
