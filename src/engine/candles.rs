//! Candle Builder - incremental OHLCV series from the trade stream
//!
//! Maintains one bounded series per timeframe. The last candle in a series
//! is the open one; a trade either mutates it in place or appends a fresh
//! bucket. Every timeframe is built directly from raw trades.

use std::collections::{HashMap, VecDeque};

use crate::types::{Candle, NormalizedTrade, Timeframe};

/// What a trade did to one timeframe's series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleEvent {
    /// A new candle was appended
    Opened,
    /// The open candle was updated in place
    Updated,
}

/// Per-instrument candle builder across all configured timeframes
#[derive(Debug)]
pub struct CandleBuilder {
    series: HashMap<Timeframe, VecDeque<Candle>>,
    timeframes: Vec<Timeframe>,
    max_history: usize,
}

impl CandleBuilder {
    pub fn new(timeframes: &[Timeframe], max_history: usize) -> Self {
        Self {
            series: timeframes.iter().map(|tf| (*tf, VecDeque::new())).collect(),
            timeframes: timeframes.to_vec(),
            max_history,
        }
    }

    /// Apply one trade to every timeframe independently.
    ///
    /// A trade whose bucket differs from the open candle's always appends,
    /// even when its timestamp is older than the open bucket (out-of-order
    /// delivery is applied as-is, not reordered or rejected).
    pub fn apply(&mut self, trade: &NormalizedTrade) -> Vec<(Timeframe, CandleEvent)> {
        let mut events = Vec::with_capacity(self.timeframes.len());

        for tf in &self.timeframes {
            let duration = tf.duration_ms();
            let bucket = trade.ts - trade.ts.rem_euclid(duration);
            let series = self.series.entry(*tf).or_default();

            let event = match series.back_mut() {
                Some(current) if current.open_time == bucket => {
                    current.high = current.high.max(trade.price);
                    current.low = current.low.min(trade.price);
                    current.close = trade.price;
                    current.volume += trade.volume;
                    CandleEvent::Updated
                }
                _ => {
                    series.push_back(Candle::from_trade(bucket, trade.price, trade.volume));
                    while series.len() > self.max_history {
                        series.pop_front();
                    }
                    CandleEvent::Opened
                }
            };
            events.push((*tf, event));
        }

        events
    }

    /// Last `n` candles for one timeframe, chronological, most-recent-last
    pub fn last_n(&self, timeframe: Timeframe, n: usize) -> Vec<Candle> {
        self.series
            .get(&timeframe)
            .map(|s| {
                s.iter()
                    .skip(s.len().saturating_sub(n))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of candles currently retained for one timeframe
    pub fn len(&self, timeframe: Timeframe) -> usize {
        self.series.get(&timeframe).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, timeframe: Timeframe) -> bool {
        self.len(timeframe) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Asset, Provider};

    // 2023-11-14 22:13:20 UTC, minute-aligned
    const BASE_TS: i64 = 1_700_000_000_000 - 1_700_000_000_000 % 60_000;

    fn make_trade(ts: i64, price: f64, volume: f64) -> NormalizedTrade {
        NormalizedTrade {
            ts,
            asset: Asset::BTC,
            price,
            volume,
            provider: Provider::Binance,
        }
    }

    #[test]
    fn test_two_bucket_scenario() {
        let mut builder = CandleBuilder::new(&[Timeframe::Min1], 100);

        builder.apply(&make_trade(BASE_TS, 45000.0, 1.0));
        builder.apply(&make_trade(BASE_TS + 30_000, 45100.0, 1.0));
        builder.apply(&make_trade(BASE_TS + 90_000, 44900.0, 2.0));

        let candles = builder.last_n(Timeframe::Min1, 10);
        assert_eq!(candles.len(), 2);

        let first = candles[0];
        assert_eq!(first.open_time, BASE_TS);
        assert_eq!(first.open, 45000.0);
        assert_eq!(first.high, 45100.0);
        assert_eq!(first.low, 45000.0);
        assert_eq!(first.close, 45100.0);
        assert_eq!(first.volume, 2.0);

        let second = candles[1];
        assert_eq!(second.open_time, BASE_TS + 60_000);
        assert_eq!(second.open, 44900.0);
        assert_eq!(second.high, 44900.0);
        assert_eq!(second.low, 44900.0);
        assert_eq!(second.close, 44900.0);
        assert_eq!(second.volume, 2.0);
    }

    #[test]
    fn test_ohlc_invariants() {
        let mut builder = CandleBuilder::new(&[Timeframe::Min5], 100);
        let prices = [100.0, 104.0, 98.0, 101.0, 99.5];
        for (i, p) in prices.iter().enumerate() {
            builder.apply(&make_trade(BASE_TS + i as i64 * 1000, *p, 1.0));
        }

        let candle = builder.last_n(Timeframe::Min5, 1)[0];
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 104.0);
        assert_eq!(candle.low, 98.0);
        assert_eq!(candle.close, 99.5);
        assert_eq!(candle.volume, 5.0);
        assert!(candle.high >= candle.open && candle.high >= candle.close);
        assert!(candle.low <= candle.open && candle.low <= candle.close);
    }

    #[test]
    fn test_bucket_alignment_per_timeframe() {
        let mut builder = CandleBuilder::new(&Timeframe::ALL, 100);
        builder.apply(&make_trade(BASE_TS + 42_123, 50000.0, 1.0));

        for tf in Timeframe::ALL {
            let candle = builder.last_n(tf, 1)[0];
            assert_eq!(candle.open_time % tf.duration_ms(), 0, "{tf}");
            assert!(candle.open_time <= BASE_TS + 42_123);
        }
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let mut builder = CandleBuilder::new(&[Timeframe::Min1], 5);
        for i in 0..20 {
            builder.apply(&make_trade(BASE_TS + i * 60_000, 100.0 + i as f64, 1.0));
        }

        assert_eq!(builder.len(Timeframe::Min1), 5);
        let candles = builder.last_n(Timeframe::Min1, 10);
        // Oldest evicted first: the survivors are the last five buckets
        assert_eq!(candles[0].open_time, BASE_TS + 15 * 60_000);
        assert_eq!(candles[4].open_time, BASE_TS + 19 * 60_000);
    }

    #[test]
    fn test_out_of_order_trade_appends() {
        let mut builder = CandleBuilder::new(&[Timeframe::Min1], 100);
        builder.apply(&make_trade(BASE_TS + 120_000, 101.0, 1.0));
        // Late trade from a bucket two minutes back
        builder.apply(&make_trade(BASE_TS, 99.0, 1.0));

        let candles = builder.last_n(Timeframe::Min1, 10);
        assert_eq!(candles.len(), 2);
        // Applied as-is: the late bucket lands after the newer one
        assert_eq!(candles[0].open_time, BASE_TS + 120_000);
        assert_eq!(candles[1].open_time, BASE_TS);
    }

    #[test]
    fn test_events_opened_vs_updated() {
        let mut builder = CandleBuilder::new(&[Timeframe::Min1, Timeframe::Hour1], 100);

        let events = builder.apply(&make_trade(BASE_TS, 100.0, 1.0));
        assert!(events.iter().all(|(_, e)| *e == CandleEvent::Opened));

        // 30s later: same bucket in both frames
        let events = builder.apply(&make_trade(BASE_TS + 30_000, 101.0, 1.0));
        assert!(events.iter().all(|(_, e)| *e == CandleEvent::Updated));

        // 2m later: new 1m bucket, same 1h bucket
        let events = builder.apply(&make_trade(BASE_TS + 120_000, 102.0, 1.0));
        let by_tf: std::collections::HashMap<_, _> = events.into_iter().collect();
        assert_eq!(by_tf[&Timeframe::Min1], CandleEvent::Opened);
        assert_eq!(by_tf[&Timeframe::Hour1], CandleEvent::Updated);
    }

    #[test]
    fn test_last_n_truncates() {
        let mut builder = CandleBuilder::new(&[Timeframe::Min1], 100);
        for i in 0..10 {
            builder.apply(&make_trade(BASE_TS + i * 60_000, 100.0, 1.0));
        }

        let candles = builder.last_n(Timeframe::Min1, 3);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[2].open_time, BASE_TS + 9 * 60_000);
    }
}
