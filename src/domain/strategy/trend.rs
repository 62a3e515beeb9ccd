//! Trend-filtered band reversion on one-minute candles.
//!
//! Goes long when price is pinned to the lower Bollinger band with RSI
//! oversold, as long as the fast EMA is not running below the slow one by
//! more than `trend_filter_bps`; shorts mirror this. Exits early once RSI
//! reaches the opposite extreme.

use super::{EntryCandidate, Evaluation, SeriesUpdate, SignalRule};
use crate::domain::brick::Brick;
use crate::domain::candle::{Candle, CandleAggregator};
use crate::domain::indicator::{
    IndicatorResult, atr_from_prices, bollinger, ema, rsi, to_bps, volatility_bps,
};
use crate::domain::position::{Position, Side};
use crate::domain::settings::{StrategyKind, TrendParams};
use crate::domain::signal::IndicatorSnapshot;
use crate::domain::tick::Tick;

pub struct TrendRule {
    params: TrendParams,
    volatility_period: usize,
    candles: CandleAggregator,
}

impl TrendRule {
    pub fn new(params: TrendParams, volatility_period: usize, candle_cap: usize) -> Self {
        let candles = CandleAggregator::new(params.candle_interval_ms, candle_cap);
        Self {
            params,
            volatility_period,
            candles,
        }
    }

    fn entry(&self, price: f64, rsi: f64, bb_position: f64, spread_bps: f64) -> Option<EntryCandidate> {
        let p = &self.params;
        let edge = 1.0 - p.bb_touch;

        if bb_position <= edge && rsi <= p.rsi_oversold && spread_bps > -p.trend_filter_bps {
            let rsi_depth = (p.rsi_oversold - rsi) / p.rsi_oversold;
            let band_depth = if edge > 0.0 { (edge - bb_position) / edge } else { 1.0 };
            return Some(EntryCandidate {
                side: Side::Long,
                strength: (0.5 + 0.25 * rsi_depth + 0.25 * band_depth).clamp(0.0, 1.0),
                reason: format!("lower band touch at {price:.2}, RSI {rsi:.1}"),
                reference: None,
            });
        }

        if bb_position >= p.bb_touch && rsi >= p.rsi_overbought && spread_bps < p.trend_filter_bps {
            let rsi_depth = (rsi - p.rsi_overbought) / (100.0 - p.rsi_overbought);
            let band_depth = if edge > 0.0 {
                (bb_position - p.bb_touch) / edge
            } else {
                1.0
            };
            return Some(EntryCandidate {
                side: Side::Short,
                strength: (0.5 + 0.25 * rsi_depth + 0.25 * band_depth).clamp(0.0, 1.0),
                reason: format!("upper band touch at {price:.2}, RSI {rsi:.1}"),
                reference: None,
            });
        }

        None
    }
}

impl SignalRule for TrendRule {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Trend
    }

    fn on_tick(&mut self, tick: &Tick, _prices: &[f64]) -> SeriesUpdate {
        SeriesUpdate {
            candle: self.candles.on_tick(tick),
            bricks: Vec::new(),
        }
    }

    fn on_candle(&mut self, candle: Candle) -> SeriesUpdate {
        SeriesUpdate {
            candle: self.candles.on_external_candle(candle),
            bricks: Vec::new(),
        }
    }

    fn restore(&mut self, candles: Vec<Candle>, _bricks: Vec<Brick>) {
        self.candles.seed(candles);
    }

    fn evaluate(&self, price: f64, prices: &[f64]) -> IndicatorResult<Evaluation> {
        let p = &self.params;
        // closed candles plus the live price as the forming close
        let mut closes = self.candles.closes();
        closes.push(price);

        let rsi_value = rsi(&closes, p.rsi_period)?;
        let bands = bollinger(&closes, p.bb_period, p.bb_std)?;
        let fast = ema(&closes, p.ema_fast)?;
        let slow = ema(&closes, p.ema_slow)?;
        let vol = volatility_bps(prices, self.volatility_period)?;
        let atr = atr_from_prices(prices, p.atr_period)?;

        let spread_bps = to_bps(fast - slow, price);
        let entry = self.entry(price, rsi_value, bands.position, spread_bps);

        Ok(Evaluation {
            entry,
            snapshot: IndicatorSnapshot {
                price,
                rsi: Some(rsi_value),
                bb_position: Some(bands.position),
                atr_bps: Some(atr.bps),
                volatility_bps: Some(vol),
                ema_fast: Some(fast),
                ema_slow: Some(slow),
                ..IndicatorSnapshot::default()
            },
            filter_bps: vol,
            atr: atr.value,
            atr_bps: atr.bps,
        })
    }

    fn reversal(&self, position: &Position, _price: f64, _now: i64, eval: &Evaluation) -> Option<String> {
        let rsi = eval.snapshot.rsi?;
        match position.side {
            Side::Long if rsi >= self.params.rsi_overbought => {
                Some(format!("RSI {rsi:.1} overbought"))
            }
            Side::Short if rsi <= self.params.rsi_oversold => Some(format!("RSI {rsi:.1} oversold")),
            _ => None,
        }
    }
}
