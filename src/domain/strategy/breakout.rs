//! Range breakout on fifteen-minute candles.
//!
//! Enters when price clears the high (or low) of the lookback range with
//! momentum confirmation from RSI, the MACD histogram and EMA alignment, and
//! only while ATR is expanding relative to the average true range of the
//! range itself. Once in profit by the activation distance the stop trails
//! the market. A candle closing back inside the range, or a position that has
//! gone nowhere for too long, ends the trade.

use super::{EntryCandidate, Evaluation, SeriesUpdate, SignalRule};
use crate::domain::brick::Brick;
use crate::domain::candle::{Candle, CandleAggregator};
use crate::domain::indicator::{
    IndicatorResult, atr, ema, macd, require, rsi, true_ranges,
};
use crate::domain::position::{Position, Side};
use crate::domain::settings::{BreakoutParams, StrategyKind};
use crate::domain::signal::IndicatorSnapshot;
use crate::domain::tick::Tick;

pub struct BreakoutRule {
    params: BreakoutParams,
    candles: CandleAggregator,
}

impl BreakoutRule {
    pub fn new(params: BreakoutParams, candle_cap: usize) -> Self {
        let candles = CandleAggregator::new(params.candle_interval_ms, candle_cap);
        Self { params, candles }
    }

    pub fn candles(&self) -> &CandleAggregator {
        &self.candles
    }
}

impl SignalRule for BreakoutRule {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Breakout
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

    fn evaluate(&self, price: f64, _prices: &[f64]) -> IndicatorResult<Evaluation> {
        let p = &self.params;
        let closes = self.candles.closes();
        let highs = self.candles.highs();
        let lows = self.candles.lows();
        let lookback = p.lookback.max(1);
        require(closes.len(), lookback + 1)?;

        let rsi_value = rsi(&closes, p.rsi_period)?;
        let macd_value = macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal)?;
        let fast = ema(&closes, p.ema_fast)?;
        let slow = ema(&closes, p.ema_slow)?;
        let atr_value = atr(&highs, &lows, &closes, p.atr_period)?;

        let start = closes.len() - lookback;
        let range_high = highs[start..].iter().copied().fold(f64::MIN, f64::max);
        let range_low = lows[start..].iter().copied().fold(f64::MAX, f64::min);

        let ranges = true_ranges(&highs, &lows, &closes);
        let recent = &ranges[ranges.len().saturating_sub(lookback)..];
        let mean_range = recent.iter().sum::<f64>() / recent.len().max(1) as f64;
        let expansion = if mean_range > 0.0 {
            atr_value.value / mean_range
        } else {
            0.0
        };

        let expanding = expansion >= p.min_atr_expansion;
        let long = price > range_high
            && rsi_value >= p.rsi_bullish
            && macd_value.histogram > 0.0
            && fast > slow;
        let short = price < range_low
            && rsi_value <= p.rsi_bearish
            && macd_value.histogram < 0.0
            && fast < slow;

        let entry = if !expanding || atr_value.value <= 0.0 {
            None
        } else if long || short {
            let (side, level) = if long {
                (Side::Long, range_high)
            } else {
                (Side::Short, range_low)
            };
            let clearance = (price - level).abs() / atr_value.value;
            Some(EntryCandidate {
                side,
                strength: (0.5 + 0.5 * clearance).clamp(0.0, 1.0),
                reason: format!(
                    "broke {lookback}-candle {} {level:.2}, ATR expansion {expansion:.2}",
                    if long { "high" } else { "low" }
                ),
                reference: Some(level),
            })
        } else {
            None
        };

        Ok(Evaluation {
            entry,
            snapshot: IndicatorSnapshot {
                price,
                rsi: Some(rsi_value),
                atr_bps: Some(atr_value.bps),
                volatility_bps: Some(atr_value.bps),
                ema_fast: Some(fast),
                ema_slow: Some(slow),
                macd_histogram: Some(macd_value.histogram),
                ..IndicatorSnapshot::default()
            },
            filter_bps: atr_value.bps,
            atr: atr_value.value,
            atr_bps: atr_value.bps,
        })
    }

    fn reversal(&self, position: &Position, price: f64, now: i64, _eval: &Evaluation) -> Option<String> {
        if let (Some(level), Some(candle)) = (position.reference, self.candles.last_closed()) {
            let closed_since_entry = candle.open_time + self.candles.interval_ms() > position.opened_at;
            let back_inside = match position.side {
                Side::Long => candle.close < level,
                Side::Short => candle.close > level,
            };
            if closed_since_entry && back_inside {
                return Some(format!("candle closed {:.2} back through {level:.2}", candle.close));
            }
        }

        if position.held_ms(now) >= self.params.no_progress_ms && position.pnl_pct(price) <= 0.0 {
            return Some(format!(
                "no progress after {}s",
                position.held_ms(now) / 1000
            ));
        }
        None
    }

    fn trailing_stop(&self, position: &Position, price: f64, eval: &Evaluation) -> Option<f64> {
        let p = &self.params;
        if eval.atr <= 0.0 || position.excursion(price) < p.trail_activation_atr * eval.atr {
            return None;
        }
        Some(price - position.side.sign() * p.trail_distance_atr * eval.atr)
    }
}
