//! Momentum divergence on ATR-sized bricks.
//!
//! Bricks are built from the tick stream with a size derived from the price
//! ATR. Entries follow a confirmed divergence between brick extremes and the
//! momentum index; the confidence is raised when price also sits at the
//! matching Bollinger band edge. While a divergence persists against an
//! adverse move the position is scaled into, each add widening the stop.

use super::{EntryCandidate, Evaluation, ScalePlan, SeriesUpdate, SignalRule};
use crate::domain::brick::{Brick, BrickEngine, Direction};
use crate::domain::candle::Candle;
use crate::domain::divergence::{DivergenceKind, detect};
use crate::domain::indicator::{
    IndicatorResult, NotReady, atr_from_prices, bollinger, momentum_series, to_bps,
    volatility_bps,
};
use crate::domain::position::{Position, Side};
use crate::domain::settings::{DivergenceParams, StrategyKind};
use crate::domain::signal::IndicatorSnapshot;
use crate::domain::tick::Tick;

pub struct DivergenceRule {
    params: DivergenceParams,
    volatility_period: usize,
    bricks: BrickEngine,
}

impl DivergenceRule {
    pub fn new(params: DivergenceParams, volatility_period: usize) -> Self {
        let bricks = BrickEngine::new(params.brick.clone());
        Self {
            params,
            volatility_period,
            bricks,
        }
    }

    pub fn bricks(&self) -> &BrickEngine {
        &self.bricks
    }

    /// True when the last `count` bricks all moved against `side`.
    fn bricks_against(&self, side: Side, count: usize) -> bool {
        let against = match side {
            Side::Long => Direction::Down,
            Side::Short => Direction::Up,
        };
        let window = self.bricks.bricks();
        count > 0
            && window.len() >= count
            && window.iter().rev().take(count).all(|b| b.direction == against)
    }
}

impl SignalRule for DivergenceRule {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Divergence
    }

    fn on_tick(&mut self, tick: &Tick, prices: &[f64]) -> SeriesUpdate {
        let atr = atr_from_prices(prices, self.params.atr_period)
            .ok()
            .map(|a| a.value);
        SeriesUpdate {
            candle: None,
            bricks: self.bricks.on_tick(tick, atr),
        }
    }

    fn on_candle(&mut self, _candle: Candle) -> SeriesUpdate {
        SeriesUpdate::default()
    }

    fn restore(&mut self, _candles: Vec<Candle>, bricks: Vec<Brick>) {
        self.bricks.seed(bricks);
    }

    fn evaluate(&self, price: f64, prices: &[f64]) -> IndicatorResult<Evaluation> {
        let p = &self.params;
        let bricks = self.bricks.bricks().to_vec();
        let highs: Vec<f64> = bricks.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bricks.iter().map(|b| b.low).collect();
        let closes: Vec<f64> = bricks.iter().map(|b| b.close).collect();

        let momentum = momentum_series(&highs, &lows, p.mi_fast, p.mi_slow);
        let Some(current) = momentum.last().copied().flatten() else {
            return Err(NotReady {
                have: bricks.len(),
                need: p.mi_fast.max(p.mi_slow),
            });
        };

        let bands = bollinger(&closes, p.bb_period, p.bb_std)?;
        let bb_position = bands.position_of(price);
        let vol = volatility_bps(prices, self.volatility_period)?;
        let atr = atr_from_prices(prices, p.atr_period)?;

        let divergence = detect(&bricks, &momentum, Some(bb_position), &p.detector);
        let entry = if divergence.is_actionable(p.detector.confirmation_bricks, 0.0) {
            let side = match divergence.kind {
                DivergenceKind::Bullish => Some(Side::Long),
                DivergenceKind::Bearish => Some(Side::Short),
                DivergenceKind::None => None,
            };
            side.map(|side| EntryCandidate {
                side,
                strength: divergence.confidence(),
                reason: format!(
                    "{:?} divergence, strength {:.2}, {} bricks since extremum{}",
                    divergence.kind,
                    divergence.strength,
                    divergence.bricks_since_extremum,
                    if divergence.bb_enhanced { ", at band edge" } else { "" }
                ),
                reference: None,
            })
        } else {
            None
        };

        Ok(Evaluation {
            entry,
            snapshot: IndicatorSnapshot {
                price,
                bb_position: Some(bb_position),
                atr_bps: Some(atr.bps),
                volatility_bps: Some(vol),
                momentum: Some(current),
                ..IndicatorSnapshot::default()
            },
            filter_bps: vol,
            atr: atr.value,
            atr_bps: atr.bps,
        })
    }

    fn reversal(&self, position: &Position, _price: f64, _now: i64, eval: &Evaluation) -> Option<String> {
        if let Some(entry) = &eval.entry {
            if entry.side != position.side {
                return Some(format!("opposing divergence: {}", entry.reason));
            }
        }

        let momentum = eval.snapshot.momentum?;
        let momentum_against = match position.side {
            Side::Long => momentum < 0.0,
            Side::Short => momentum > 0.0,
        };
        if momentum_against
            && self.bricks_against(position.side, self.params.detector.confirmation_bricks)
        {
            return Some(format!("momentum {momentum:.4} turned against position"));
        }
        None
    }

    fn scale_in(&self, position: &Position, price: f64, now: i64, eval: &Evaluation) -> Option<ScalePlan> {
        let s = &self.params.scaling;
        let count = position.scale_count();
        if count >= s.max_scales {
            return None;
        }

        let last_add = position
            .scaled_entries
            .last()
            .map(|e| e.at)
            .unwrap_or(position.opened_at);
        if now - last_add < s.interval_ms {
            return None;
        }

        let adverse_bps = -to_bps(position.excursion(price), position.entry_price);
        if adverse_bps < s.threshold_bps {
            return None;
        }

        // the divergence that justified the entry must still be present
        let persists = eval
            .entry
            .as_ref()
            .is_some_and(|e| e.side == position.side);
        if !persists {
            return None;
        }

        let added: f64 = position.scaled_entries.iter().map(|e| e.size).sum();
        let initial = position.size - added;
        Some(ScalePlan {
            size: initial * s.size_multiplier,
            stop_widen_factor: 1.5 + 0.5 * (count + 1) as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ScaledEntry;

    fn rule() -> DivergenceRule {
        DivergenceRule::new(DivergenceParams::default(), 20)
    }

    fn brick(i: usize, close: f64, direction: Direction) -> Brick {
        let open = match direction {
            Direction::Up => close - 0.1,
            Direction::Down => close + 0.1,
        };
        Brick {
            open_time: i as i64 * 1000,
            open,
            close,
            direction,
            high: open.max(close),
            low: open.min(close),
        }
    }

    fn position() -> Position {
        Position {
            strategy_id: "divergence".into(),
            side: Side::Long,
            entry_price: 100.0,
            size: 1.0,
            stop_loss: 99.93,
            take_profit: 100.12,
            opened_at: 0,
            reference: None,
            scaled_entries: Vec::new(),
        }
    }

    fn eval_with(entry_side: Option<Side>, momentum: f64) -> Evaluation {
        Evaluation {
            entry: entry_side.map(|side| EntryCandidate {
                side,
                strength: 0.5,
                reason: "test".into(),
                reference: None,
            }),
            snapshot: IndicatorSnapshot {
                price: 99.9,
                momentum: Some(momentum),
                ..IndicatorSnapshot::default()
            },
            filter_bps: 3.0,
            atr: 0.05,
            atr_bps: 5.0,
        }
    }

    #[test]
    fn not_ready_until_momentum_warms_up() {
        let mut rule = rule();
        let bricks: Vec<Brick> = (0..10).map(|i| brick(i, 100.0 + i as f64 * 0.1, Direction::Up)).collect();
        rule.restore(Vec::new(), bricks);
        let err = rule.evaluate(101.0, &[100.0; 30]).unwrap_err();
        assert_eq!(err, NotReady { have: 10, need: 34 });
    }

    #[test]
    fn ticks_form_bricks_with_fallback_size() {
        let mut rule = rule();
        // no ATR yet: brick size falls back to 0.1% of price
        assert!(rule.on_tick(&Tick::new(0, 100.0), &[100.0]).bricks.is_empty());
        let update = rule.on_tick(&Tick::new(1000, 100.25), &[100.0, 100.25]);
        assert_eq!(update.bricks.len(), 2);
        assert!(update.candle.is_none());
        assert_eq!(rule.bricks().bricks().len(), 2);
    }

    #[test]
    fn scale_in_after_adverse_move_while_divergence_persists() {
        let rule = rule();
        let pos = position();
        let eval = eval_with(Some(Side::Long), 0.1);

        // 6 bps against the entry, a minute after opening
        let plan = rule.scale_in(&pos, 99.94, 60_000, &eval).unwrap();
        assert!((plan.size - 0.5).abs() < 1e-12);
        assert!((plan.stop_widen_factor - 2.0).abs() < 1e-12);

        // too soon
        assert!(rule.scale_in(&pos, 99.94, 30_000, &eval).is_none());
        // not far enough against
        assert!(rule.scale_in(&pos, 99.97, 60_000, &eval).is_none());
        // divergence gone
        assert!(rule.scale_in(&pos, 99.94, 60_000, &eval_with(None, 0.1)).is_none());
    }

    #[test]
    fn scale_in_stops_at_max_scales() {
        let rule = rule();
        let mut pos = position();
        for i in 0..3 {
            pos.scaled_entries.push(ScaledEntry {
                price: 99.9,
                size: 0.5,
                at: i * 60_000,
            });
        }
        let eval = eval_with(Some(Side::Long), 0.1);
        assert!(rule.scale_in(&pos, 99.0, 600_000, &eval).is_none());
    }

    #[test]
    fn stop_widening_grows_with_each_add() {
        let rule = rule();
        let mut pos = position();
        pos.add_scale(99.9, 0.5, 60_000);
        let eval = eval_with(Some(Side::Long), 0.1);
        let plan = rule.scale_in(&pos, 99.8, 120_000, &eval).unwrap();
        assert!((plan.stop_widen_factor - 2.5).abs() < 1e-12);
        // adds are sized off the initial fill, not the running total
        assert!((plan.size - 0.5).abs() < 1e-12);
    }

    #[test]
    fn reversal_on_opposing_divergence() {
        let rule = rule();
        let reason = rule.reversal(&position(), 99.9, 0, &eval_with(Some(Side::Short), 0.1));
        assert!(reason.unwrap().starts_with("opposing divergence"));
    }

    #[test]
    fn reversal_when_momentum_and_bricks_turn() {
        let mut rule = rule();
        let bricks = vec![
            brick(0, 100.1, Direction::Up),
            brick(1, 100.0, Direction::Down),
            brick(2, 99.9, Direction::Down),
        ];
        rule.restore(Vec::new(), bricks);
        assert!(rule.reversal(&position(), 99.9, 0, &eval_with(None, -0.05)).is_some());
        assert!(rule.reversal(&position(), 99.9, 0, &eval_with(None, 0.05)).is_none());
    }
}
