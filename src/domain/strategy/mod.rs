//! Strategy variants.
//!
//! A [`SignalRule`] owns the variant's derived series (a candle aggregator or
//! a brick engine) and turns them into entry candidates and variant-specific
//! exit conditions. Position handling shared by every variant lives in
//! [`crate::domain::engine`].

pub mod breakout;
pub mod divergence;
pub mod trend;

use crate::domain::brick::Brick;
use crate::domain::candle::Candle;
use crate::domain::indicator::IndicatorResult;
use crate::domain::position::{Position, Side};
use crate::domain::settings::{StrategyKind, StrategySettings, VariantSettings};
use crate::domain::signal::IndicatorSnapshot;
use crate::domain::tick::Tick;

pub use breakout::BreakoutRule;
pub use divergence::DivergenceRule;
pub use trend::TrendRule;

/// New durable records produced while folding one event in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesUpdate {
    pub candle: Option<Candle>,
    pub bricks: Vec<Brick>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryCandidate {
    pub side: Side,
    pub strength: f64,
    pub reason: String,
    /// Level stored on the position, e.g. the broken range boundary.
    pub reference: Option<f64>,
}

/// Result of one evaluation cycle with every indicator the rule depends on ready.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub entry: Option<EntryCandidate>,
    pub snapshot: IndicatorSnapshot,
    /// Reading checked against the volatility band and used for the regime.
    pub filter_bps: f64,
    pub atr: f64,
    pub atr_bps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalePlan {
    pub size: f64,
    /// Multiple of the base stop distance applied after the add fills.
    pub stop_widen_factor: f64,
}

pub trait SignalRule: Send {
    fn kind(&self) -> StrategyKind;

    /// Folds a tick into the derived series. `prices` is the price history
    /// including this tick.
    fn on_tick(&mut self, tick: &Tick, prices: &[f64]) -> SeriesUpdate;

    /// Folds in a completed candle supplied by the feed.
    fn on_candle(&mut self, candle: Candle) -> SeriesUpdate;

    /// Rebuilds the derived series from storage.
    fn restore(&mut self, candles: Vec<Candle>, bricks: Vec<Brick>);

    fn evaluate(&self, price: f64, prices: &[f64]) -> IndicatorResult<Evaluation>;

    /// Variant-specific exit condition for an open position; returns the reason.
    fn reversal(&self, position: &Position, price: f64, now: i64, eval: &Evaluation)
    -> Option<String>;

    /// A new stop level, if the variant trails its stop.
    fn trailing_stop(&self, _position: &Position, _price: f64, _eval: &Evaluation) -> Option<f64> {
        None
    }

    /// An add to the open position, if the variant scales in.
    fn scale_in(
        &self,
        _position: &Position,
        _price: f64,
        _now: i64,
        _eval: &Evaluation,
    ) -> Option<ScalePlan> {
        None
    }
}

pub fn build_rule(settings: &StrategySettings) -> Box<dyn SignalRule> {
    match &settings.variant {
        VariantSettings::Trend(params) => Box::new(TrendRule::new(
            params.clone(),
            settings.volatility_period,
            settings.caps.candles,
        )),
        VariantSettings::Divergence(params) => {
            Box::new(DivergenceRule::new(params.clone(), settings.volatility_period))
        }
        VariantSettings::Breakout(params) => {
            Box::new(BreakoutRule::new(params.clone(), settings.caps.candles))
        }
    }
}
