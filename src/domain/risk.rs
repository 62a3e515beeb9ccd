//! Adaptive risk controls derived from the trade log.
//!
//! Nothing here is stored: [`AdaptiveRiskState::derive`] rebuilds the state
//! from the most recent trades and the current volatility reading on every
//! entry decision.

use crate::domain::position::{ExitReason, Trade};

/// Upper bound on the adaptive cooldown.
pub const MAX_COOLDOWN_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    /// Consecutive losses that pause entries. Zero disables the pause.
    pub max_losing_streak: usize,
    pub pause_ms: i64,
    pub base_cooldown_ms: i64,
    /// Fraction of size removed once two or more losses in a row are on the books.
    pub streak_size_reduction: f64,
    pub low_vol_bps: f64,
    pub high_vol_bps: f64,
    /// Fraction of size removed in the low-volatility regime.
    pub low_vol_size_reduction: f64,
    pub skip_low_vol_on_streak: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_losing_streak: 3,
            pause_ms: 300_000,
            base_cooldown_ms: 10_000,
            streak_size_reduction: 0.5,
            low_vol_bps: 2.0,
            high_vol_bps: 8.0,
            low_vol_size_reduction: 0.3,
            skip_low_vol_on_streak: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityRegime {
    Unknown,
    Low,
    Normal,
    High,
}

impl VolatilityRegime {
    pub fn classify(volatility_bps: Option<f64>, config: &RiskConfig) -> Self {
        match volatility_bps {
            None => VolatilityRegime::Unknown,
            Some(v) if v < config.low_vol_bps => VolatilityRegime::Low,
            Some(v) if v > config.high_vol_bps => VolatilityRegime::High,
            Some(_) => VolatilityRegime::Normal,
        }
    }
}

/// Why an otherwise valid entry was held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryBlock {
    Paused { until: i64 },
    Cooldown { until: i64 },
    LowVolatilityStreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveRiskState {
    pub consecutive_losses: usize,
    pub paused_until: Option<i64>,
    pub volatility_regime: VolatilityRegime,
    pub cooldown_ms: i64,
    pub cooldown_until: Option<i64>,
}

impl AdaptiveRiskState {
    /// `trades` is oldest first.
    pub fn derive(trades: &[Trade], volatility_bps: Option<f64>, config: &RiskConfig) -> Self {
        let consecutive_losses = trades.iter().rev().take_while(|t| t.is_loss()).count();
        let volatility_regime = VolatilityRegime::classify(volatility_bps, config);
        let last_close = trades.last().map(|t| t.closed_at);

        let paused_until = match last_close {
            Some(closed_at)
                if config.max_losing_streak > 0 && consecutive_losses >= config.max_losing_streak =>
            {
                Some(closed_at + config.pause_ms)
            }
            _ => None,
        };

        let cooldown_ms = adaptive_cooldown(trades, consecutive_losses, volatility_regime, config);
        let cooldown_until = last_close.map(|closed_at| closed_at + cooldown_ms);

        Self {
            consecutive_losses,
            paused_until,
            volatility_regime,
            cooldown_ms,
            cooldown_until,
        }
    }

    pub fn on_losing_streak(&self) -> bool {
        self.consecutive_losses >= 2
    }

    pub fn entry_block(&self, now: i64, config: &RiskConfig) -> Option<EntryBlock> {
        if let Some(until) = self.paused_until {
            if now < until {
                return Some(EntryBlock::Paused { until });
            }
        }
        if let Some(until) = self.cooldown_until {
            if now < until {
                return Some(EntryBlock::Cooldown { until });
            }
        }
        if config.skip_low_vol_on_streak
            && self.on_losing_streak()
            && self.volatility_regime == VolatilityRegime::Low
        {
            return Some(EntryBlock::LowVolatilityStreak);
        }
        None
    }

    /// Multiplier applied to the base position size.
    pub fn size_multiplier(&self, config: &RiskConfig) -> f64 {
        let mut multiplier = 1.0;
        if self.on_losing_streak() {
            multiplier *= 1.0 - config.streak_size_reduction;
        }
        if self.volatility_regime == VolatilityRegime::Low {
            multiplier *= 1.0 - config.low_vol_size_reduction;
        }
        multiplier.clamp(0.0, 1.0)
    }
}

fn adaptive_cooldown(
    trades: &[Trade],
    consecutive_losses: usize,
    regime: VolatilityRegime,
    config: &RiskConfig,
) -> i64 {
    let mut cooldown = config.base_cooldown_ms as f64;
    match regime {
        VolatilityRegime::High => cooldown *= 1.5,
        VolatilityRegime::Low => cooldown *= 0.8,
        _ => {}
    }
    let recent_stops = trades
        .iter()
        .rev()
        .take(5)
        .filter(|t| t.exit_reason == ExitReason::StopLoss)
        .count();
    if recent_stops >= 2 {
        cooldown *= 1.3;
    }
    if consecutive_losses >= 2 {
        cooldown *= 1.2;
    }
    (cooldown.round() as i64).min(MAX_COOLDOWN_MS)
}
