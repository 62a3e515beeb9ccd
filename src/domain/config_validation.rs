//! Configuration validation.
//!
//! Runs before any strategy starts. Each check reports the offending
//! `[section] key`.

use crate::domain::error::TickwiseError;
use crate::domain::settings::{StrategySettings, VariantSettings};
use crate::ports::config_port::ConfigPort;

pub fn validate_storage_config(config: &dyn ConfigPort) -> Result<(), TickwiseError> {
    match config.get_string("sqlite", "path") {
        Some(path) if !path.trim().is_empty() => {}
        _ => {
            return Err(TickwiseError::ConfigMissing {
                section: "sqlite".to_string(),
                key: "path".to_string(),
            });
        }
    }
    if config.get_int("sqlite", "pool_size", 4) < 1 {
        return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

pub fn validate_strategy_settings(settings: &StrategySettings) -> Result<(), TickwiseError> {
    let section = settings.kind.section();
    validate_sizing(section, settings)?;
    validate_filters(section, settings)?;
    validate_exits(section, settings)?;
    validate_risk(section, settings)?;
    validate_caps(section, settings)?;
    match &settings.variant {
        VariantSettings::Trend(p) => {
            positive(section, "candle_interval_secs", p.candle_interval_ms as f64)?;
            ordered_periods(section, "ema_fast", p.ema_fast, p.ema_slow)?;
            nonzero(section, "bb_period", p.bb_period)?;
            positive(section, "bb_std", p.bb_std)?;
            nonzero(section, "rsi_period", p.rsi_period)?;
            nonzero(section, "atr_period", p.atr_period)?;
            if !(0.5..=1.0).contains(&p.bb_touch) {
                return Err(invalid(section, "bb_touch", "bb_touch must be between 0.5 and 1"));
            }
            rsi_thresholds(section, "rsi_oversold", p.rsi_oversold, p.rsi_overbought)?;
            non_negative(section, "trend_filter_bps", p.trend_filter_bps)?;
        }
        VariantSettings::Divergence(p) => {
            nonzero(section, "atr_period", p.atr_period)?;
            positive(section, "atr_multiplier", p.brick.atr_multiplier)?;
            if !(p.brick.fallback_fraction > 0.0 && p.brick.fallback_fraction < 0.1) {
                return Err(invalid(
                    section,
                    "fallback_fraction",
                    "fallback_fraction must be between 0 and 0.1",
                ));
            }
            nonzero(section, "max_bricks_per_tick", p.brick.max_bricks_per_tick)?;
            if p.detector.lookback < 3 {
                return Err(invalid(section, "lookback", "lookback must be at least 3"));
            }
            if p.detector.lookback > settings.caps.bricks {
                return Err(invalid(section, "lookback", "lookback must not exceed brick_cap"));
            }
            if !(0.0..=0.5).contains(&p.detector.bb_enhancement_threshold) {
                return Err(invalid(
                    section,
                    "bb_enhancement_threshold",
                    "bb_enhancement_threshold must be between 0 and 0.5",
                ));
            }
            ordered_periods(section, "mi_fast", p.mi_fast, p.mi_slow)?;
            nonzero(section, "bb_period", p.bb_period)?;
            positive(section, "bb_std", p.bb_std)?;
            non_negative(section, "scale_threshold_bps", p.scaling.threshold_bps)?;
            non_negative(section, "scale_interval_secs", p.scaling.interval_ms as f64)?;
            if !(p.scaling.size_multiplier > 0.0 && p.scaling.size_multiplier <= 1.0) {
                return Err(invalid(
                    section,
                    "scale_size_multiplier",
                    "scale_size_multiplier must be in (0, 1]",
                ));
            }
        }
        VariantSettings::Breakout(p) => {
            positive(section, "candle_interval_secs", p.candle_interval_ms as f64)?;
            ordered_periods(section, "ema_fast", p.ema_fast, p.ema_slow)?;
            nonzero(section, "rsi_period", p.rsi_period)?;
            rsi_thresholds(section, "rsi_bearish", p.rsi_bearish, p.rsi_bullish)?;
            ordered_periods(section, "macd_fast", p.macd_fast, p.macd_slow)?;
            nonzero(section, "macd_signal", p.macd_signal)?;
            nonzero(section, "atr_period", p.atr_period)?;
            if p.lookback < 2 {
                return Err(invalid(section, "lookback", "lookback must be at least 2"));
            }
            positive(section, "min_atr_expansion", p.min_atr_expansion)?;
            non_negative(section, "trail_activation_atr", p.trail_activation_atr)?;
            positive(section, "trail_distance_atr", p.trail_distance_atr)?;
            non_negative(section, "no_progress_secs", p.no_progress_ms as f64)?;
            let warmup = p.ema_slow.max(p.macd_slow + p.macd_signal).max(p.lookback + 1);
            if settings.caps.candles < warmup {
                return Err(invalid(
                    section,
                    "candle_cap",
                    &format!("candle_cap must hold at least {warmup} candles"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_sizing(section: &str, settings: &StrategySettings) -> Result<(), TickwiseError> {
    positive(section, "base_size", settings.base_size)?;
    non_negative(section, "min_size", settings.min_size)?;
    if settings.min_size > settings.base_size {
        return Err(invalid(section, "min_size", "min_size must not exceed base_size"));
    }
    Ok(())
}

fn validate_filters(section: &str, settings: &StrategySettings) -> Result<(), TickwiseError> {
    if !(0.0..=1.0).contains(&settings.min_strength) {
        return Err(invalid(section, "min_strength", "min_strength must be between 0 and 1"));
    }
    non_negative(section, "vol_min_bps", settings.vol_min_bps)?;
    if settings.vol_max_bps < settings.vol_min_bps {
        return Err(invalid(section, "vol_max_bps", "vol_max_bps must be >= vol_min_bps"));
    }
    nonzero(section, "volatility_period", settings.volatility_period)
}

fn validate_exits(section: &str, settings: &StrategySettings) -> Result<(), TickwiseError> {
    let exits = &settings.exits;
    non_negative(section, "stop_loss_bps", exits.stop_loss_bps)?;
    non_negative(section, "take_profit_bps", exits.take_profit_bps)?;
    non_negative(section, "stop_loss_atr", exits.stop_loss_atr)?;
    non_negative(section, "take_profit_atr", exits.take_profit_atr)?;
    if exits.stop_loss_bps == 0.0 && exits.stop_loss_atr == 0.0 {
        return Err(invalid(
            section,
            "stop_loss_bps",
            "a stop distance is required (stop_loss_bps or stop_loss_atr)",
        ));
    }
    if exits.take_profit_bps == 0.0 && exits.take_profit_atr == 0.0 {
        return Err(invalid(
            section,
            "take_profit_bps",
            "a target distance is required (take_profit_bps or take_profit_atr)",
        ));
    }
    positive(section, "max_hold_secs", exits.max_hold_ms as f64)
}

fn validate_risk(section: &str, settings: &StrategySettings) -> Result<(), TickwiseError> {
    let risk = &settings.risk;
    non_negative(section, "pause_secs", risk.pause_ms as f64)?;
    non_negative(section, "base_cooldown_secs", risk.base_cooldown_ms as f64)?;
    fraction(section, "streak_size_reduction", risk.streak_size_reduction)?;
    fraction(section, "low_vol_size_reduction", risk.low_vol_size_reduction)?;
    non_negative(section, "low_vol_bps", risk.low_vol_bps)?;
    if risk.high_vol_bps < risk.low_vol_bps {
        return Err(invalid(section, "high_vol_bps", "high_vol_bps must be >= low_vol_bps"));
    }
    Ok(())
}

fn validate_caps(section: &str, settings: &StrategySettings) -> Result<(), TickwiseError> {
    let caps = &settings.caps;
    if caps.prices < settings.volatility_period + 1 {
        return Err(invalid(section, "price_cap", "price_cap must exceed volatility_period"));
    }
    nonzero(section, "candle_cap", caps.candles)?;
    nonzero(section, "brick_cap", caps.bricks)
}

fn invalid(section: &str, key: &str, reason: &str) -> TickwiseError {
    TickwiseError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn nonzero(section: &str, key: &str, value: usize) -> Result<(), TickwiseError> {
    if value == 0 {
        return Err(invalid(section, key, &format!("{key} must be at least 1")));
    }
    Ok(())
}

fn positive(section: &str, key: &str, value: f64) -> Result<(), TickwiseError> {
    if !(value > 0.0 && value.is_finite()) {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(())
}

fn non_negative(section: &str, key: &str, value: f64) -> Result<(), TickwiseError> {
    if !(value >= 0.0 && value.is_finite()) {
        return Err(invalid(section, key, &format!("{key} must be non-negative")));
    }
    Ok(())
}

fn fraction(section: &str, key: &str, value: f64) -> Result<(), TickwiseError> {
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(section, key, &format!("{key} must be in [0, 1)")));
    }
    Ok(())
}

fn ordered_periods(section: &str, key: &str, fast: usize, slow: usize) -> Result<(), TickwiseError> {
    if fast == 0 || fast >= slow {
        return Err(invalid(
            section,
            key,
            &format!("{key} must be at least 1 and shorter than the slow period"),
        ));
    }
    Ok(())
}

fn rsi_thresholds(section: &str, key: &str, low: f64, high: f64) -> Result<(), TickwiseError> {
    if !(low > 0.0 && low < high && high < 100.0) {
        return Err(invalid(
            section,
            key,
            "RSI thresholds must satisfy 0 < low < high < 100",
        ));
    }
    Ok(())
}
