//! Typed settings read from the INI configuration.
//!
//! Each strategy variant has its own section (`[trend]`, `[divergence]`,
//! `[breakout]`). Keys that are absent fall back to the variant's defaults.
//! Durations are configured in seconds and held in milliseconds.

use crate::domain::brick::BrickConfig;
use crate::domain::config_validation::validate_strategy_settings;
use crate::domain::divergence::DivergenceConfig;
use crate::domain::error::TickwiseError;
use crate::domain::risk::RiskConfig;
use crate::ports::config_port::ConfigPort;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Trend,
    Divergence,
    Breakout,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Trend,
        StrategyKind::Divergence,
        StrategyKind::Breakout,
    ];

    pub fn section(&self) -> &'static str {
        match self {
            StrategyKind::Trend => "trend",
            StrategyKind::Divergence => "divergence",
            StrategyKind::Breakout => "breakout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.section() == value)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Process-wide runtime settings from `[engine]`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub feed_capacity: usize,
    pub compaction_interval_secs: u64,
    /// Trades loaded at recovery to rebuild adaptive risk state.
    pub recent_trades: usize,
    pub persist_retries: u32,
    pub persist_backoff_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            feed_capacity: 1024,
            compaction_interval_secs: 300,
            recent_trades: 50,
            persist_retries: 3,
            persist_backoff_ms: 50,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            feed_capacity: config.get_int("engine", "feed_capacity", d.feed_capacity as i64).max(1)
                as usize,
            compaction_interval_secs: config
                .get_int("engine", "compaction_interval_secs", d.compaction_interval_secs as i64)
                .max(1) as u64,
            recent_trades: config.get_int("engine", "recent_trades", d.recent_trades as i64).max(1)
                as usize,
            persist_retries: config
                .get_int("engine", "persist_retries", d.persist_retries as i64)
                .clamp(1, 100) as u32,
            persist_backoff_ms: config
                .get_int("engine", "persist_backoff_ms", d.persist_backoff_ms as i64)
                .max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitSettings {
    /// Floor for the stop distance.
    pub stop_loss_bps: f64,
    pub take_profit_bps: f64,
    /// ATR multiples; the wider of floor and ATR-derived distance is used.
    pub stop_loss_atr: f64,
    pub take_profit_atr: f64,
    pub max_hold_ms: i64,
}

impl ExitSettings {
    pub fn stop_distance_bps(&self, atr_bps: f64) -> f64 {
        self.stop_loss_bps.max(atr_bps * self.stop_loss_atr)
    }

    pub fn target_distance_bps(&self, atr_bps: f64) -> f64 {
        self.take_profit_bps.max(atr_bps * self.take_profit_atr)
    }
}

/// Retention caps for each bounded window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCaps {
    pub prices: usize,
    pub candles: usize,
    pub bricks: usize,
}

impl Default for RetentionCaps {
    fn default() -> Self {
        Self {
            prices: 1000,
            candles: 1000,
            bricks: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendParams {
    pub candle_interval_ms: i64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub bb_touch: f64,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub trend_filter_bps: f64,
    pub atr_period: usize,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            candle_interval_ms: 60_000,
            ema_fast: 8,
            ema_slow: 21,
            bb_period: 20,
            bb_std: 2.0,
            bb_touch: 0.95,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            trend_filter_bps: 15.0,
            atr_period: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleSettings {
    pub max_scales: usize,
    pub interval_ms: i64,
    /// Adverse move from the average entry that triggers an add.
    pub threshold_bps: f64,
    /// Each add as a fraction of the initial size.
    pub size_multiplier: f64,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            max_scales: 3,
            interval_ms: 60_000,
            threshold_bps: 5.0,
            size_multiplier: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceParams {
    pub atr_period: usize,
    pub brick: BrickConfig,
    pub detector: DivergenceConfig,
    pub mi_fast: usize,
    pub mi_slow: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub scaling: ScaleSettings,
}

impl Default for DivergenceParams {
    fn default() -> Self {
        Self {
            atr_period: 14,
            brick: BrickConfig::default(),
            detector: DivergenceConfig::default(),
            mi_fast: 5,
            mi_slow: 34,
            bb_period: 20,
            bb_std: 2.0,
            scaling: ScaleSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutParams {
    pub candle_interval_ms: i64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_bullish: f64,
    pub rsi_bearish: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    pub lookback: usize,
    pub min_atr_expansion: f64,
    pub trail_activation_atr: f64,
    pub trail_distance_atr: f64,
    pub no_progress_ms: i64,
}

impl Default for BreakoutParams {
    fn default() -> Self {
        Self {
            candle_interval_ms: 900_000,
            ema_fast: 20,
            ema_slow: 50,
            rsi_period: 14,
            rsi_bullish: 60.0,
            rsi_bearish: 40.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            lookback: 30,
            min_atr_expansion: 1.1,
            trail_activation_atr: 1.0,
            trail_distance_atr: 0.5,
            no_progress_ms: 1_800_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariantSettings {
    Trend(TrendParams),
    Divergence(DivergenceParams),
    Breakout(BreakoutParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategySettings {
    pub id: String,
    pub kind: StrategyKind,
    pub base_size: f64,
    pub min_size: f64,
    pub min_strength: f64,
    pub vol_min_bps: f64,
    pub vol_max_bps: f64,
    pub volatility_period: usize,
    pub exits: ExitSettings,
    pub risk: RiskConfig,
    pub caps: RetentionCaps,
    pub variant: VariantSettings,
}

impl StrategySettings {
    pub fn defaults(kind: StrategyKind) -> Self {
        let caps = RetentionCaps::default();
        match kind {
            StrategyKind::Trend => Self {
                id: kind.section().to_string(),
                kind,
                base_size: 1.0,
                min_size: 0.1,
                min_strength: 0.3,
                vol_min_bps: 4.0,
                vol_max_bps: 25.0,
                volatility_period: 20,
                exits: ExitSettings {
                    stop_loss_bps: 6.0,
                    take_profit_bps: 3.0,
                    stop_loss_atr: 0.0,
                    take_profit_atr: 0.0,
                    max_hold_ms: 300_000,
                },
                risk: RiskConfig::default(),
                caps,
                variant: VariantSettings::Trend(TrendParams::default()),
            },
            StrategyKind::Divergence => Self {
                id: kind.section().to_string(),
                kind,
                base_size: 1.0,
                min_size: 0.1,
                min_strength: 0.05,
                vol_min_bps: 0.5,
                vol_max_bps: 40.0,
                volatility_period: 20,
                exits: ExitSettings {
                    stop_loss_bps: 7.0,
                    take_profit_bps: 12.0,
                    stop_loss_atr: 0.0,
                    take_profit_atr: 0.0,
                    max_hold_ms: 480_000,
                },
                risk: RiskConfig {
                    max_losing_streak: 5,
                    pause_ms: 180_000,
                    skip_low_vol_on_streak: true,
                    ..RiskConfig::default()
                },
                caps,
                variant: VariantSettings::Divergence(DivergenceParams::default()),
            },
            StrategyKind::Breakout => Self {
                id: kind.section().to_string(),
                kind,
                base_size: 1.0,
                min_size: 0.1,
                min_strength: 0.5,
                vol_min_bps: 3.0,
                vol_max_bps: 15.0,
                volatility_period: 20,
                exits: ExitSettings {
                    stop_loss_bps: 0.0,
                    take_profit_bps: 0.0,
                    stop_loss_atr: 1.5,
                    take_profit_atr: 2.5,
                    max_hold_ms: 3_600_000,
                },
                risk: RiskConfig {
                    max_losing_streak: 2,
                    pause_ms: 300_000,
                    base_cooldown_ms: 20_000,
                    low_vol_bps: 4.0,
                    high_vol_bps: 12.0,
                    ..RiskConfig::default()
                },
                caps,
                variant: VariantSettings::Breakout(BreakoutParams::default()),
            },
        }
    }

    /// Reads the section for `kind`, filling gaps from [`StrategySettings::defaults`].
    pub fn from_config(config: &dyn ConfigPort, kind: StrategyKind) -> Self {
        let d = Self::defaults(kind);
        let s = kind.section();
        let r = Reader { config, section: s };

        let exits = ExitSettings {
            stop_loss_bps: r.double("stop_loss_bps", d.exits.stop_loss_bps),
            take_profit_bps: r.double("take_profit_bps", d.exits.take_profit_bps),
            stop_loss_atr: r.double("stop_loss_atr", d.exits.stop_loss_atr),
            take_profit_atr: r.double("take_profit_atr", d.exits.take_profit_atr),
            max_hold_ms: r.secs("max_hold_secs", d.exits.max_hold_ms),
        };

        let risk = RiskConfig {
            max_losing_streak: r.count("max_losing_streak", d.risk.max_losing_streak),
            pause_ms: r.secs("pause_secs", d.risk.pause_ms),
            base_cooldown_ms: r.secs("base_cooldown_secs", d.risk.base_cooldown_ms),
            streak_size_reduction: r.double("streak_size_reduction", d.risk.streak_size_reduction),
            low_vol_bps: r.double("low_vol_bps", d.risk.low_vol_bps),
            high_vol_bps: r.double("high_vol_bps", d.risk.high_vol_bps),
            low_vol_size_reduction: r
                .double("low_vol_size_reduction", d.risk.low_vol_size_reduction),
            skip_low_vol_on_streak: config.get_bool(
                s,
                "skip_low_vol_on_streak",
                d.risk.skip_low_vol_on_streak,
            ),
        };

        let caps = RetentionCaps {
            prices: r.count("price_cap", d.caps.prices),
            candles: r.count("candle_cap", d.caps.candles),
            bricks: r.count("brick_cap", d.caps.bricks),
        };

        let variant = match d.variant {
            VariantSettings::Trend(p) => VariantSettings::Trend(TrendParams {
                candle_interval_ms: r.secs("candle_interval_secs", p.candle_interval_ms),
                ema_fast: r.count("ema_fast", p.ema_fast),
                ema_slow: r.count("ema_slow", p.ema_slow),
                bb_period: r.count("bb_period", p.bb_period),
                bb_std: r.double("bb_std", p.bb_std),
                bb_touch: r.double("bb_touch", p.bb_touch),
                rsi_period: r.count("rsi_period", p.rsi_period),
                rsi_oversold: r.double("rsi_oversold", p.rsi_oversold),
                rsi_overbought: r.double("rsi_overbought", p.rsi_overbought),
                trend_filter_bps: r.double("trend_filter_bps", p.trend_filter_bps),
                atr_period: r.count("atr_period", p.atr_period),
            }),
            VariantSettings::Divergence(p) => VariantSettings::Divergence(DivergenceParams {
                atr_period: r.count("atr_period", p.atr_period),
                brick: BrickConfig {
                    atr_multiplier: r.double("atr_multiplier", p.brick.atr_multiplier),
                    fallback_fraction: r.double("fallback_fraction", p.brick.fallback_fraction),
                    max_bricks_per_tick: r.count("max_bricks_per_tick", p.brick.max_bricks_per_tick),
                    cap: caps.bricks,
                },
                detector: DivergenceConfig {
                    lookback: r.count("lookback", p.detector.lookback),
                    confirmation_bricks: r
                        .count("confirmation_bricks", p.detector.confirmation_bricks),
                    bb_enhancement_threshold: r.double(
                        "bb_enhancement_threshold",
                        p.detector.bb_enhancement_threshold,
                    ),
                },
                mi_fast: r.count("mi_fast", p.mi_fast),
                mi_slow: r.count("mi_slow", p.mi_slow),
                bb_period: r.count("bb_period", p.bb_period),
                bb_std: r.double("bb_std", p.bb_std),
                scaling: ScaleSettings {
                    max_scales: r.count("max_scales", p.scaling.max_scales),
                    interval_ms: r.secs("scale_interval_secs", p.scaling.interval_ms),
                    threshold_bps: r.double("scale_threshold_bps", p.scaling.threshold_bps),
                    size_multiplier: r.double("scale_size_multiplier", p.scaling.size_multiplier),
                },
            }),
            VariantSettings::Breakout(p) => VariantSettings::Breakout(BreakoutParams {
                candle_interval_ms: r.secs("candle_interval_secs", p.candle_interval_ms),
                ema_fast: r.count("ema_fast", p.ema_fast),
                ema_slow: r.count("ema_slow", p.ema_slow),
                rsi_period: r.count("rsi_period", p.rsi_period),
                rsi_bullish: r.double("rsi_bullish", p.rsi_bullish),
                rsi_bearish: r.double("rsi_bearish", p.rsi_bearish),
                macd_fast: r.count("macd_fast", p.macd_fast),
                macd_slow: r.count("macd_slow", p.macd_slow),
                macd_signal: r.count("macd_signal", p.macd_signal),
                atr_period: r.count("atr_period", p.atr_period),
                lookback: r.count("lookback", p.lookback),
                min_atr_expansion: r.double("min_atr_expansion", p.min_atr_expansion),
                trail_activation_atr: r.double("trail_activation_atr", p.trail_activation_atr),
                trail_distance_atr: r.double("trail_distance_atr", p.trail_distance_atr),
                no_progress_ms: r.secs("no_progress_secs", p.no_progress_ms),
            }),
        };

        Self {
            id: s.to_string(),
            kind,
            base_size: r.double("base_size", d.base_size),
            min_size: r.double("min_size", d.min_size),
            min_strength: r.double("min_strength", d.min_strength),
            vol_min_bps: r.double("vol_min_bps", d.vol_min_bps),
            vol_max_bps: r.double("vol_max_bps", d.vol_max_bps),
            volatility_period: r.count("volatility_period", d.volatility_period),
            exits,
            risk,
            caps,
            variant,
        }
    }
}

/// Reads and validates every strategy section with `enabled = true`.
pub fn load_enabled_strategies(
    config: &dyn ConfigPort,
) -> Result<Vec<StrategySettings>, TickwiseError> {
    let mut out = Vec::new();
    for kind in StrategyKind::ALL {
        if !config.get_bool(kind.section(), "enabled", false) {
            continue;
        }
        let settings = StrategySettings::from_config(config, kind);
        validate_strategy_settings(&settings)?;
        out.push(settings);
    }
    Ok(out)
}

struct Reader<'a> {
    config: &'a dyn ConfigPort,
    section: &'a str,
}

impl Reader<'_> {
    fn double(&self, key: &str, default: f64) -> f64 {
        self.config.get_double(self.section, key, default)
    }

    /// Negative values read as zero so validation can report them.
    fn count(&self, key: &str, default: usize) -> usize {
        self.config
            .get_int(self.section, key, default as i64)
            .max(0) as usize
    }

    fn secs(&self, key: &str, default_ms: i64) -> i64 {
        let secs = self
            .config
            .get_double(self.section, key, default_ms as f64 / 1000.0);
        (secs * 1000.0).round() as i64
    }
}
