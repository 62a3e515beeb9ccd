//! Price/momentum divergence over the brick window.
//!
//! The newest brick is compared against the extreme brick among the ones
//! before it. A lower low with a higher momentum reading is bullish; a higher
//! high with a lower reading is bearish. Strength is the momentum change
//! scaled by the momentum range across the window.

use crate::domain::brick::Brick;

#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceConfig {
    pub lookback: usize,
    /// Bricks that must have formed after the extremum before the signal is actionable.
    pub confirmation_bricks: usize,
    /// Distance from a band edge within which the enhancement flag is set.
    pub bb_enhancement_threshold: f64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            lookback: 30,
            confirmation_bricks: 2,
            bb_enhancement_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceKind {
    Bullish,
    Bearish,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divergence {
    pub kind: DivergenceKind,
    pub strength: f64,
    pub bricks_since_extremum: usize,
    pub bb_enhanced: bool,
}

impl Divergence {
    pub fn none() -> Self {
        Self {
            kind: DivergenceKind::None,
            strength: 0.0,
            bricks_since_extremum: 0,
            bb_enhanced: false,
        }
    }

    /// Reported confidence: strength, raised by half when price sits at a band edge.
    pub fn confidence(&self) -> f64 {
        if self.bb_enhanced {
            (self.strength * 1.5).min(1.0)
        } else {
            self.strength
        }
    }

    pub fn is_actionable(&self, confirmation_bricks: usize, min_strength: f64) -> bool {
        self.kind != DivergenceKind::None
            && self.bricks_since_extremum >= confirmation_bricks
            && self.confidence() >= min_strength
    }
}

struct Candidate {
    strength: f64,
    bricks_since: usize,
}

/// Scans the last `lookback` bricks. `momentum[i]` is the momentum index at
/// `bricks[i]`'s close and must be the same length as `bricks`.
/// `bb_position` is the current Bollinger position, if available.
pub fn detect(
    bricks: &[Brick],
    momentum: &[Option<f64>],
    bb_position: Option<f64>,
    config: &DivergenceConfig,
) -> Divergence {
    let len = bricks.len().min(momentum.len());
    let lookback = config.lookback.max(2).min(len);
    if lookback < 2 {
        return Divergence::none();
    }
    let bricks = &bricks[len - lookback..len];
    let momentum = &momentum[momentum.len() - lookback..];

    let Some(range) = momentum_range(momentum) else {
        return Divergence::none();
    };

    let bullish = scan(bricks, momentum, range, Scan::Bullish);
    let bearish = scan(bricks, momentum, range, Scan::Bearish);

    let (kind, candidate) = match (bullish, bearish) {
        (Some(bull), Some(bear)) if bear.strength > bull.strength => {
            (DivergenceKind::Bearish, bear)
        }
        (Some(bull), _) => (DivergenceKind::Bullish, bull),
        (None, Some(bear)) => (DivergenceKind::Bearish, bear),
        (None, None) => return Divergence::none(),
    };

    let threshold = config.bb_enhancement_threshold;
    let bb_enhanced = match (kind, bb_position) {
        (DivergenceKind::Bullish, Some(pos)) => pos <= threshold,
        (DivergenceKind::Bearish, Some(pos)) => pos >= 1.0 - threshold,
        _ => false,
    };

    Divergence {
        kind,
        strength: candidate.strength,
        bricks_since_extremum: candidate.bricks_since,
        bb_enhanced,
    }
}

fn momentum_range(momentum: &[Option<f64>]) -> Option<f64> {
    let values = momentum.iter().flatten();
    let (min, max) = values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if max < min { None } else { Some(max - min) }
}

#[derive(Clone, Copy)]
enum Scan {
    Bullish,
    Bearish,
}

fn scan(bricks: &[Brick], momentum: &[Option<f64>], range: f64, mode: Scan) -> Option<Candidate> {
    let last = bricks.len() - 1;
    let prior = &bricks[..last];

    // Most recent occurrence wins on ties.
    let mut extremum = 0;
    for (i, brick) in prior.iter().enumerate() {
        let better = match mode {
            Scan::Bullish => brick.low <= prior[extremum].low,
            Scan::Bearish => brick.high >= prior[extremum].high,
        };
        if better {
            extremum = i;
        }
    }

    let mi_extremum = momentum[extremum]?;
    let mi_last = momentum[last]?;
    let improvement = match mode {
        Scan::Bullish if bricks[last].low < prior[extremum].low => mi_last - mi_extremum,
        Scan::Bearish if bricks[last].high > prior[extremum].high => mi_extremum - mi_last,
        _ => return None,
    };
    if improvement <= 0.0 || range <= 0.0 {
        return None;
    }

    Some(Candidate {
        strength: (improvement / range).clamp(0.0, 1.0),
        bricks_since: last - extremum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::brick::Direction;
    use approx::assert_relative_eq;

    fn down_brick(low: f64) -> Brick {
        Brick {
            open_time: 0,
            open: low + 1.0,
            close: low,
            direction: Direction::Down,
            high: low + 1.0,
            low,
        }
    }

    fn up_brick(high: f64) -> Brick {
        Brick {
            open_time: 0,
            open: high - 1.0,
            close: high,
            direction: Direction::Up,
            high,
            low: high - 1.0,
        }
    }

    #[test]
    fn lower_low_with_rising_momentum_is_bullish() {
        let bricks: Vec<Brick> = [100.0, 98.0, 96.0, 94.0].iter().map(|l| down_brick(*l)).collect();
        let momentum = [Some(-2.0), Some(-3.0), Some(-1.0), Some(0.5)];
        let div = detect(&bricks, &momentum, None, &DivergenceConfig::default());

        assert_eq!(div.kind, DivergenceKind::Bullish);
        assert!(div.strength > 0.0);
        assert_relative_eq!(div.strength, 1.5 / 3.5);
        assert_eq!(div.bricks_since_extremum, 1);
        assert!(!div.bb_enhanced);
    }

    #[test]
    fn confirming_momentum_is_not_divergence() {
        let bricks: Vec<Brick> = [100.0, 98.0, 96.0, 94.0].iter().map(|l| down_brick(*l)).collect();
        let momentum = [Some(0.0), Some(-1.0), Some(-2.0), Some(-3.0)];
        let div = detect(&bricks, &momentum, None, &DivergenceConfig::default());
        assert_eq!(div.kind, DivergenceKind::None);
    }

    #[test]
    fn higher_high_with_falling_momentum_is_bearish() {
        let bricks: Vec<Brick> = [100.0, 102.0, 101.0, 101.5, 103.0]
            .iter()
            .map(|h| up_brick(*h))
            .collect();
        let momentum = [Some(1.0), Some(4.0), Some(3.0), Some(2.0), Some(2.0)];
        let div = detect(&bricks, &momentum, Some(0.9), &DivergenceConfig::default());

        assert_eq!(div.kind, DivergenceKind::Bearish);
        assert_relative_eq!(div.strength, 2.0 / 3.0);
        assert_eq!(div.bricks_since_extremum, 3);
        assert!(div.bb_enhanced);
        assert!(div.is_actionable(2, 0.5));
    }

    #[test]
    fn missing_momentum_at_extremum_yields_none() {
        let bricks: Vec<Brick> = [100.0, 98.0, 96.0, 94.0].iter().map(|l| down_brick(*l)).collect();
        let momentum = [None, None, None, Some(0.5)];
        let div = detect(&bricks, &momentum, None, &DivergenceConfig::default());
        assert_eq!(div.kind, DivergenceKind::None);
    }

    #[test]
    fn lookback_limits_window() {
        let mut bricks: Vec<Brick> = vec![down_brick(50.0)];
        bricks.extend([100.0, 98.0, 96.0, 94.0].iter().map(|l| down_brick(*l)));
        let momentum = [Some(-10.0), Some(-2.0), Some(-3.0), Some(-1.0), Some(0.5)];

        let narrow = DivergenceConfig {
            lookback: 4,
            ..DivergenceConfig::default()
        };
        assert_eq!(detect(&bricks, &momentum, None, &narrow).kind, DivergenceKind::Bullish);

        // with the deeper low in view the last brick is not a new low
        let wide = DivergenceConfig::default();
        assert_eq!(detect(&bricks, &momentum, None, &wide).kind, DivergenceKind::None);
    }

    #[test]
    fn confirmation_window_gates_actionability() {
        let div = Divergence {
            kind: DivergenceKind::Bullish,
            strength: 0.6,
            bricks_since_extremum: 1,
            bb_enhanced: false,
        };
        assert!(!div.is_actionable(2, 0.05));
        let confirmed = Divergence {
            bricks_since_extremum: 2,
            ..div
        };
        assert!(confirmed.is_actionable(2, 0.05));
        assert!(!confirmed.is_actionable(2, 0.7));
    }

    #[test]
    fn enhancement_raises_confidence_only() {
        let div = Divergence {
            kind: DivergenceKind::Bullish,
            strength: 0.4,
            bricks_since_extremum: 3,
            bb_enhanced: true,
        };
        assert_relative_eq!(div.confidence(), 0.6, epsilon = 1e-12);
        assert_relative_eq!(div.strength, 0.4);
    }

    #[test]
    fn too_few_bricks() {
        let div = detect(&[down_brick(1.0)], &[Some(1.0)], None, &DivergenceConfig::default());
        assert_eq!(div, Divergence::none());
    }
}
