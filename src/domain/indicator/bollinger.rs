//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation. `position` places the last
//! close inside the band: 0 at the lower band, 1 at the upper, clamped.

use super::{IndicatorResult, sma, stddev};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bollinger {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
    pub position: f64,
}

impl Bollinger {
    /// Where `price` sits in the band, clamped to [0,1]. A zero-width band reads 0.5.
    pub fn position_of(&self, price: f64) -> f64 {
        let width = self.upper - self.lower;
        if width <= 0.0 {
            return 0.5;
        }
        ((price - self.lower) / width).clamp(0.0, 1.0)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> IndicatorResult<Bollinger> {
    let middle = sma(closes, period)?;
    let sd = stddev(closes, period)?;
    let mut bands = Bollinger {
        lower: middle - num_std * sd,
        middle,
        upper: middle + num_std * sd,
        position: 0.5,
    };
    bands.position = bands.position_of(closes[closes.len() - 1]);
    Ok(bands)
}
