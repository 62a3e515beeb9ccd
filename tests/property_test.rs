//! Property tests for the streaming primitives.

use proptest::prelude::*;
use tickwise::domain::brick::{BrickConfig, BrickEngine};
use tickwise::domain::candle::CandleAggregator;
use tickwise::domain::indicator::{bollinger, rsi};
use tickwise::domain::tick::Tick;
use tickwise::domain::window::BoundedWindow;

fn price_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.5f64..1.5, 1..300).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|step| {
                price = (price + step).max(1.0);
                price
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn bricks_are_contiguous(prices in price_path()) {
        let config = BrickConfig { cap: 50, ..BrickConfig::default() };
        let mut engine = BrickEngine::new(config);
        let mut emitted = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            emitted.extend(engine.on_tick(&Tick::new(i as i64 * 250, *price), None));
        }

        for pair in emitted.windows(2) {
            prop_assert!((pair[1].open - pair[0].close).abs() < 1e-9);
        }
        for brick in &emitted {
            prop_assert!(brick.high >= brick.open.max(brick.close));
            prop_assert!(brick.low <= brick.open.min(brick.close));
        }
        prop_assert!(engine.bricks().len() <= 50);
    }

    #[test]
    fn brick_emission_per_tick_is_capped(jump in 5.0f64..500.0, limit in 1usize..20) {
        let config = BrickConfig { max_bricks_per_tick: limit, ..BrickConfig::default() };
        let mut engine = BrickEngine::new(config);
        engine.on_tick(&Tick::new(0, 100.0), None);
        let emitted = engine.on_tick(&Tick::new(1, 100.0 + jump), None);
        prop_assert!(emitted.len() <= limit);
    }

    #[test]
    fn candles_stay_within_cap(prices in price_path(), cap in 1usize..20) {
        let mut aggregator = CandleAggregator::new(1_000, cap);
        for (i, price) in prices.iter().enumerate() {
            aggregator.on_tick(&Tick::new(i as i64 * 700, *price));
        }
        prop_assert!(aggregator.closed().len() <= cap);
        let opens: Vec<i64> = aggregator.closed().iter().map(|c| c.open_time).collect();
        prop_assert!(opens.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn bounded_window_keeps_newest(items in prop::collection::vec(any::<i32>(), 0..200), cap in 0usize..50) {
        let window = BoundedWindow::seeded(cap, items.iter().copied());
        let kept = cap.max(1).min(items.len());
        prop_assert_eq!(window.len(), kept);
        prop_assert_eq!(window.to_vec(), items[items.len() - kept..].to_vec());
    }

    #[test]
    fn rsi_is_bounded(prices in price_path(), period in 2usize..30) {
        match rsi(&prices, period) {
            Ok(value) => prop_assert!((0.0..=100.0).contains(&value)),
            Err(not_ready) => prop_assert!(prices.len() < period + 1 && not_ready.need == period + 1),
        }
    }

    #[test]
    fn band_position_is_clamped(prices in price_path(), probe in 50.0f64..150.0) {
        if let Ok(bands) = bollinger(&prices, 20, 2.0) {
            let position = bands.position_of(probe);
            prop_assert!((0.0..=1.0).contains(&position));
        }
    }
}
