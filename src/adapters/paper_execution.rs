//! Dry-run executor: fills every sane order at its price hint.
//!
//! Stands in for exchange connectivity when running against a recorded or
//! piped feed. Orders are rejected when the size is not positive, the price
//! hint is not a positive number, or the size exceeds `[execution]
//! max_order_size` (0 disables the limit).

use crate::domain::order::{OrderIntent, OrderStatus};
use crate::ports::config_port::ConfigPort;
use crate::ports::execution_port::ExecutionPort;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub struct PaperExecution {
    max_order_size: f64,
    filled: AtomicU64,
    rejected: AtomicU64,
}

impl PaperExecution {
    pub fn new(max_order_size: f64) -> Self {
        Self {
            max_order_size,
            filled: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &dyn ConfigPort) -> Self {
        Self::new(config.get_double("execution", "max_order_size", 0.0))
    }

    /// (filled, rejected) counts so far.
    pub fn counts(&self) -> (u64, u64) {
        (
            self.filled.load(Ordering::Relaxed),
            self.rejected.load(Ordering::Relaxed),
        )
    }

    fn check(&self, intent: &OrderIntent) -> Result<(), String> {
        if !intent.size.is_finite() || intent.size <= 0.0 {
            return Err(format!("invalid size {}", intent.size));
        }
        if !intent.price_hint.is_finite() || intent.price_hint <= 0.0 {
            return Err(format!("invalid price {}", intent.price_hint));
        }
        if self.max_order_size > 0.0 && intent.size > self.max_order_size {
            return Err(format!(
                "size {} exceeds limit {}",
                intent.size, self.max_order_size
            ));
        }
        Ok(())
    }
}

impl Default for PaperExecution {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[async_trait]
impl ExecutionPort for PaperExecution {
    async fn place_order(&self, intent: &OrderIntent) -> OrderStatus {
        match self.check(intent) {
            Ok(()) => {
                self.filled.fetch_add(1, Ordering::Relaxed);
                debug!(
                    strategy = %intent.strategy_id,
                    order_id = intent.order_id,
                    side = ?intent.side,
                    size = intent.size,
                    price = intent.price_hint,
                    "paper fill"
                );
                OrderStatus::Accepted
            }
            Err(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    strategy = %intent.strategy_id,
                    order_id = intent.order_id,
                    %reason,
                    "paper order rejected"
                );
                OrderStatus::Rejected(reason)
            }
        }
    }
}
