//! Order execution port.
//!
//! Orders fill completely or are rejected; partial fills are not modelled.
//! Callers never await this from the evaluation path: the outcome comes back
//! as a separate event.

use crate::domain::order::{OrderIntent, OrderStatus};
use async_trait::async_trait;

#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn place_order(&self, intent: &OrderIntent) -> OrderStatus;
}
