//! Order intents handed to the execution collaborator and their outcomes.

use crate::domain::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The order that opens (or adds to) a position on `side`.
    pub fn opening(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// The order that flattens a position on `side`.
    pub fn closing(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPurpose {
    Entry,
    ScaleIn,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub strategy_id: String,
    pub order_id: u64,
    pub purpose: OrderPurpose,
    pub side: OrderSide,
    pub size: f64,
    pub price_hint: f64,
}

/// Fill-or-reject result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Accepted,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderOutcome {
    pub order_id: u64,
    pub status: OrderStatus,
}
