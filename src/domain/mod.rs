//! Core domain types and logic.

pub mod error;
pub mod window;
pub mod tick;
pub mod indicator;
pub mod candle;
pub mod brick;
pub mod divergence;
pub mod signal;
pub mod position;
pub mod order;
pub mod risk;
pub mod metrics;
pub mod settings;
pub mod config_validation;
pub mod strategy;
pub mod engine;
