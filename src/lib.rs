//! tickwise: a live tick-stream engine running several trading strategies
//! side by side.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`orchestrator`] fans the feed
//! out to one task per strategy and [`cli`] wires everything together.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod orchestrator;
pub mod cli;
