//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod paper_execution;
pub mod sqlite_store;
pub mod tick_source;
pub mod tracing_events;
