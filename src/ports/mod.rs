//! Port traits: the seams between the domain and its collaborators.

pub mod config_port;
pub mod event_port;
pub mod execution_port;
pub mod store_port;
