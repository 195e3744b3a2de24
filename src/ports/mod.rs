//! Port traits the domain talks to; adapters implement them.

pub mod config_port;
pub mod data_port;
pub mod report_port;
