//! Command implementations for the CLI
//!
//! - start: Start the dashboard server, optionally with a demo workload
//! - config: Configuration display and validation

pub mod config;
pub mod start;
