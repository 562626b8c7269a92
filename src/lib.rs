pub mod auth;
pub mod bus;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod history;
pub mod metrics;
pub mod monitor;
pub mod process;
pub mod scheduler;
pub mod server;
pub mod signals;

pub use context::DebugContext;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `format` is `pretty` or `json`. `RUST_LOG` overrides the default `info` filter.
/// Can only be called once per process.
pub fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
