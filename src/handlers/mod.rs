//! HTTP surface over the debug context

pub mod dashboard_api;
pub mod health;
pub mod metrics_handler;
pub mod stream;
pub mod tracking;
