//! # Controller
//!
//! Core controller modules for the Composable controller.
//!
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks
//! - `watches`: Watches on the kinds created from templates

pub mod backoff;
pub mod reconciler;
pub mod server;
pub mod watches;
