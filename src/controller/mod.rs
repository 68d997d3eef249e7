//! # Controller
//!
//! Core controller modules for the eventing controller.
//!
//! - `apirule`: APIRule lifecycle for Subscription sinks
//! - `backoff`: Fibonacci backoff for retries
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod apirule;
pub mod backoff;
pub mod reconciler;
pub mod server;
