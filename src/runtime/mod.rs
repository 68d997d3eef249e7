//! # Runtime
//!
//! Process startup and the controller watch loop.
//!
//! - `initialization.rs` - Logging, metrics, probe server and component wiring
//! - `watch_loop.rs` - Runs the Subscription controller until shutdown
//! - `error_policy.rs` - Backoff for failed reconciliations and stream errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;
