//! Eventing Controller Library
//!
//! Reconciles eventing Subscriptions against EventMesh and the APIRules
//! exposing their sinks. Tests live next to the code in each module, with
//! scenario and contract tests under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use eventing_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod eventmesh;
pub mod events;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod sink;
pub mod store;
