//! # Configuration
//!
//! Runtime configuration loaded from environment variables.
//!
//! - `controller.rs` - Reconciler timing, server and feature settings
//! - `eventmesh.rs` - EventMesh endpoint, credentials and protocol defaults

mod controller;
pub(crate) mod env;
mod eventmesh;

pub use controller::{ControllerConfig, FeatureFlags};
pub use eventmesh::{EventMeshConfig, OAuth2Credentials};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required configuration {0} is not set")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
