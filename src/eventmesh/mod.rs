//! # EventMesh
//!
//! Everything needed to keep a Subscription registered on EventMesh.
//!
//! ## Module Structure
//!
//! - `types.rs` - Wire model of the EventMesh subscription API
//! - `client.rs` - REST client with OAuth2 client credentials
//! - `convert.rs` - Desired EventMesh subscription and its cleaned projection
//! - `hash.rs` - Stable structural hashes used for drift detection
//! - `name_mapper.rs` - Length bounded EventMesh names
//! - `event_types.rs` - Event type cleaning and prefixing
//! - `sync.rs` - The sync engine deciding between create, delete and rotation

pub mod client;
pub mod convert;
pub mod event_types;
pub mod hash;
pub mod name_mapper;
mod sync;
pub mod types;

pub use client::{EventMeshClient, RestEventMeshClient};
pub use event_types::{EventMeshCleaner, EventTypeCleaner, EventTypeError, EventTypeProcessor};
pub use name_mapper::{EventMeshNameMapper, NameMapper};
pub use sync::{EventMesh, EventMeshSettings};

use crate::crd::{ApiRule, Subscription};
use async_trait::async_trait;

/// EventMesh errors
#[derive(Debug, thiserror::Error)]
pub enum EventMeshError {
    #[error("EventMesh request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to get EventMesh access token: {0}")]
    Token(String),
    #[error("{operation} subscription {name} on EventMesh failed: status {status_code}, {message}")]
    HttpStatus {
        operation: &'static str,
        name: String,
        status_code: u16,
        message: String,
    },
    #[error("EventMesh subscription {0} not found after creation")]
    MissingAfterCreate(String),
    #[error("failed to encode EventMesh payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    EventType(#[from] EventTypeError),
    #[error(transparent)]
    Convert(#[from] convert::ConvertError),
    #[error("failed to get the exposed URL of APIRule {0}")]
    ExposedUrl(String),
}

/// Keeps Subscriptions in sync with EventMesh
#[async_trait]
pub trait EventMeshSyncer: Send + Sync {
    /// Create, recreate or rotate the EventMesh subscription so it matches
    /// the Subscription, updating its backend status on the way.
    ///
    /// Returns true when the EventMesh subscription was (re)created or its
    /// mirrored status changed.
    async fn sync_subscription(
        &self,
        subscription: &mut Subscription,
        cleaner: &dyn EventTypeCleaner,
        api_rule: &ApiRule,
    ) -> Result<bool, EventMeshError>;

    /// Delete the EventMesh subscription, a missing one counts as deleted
    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), EventMeshError>;
}
