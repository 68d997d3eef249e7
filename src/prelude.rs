//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use eventing_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconciler
pub use crate::controller::reconciler::{
    reconcile, Components, ReconcilePhase, Reconciler, ReconcilerError,
};

// Collaborator traits and their implementations
pub use crate::controller::apirule::{ApiRuleManager, ApiRuleSyncError, KubeApiRuleManager};
pub use crate::eventmesh::{
    EventMesh, EventMeshClient, EventMeshError, EventMeshNameMapper, EventMeshSyncer,
    EventTypeCleaner, NameMapper, RestEventMeshClient,
};
pub use crate::events::EventPublisher;
pub use crate::sink::{SinkTarget, SinkValidator};
pub use crate::store::{KubeStore, MemoryStore, ObjectStore, StoreError};

// Configuration
pub use crate::config::{ControllerConfig, EventMeshConfig, FeatureFlags};
