//! # Reconciler
//!
//! Keeps a Subscription, the APIRule exposing its sink and its EventMesh
//! counterpart in sync.
//!
//! The reconciler owns no state besides the per-resource backoff. Every
//! collaborator sits behind a trait (see [`Components`]) so the flow runs
//! unchanged against the API server or an in-memory store.

mod persist;
mod reconcile;
pub mod status;
mod types;

pub use reconcile::reconcile;
pub use status::StatusCheckError;
pub use types::{Components, ReconcilePhase, Reconciler, ReconcilerError};
