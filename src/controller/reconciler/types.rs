//! Reconciler context and errors.

use crate::config::ControllerConfig;
use crate::controller::apirule::{ApiRuleManager, ApiRuleSyncError};
use crate::controller::backoff::BackoffRegistry;
use crate::controller::reconciler::status::StatusCheckError;
use crate::eventmesh::{EventMeshError, EventMeshSyncer, EventTypeCleaner, NameMapper};
use crate::events::EventPublisher;
use crate::sink::{SinkValidationError, SinkValidator};
use crate::store::{ObjectStore, StoreError};
use std::fmt;
use std::sync::Arc;

/// Step of a reconciliation, carried by every error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Fetching,
    Deleting,
    Initializing,
    SyncingApiRule,
    SyncingBackend,
    Persisting,
}

impl ReconcilePhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcilePhase::Fetching => "fetching",
            ReconcilePhase::Deleting => "deleting",
            ReconcilePhase::Initializing => "initializing",
            ReconcilePhase::SyncingApiRule => "syncing APIRule",
            ReconcilePhase::SyncingBackend => "syncing EventMesh",
            ReconcilePhase::Persisting => "persisting",
        }
    }
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("{phase}: {source}")]
    Store {
        phase: ReconcilePhase,
        source: StoreError,
    },
    #[error("{phase}: failed to validate sink: {source}")]
    Sink {
        phase: ReconcilePhase,
        source: SinkValidationError,
    },
    #[error("{phase}: failed to create or update APIRule: {source}")]
    ApiRule {
        phase: ReconcilePhase,
        source: ApiRuleSyncError,
    },
    #[error("{phase}: {source}")]
    EventMesh {
        phase: ReconcilePhase,
        source: EventMeshError,
    },
    #[error("{phase}: reached retry timeout: {source}")]
    Activation {
        phase: ReconcilePhase,
        source: StatusCheckError,
    },
}

impl ReconcilerError {
    #[must_use]
    pub fn phase(&self) -> ReconcilePhase {
        match self {
            ReconcilerError::Store { phase, .. }
            | ReconcilerError::Sink { phase, .. }
            | ReconcilerError::ApiRule { phase, .. }
            | ReconcilerError::EventMesh { phase, .. }
            | ReconcilerError::Activation { phase, .. } => *phase,
        }
    }

    pub(crate) fn store(phase: ReconcilePhase) -> impl Fn(StoreError) -> Self {
        move |source| ReconcilerError::Store { phase, source }
    }
}

/// Collaborators of the reconciler
pub struct Components {
    pub store: Arc<dyn ObjectStore>,
    pub event_mesh: Arc<dyn EventMeshSyncer>,
    pub api_rules: Arc<dyn ApiRuleManager>,
    pub sink_validator: Arc<dyn SinkValidator>,
    pub cleaner: Arc<dyn EventTypeCleaner>,
    pub name_mapper: Arc<dyn NameMapper>,
    pub events: Arc<dyn EventPublisher>,
}

/// Shared state of every reconciliation
pub struct Reconciler {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) event_mesh: Arc<dyn EventMeshSyncer>,
    pub(crate) api_rules: Arc<dyn ApiRuleManager>,
    pub(crate) sink_validator: Arc<dyn SinkValidator>,
    pub(crate) cleaner: Arc<dyn EventTypeCleaner>,
    pub(crate) name_mapper: Arc<dyn NameMapper>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) config: ControllerConfig,
    pub(crate) backoff: BackoffRegistry,
}

impl Reconciler {
    #[must_use]
    pub fn new(components: Components, config: ControllerConfig) -> Self {
        Self {
            store: components.store,
            event_mesh: components.event_mesh,
            api_rules: components.api_rules,
            sink_validator: components.sink_validator,
            cleaner: components.cleaner,
            name_mapper: components.name_mapper,
            events: components.events,
            backoff: BackoffRegistry::new(config.backoff_min_secs, config.backoff_max_secs),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Delay before retrying a failed reconciliation of `key`
    pub fn next_backoff(&self, key: &str) -> std::time::Duration {
        self.backoff.next(key)
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("name_mapper", &self.name_mapper)
            .finish_non_exhaustive()
    }
}
