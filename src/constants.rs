//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used as event reporter and field manager
pub const CONTROLLER_NAME: &str = "eventing-controller";

/// Finalizer placed on every Subscription handled by this controller
pub const FINALIZER_NAME: &str = "eventing.kyma-project.io";

/// Label carrying the subscriber service name on APIRules
pub const LABEL_SERVICE: &str = "service";

/// Label marking APIRules as owned by this controller
pub const LABEL_CONTROLLER: &str = "eventing.kyma-project.io/controller";

/// Generate-name prefix of APIRules created by this controller
pub const API_RULE_NAME_PREFIX: &str = "webhook-";

/// Prefix of the random APIRule host
pub const EXTERNAL_HOST_PREFIX: &str = "web";

/// Scheme of the externally reachable sink
pub const EXTERNAL_SINK_SCHEME: &str = "https";

/// Length of the random suffix in APIRule hosts
pub const HOST_SUFFIX_LENGTH: usize = 10;

/// Gateway the APIRules are attached to
pub const CLUSTER_LOCAL_GATEWAY: &str = "kyma-gateway.kyma-system.svc.cluster.local";

/// Host suffix every valid sink must carry
pub const CLUSTER_LOCAL_SUFFIX: &str = "svc.cluster.local";

/// Maximum length of the mapped EventMesh subscription name
pub const MAX_SUBSCRIPTION_NAME_LENGTH: usize = 50;

/// Maximum number of dot separated segments in an EventMesh event type
pub const EVENT_TYPE_SEGMENTS_LIMIT: usize = 7;

/// Default requeue interval while the EventMesh subscription is not yet active (seconds)
pub const DEFAULT_REQUEUE_AFTER_SECS: u64 = 2;

/// Default grace period for EventMesh subscription activation (seconds)
pub const DEFAULT_ACTIVATION_TIMEOUT_SECS: u64 = 30;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default number of Subscriptions reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;

/// Default Fibonacci backoff floor for failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 1;

/// Default Fibonacci backoff ceiling for failed reconciliations (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting the controller stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Timeout applied to every EventMesh HTTP request (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Access tokens are refreshed this long before they expire (seconds)
pub const TOKEN_EXPIRY_LEEWAY_SECS: i64 = 30;

/// Default EventMesh quality of service
pub const DEFAULT_QOS: &str = "AT_LEAST_ONCE";
