//! # Custom Resource Definitions
//!
//! CRD types used by the controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The Subscription CRD and its spec
//! - `status.rs` - Status types written by the reconciler
//! - `condition.rs` - Typed conditions and their comparison helpers
//! - `apirule.rs` - The APIRule resource the controller creates and shares

mod apirule;
mod condition;
mod spec;
mod status;

pub use apirule::{
    ApiRule, ApiRuleResourceStatus, ApiRuleService, ApiRuleSpec, ApiRuleStatus, Authenticator,
    Rule, STATUS_OK,
};
pub use condition::{
    conditions_equal, contain_same_condition_types, make_subscription_conditions, Condition,
    ConditionReason, ConditionStatus, ConditionType,
};
pub use spec::{Subscription, SubscriptionSpec, TypeMatching};
pub use status::{
    Backend, EventMeshSubscriptionStatus, EventMeshTypes, EventType, SubscriptionStatus,
};
