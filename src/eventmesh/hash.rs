//! # Structural Hashing
//!
//! Stable hashes used to detect drift between the desired EventMesh
//! subscription, the one stored on the server and the last accepted state.
//!
//! Values are serialized to JSON with object keys sorted and hashed with
//! SHA-256; the first eight bytes form the `i64` kept in the status. The
//! result depends only on the content, never on field insertion order or
//! the process that computed it.

use crate::eventmesh::types::{Subscription, WebhookAuth};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash any serializable value
///
/// # Errors
///
/// Returns an error when the value cannot be represented as JSON.
pub fn hash_value<T: Serialize>(value: &T) -> Result<i64, serde_json::Error> {
    let mut value = serde_json::to_value(value)?;
    value.sort_all_objects();
    let digest = Sha256::digest(serde_json::to_vec(&value)?);
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Ok(i64::from_be_bytes(bytes))
}

/// Hash of a subscription; event order is irrelevant
///
/// # Errors
///
/// Returns an error when the subscription cannot be serialized.
pub fn hash_subscription(subscription: &Subscription) -> Result<i64, serde_json::Error> {
    let mut subscription = subscription.clone();
    subscription.events.sort();
    hash_value(&subscription)
}

/// Hash of the webhook auth block alone
///
/// # Errors
///
/// Returns an error when the block cannot be serialized.
pub fn hash_webhook_auth(auth: Option<&WebhookAuth>) -> Result<i64, serde_json::Error> {
    hash_value(&auth)
}
