//! # Event Type Processing
//!
//! Turns the types listed on a Subscription into the types registered on
//! EventMesh: deduplicated, cleaned and prefixed for standard matching,
//! passed through untouched for exact matching.

use crate::constants::EVENT_TYPE_SEGMENTS_LIMIT;
use crate::crd::{Subscription, TypeMatching};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static INVALID_CHARACTERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[^a-zA-Z0-9.]+").expect("Failed to compile event type regex - this should never happen")
});

/// Errors raised while processing event types
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventTypeError {
    #[error("event type is empty after cleaning: {0:?}")]
    Empty(String),
    #[error(
        "EventMesh subject {subject} exceeds the limit of segments, max number of segments allowed: {limit}"
    )]
    SegmentsOverLimit { subject: String, limit: usize },
}

/// One type of a Subscription in all its forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeInfo {
    pub original_type: String,
    pub clean_type: String,
    pub processed_type: String,
}

/// Cleans sources and event types into what EventMesh accepts
pub trait EventTypeCleaner: Send + Sync + fmt::Debug {
    /// # Errors
    ///
    /// Returns an error when the source cannot be cleaned.
    fn clean_source(&self, source: &str) -> Result<String, EventTypeError>;

    /// # Errors
    ///
    /// Returns an error when nothing valid is left of the type.
    fn clean_event_type(&self, event_type: &str) -> Result<String, EventTypeError>;
}

/// Strips every character EventMesh rejects
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMeshCleaner;

impl EventTypeCleaner for EventMeshCleaner {
    fn clean_source(&self, source: &str) -> Result<String, EventTypeError> {
        Ok(source.to_string())
    }

    fn clean_event_type(&self, event_type: &str) -> Result<String, EventTypeError> {
        let cleaned = INVALID_CHARACTERS.replace_all(event_type, "").to_string();
        if cleaned.trim_matches('.').is_empty() {
            return Err(EventTypeError::Empty(event_type.to_string()));
        }
        Ok(cleaned)
    }
}

/// Deduplicates, cleans and prefixes the types of a Subscription
#[derive(Debug, Clone)]
pub struct EventTypeProcessor {
    prefix: String,
}

impl EventTypeProcessor {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// # Errors
    ///
    /// Returns an error when a type cannot be cleaned or the resulting
    /// subject has too many segments.
    pub fn process(
        &self,
        subscription: &Subscription,
        cleaner: &dyn EventTypeCleaner,
    ) -> Result<Vec<EventTypeInfo>, EventTypeError> {
        let unique = subscription.unique_types();
        let mut result = Vec::with_capacity(unique.len());

        for original in unique {
            if subscription.spec.type_matching == TypeMatching::Exact {
                result.push(EventTypeInfo {
                    clean_type: original.clone(),
                    processed_type: original.clone(),
                    original_type: original,
                });
                continue;
            }

            let source = cleaner.clean_source(&subscription.spec.source)?;
            let clean_type = cleaner.clean_event_type(&original)?;
            let subject = self.subject(&source, &clean_type);
            if subject.split('.').count() > EVENT_TYPE_SEGMENTS_LIMIT {
                return Err(EventTypeError::SegmentsOverLimit {
                    subject,
                    limit: EVENT_TYPE_SEGMENTS_LIMIT,
                });
            }
            result.push(EventTypeInfo {
                original_type: original,
                clean_type,
                processed_type: subject,
            });
        }

        Ok(result)
    }

    fn subject(&self, source: &str, clean_type: &str) -> String {
        [self.prefix.as_str(), source, clean_type]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(".")
    }
}
