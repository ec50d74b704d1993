//! Error types for the store, the quote source and notification delivery.
//!
//! Validation errors live next to their parsers (`threshold`, `action`).

use std::path::PathBuf;
use thiserror::Error;

use crate::models::SubscriberId;

/// Failures reported by the subscription store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("subscriber {0} is not registered")]
    UnknownSubscriber(SubscriberId),

    #[error("{0} is already tracked")]
    AlreadyTracked(String),

    #[error("{0} is not tracked")]
    NotTracked(String),

    #[error("{0} has no individual threshold")]
    NoOverride(String),

    /// The in-memory change was applied but could not be written to disk.
    #[error("failed to persist subscriptions to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// True for the "nothing to act on" family (unknown subscriber, untracked asset, missing override).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownSubscriber(_) | StoreError::NotTracked(_) | StoreError::NoOverride(_)
        )
    }
}

/// Failures talking to the quote source.
#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("quote source returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("quote source is unavailable: {0}")]
    Unavailable(String),
}

/// Failure delivering a message to a subscriber.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
