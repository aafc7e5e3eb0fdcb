// src/core/errors.rs

//! Defines the primary error type for the entire client library.

use thiserror::Error;

/// The main error enum, representing all possible failures within the client.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LarimarError {
    /// Bootstrap of a bucket failed: every loader failed on every seed, the
    /// refresher could not be registered, or no refresher was wired up for
    /// the loader that succeeded. This is the only error surfaced from
    /// `open_bucket`.
    #[error("Could not open bucket.")]
    CouldNotOpenBucket,

    #[error("Invalid bucket config: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    #[error("Refresher registration failed: {0}")]
    RefresherRegistration(String),

    #[error("Config load failed: {0}")]
    LoaderFailed(String),

    #[error("Internal Client Error: {0}")]
    Internal(String),
}

// --- From trait implementations for easy error conversion ---

impl From<reqwest::Error> for LarimarError {
    fn from(e: reqwest::Error) -> Self {
        LarimarError::HttpClientError(e.to_string())
    }
}

impl From<serde_json::Error> for LarimarError {
    fn from(e: serde_json::Error) -> Self {
        LarimarError::InvalidConfig(e.to_string())
    }
}
