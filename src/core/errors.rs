//! Custom error types for extraction, restoration and translation jobs

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// API request failed
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Retry after {retry_after:?} seconds")]
    RateLimitError {
        retry_after: Option<u64>,
    },

    /// Token quota exceeded
    #[error("Token quota exceeded")]
    QuotaExceededError,

    /// Network error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
    },

    /// Invalid response from API
    #[error("Invalid response: {message}")]
    InvalidResponseError {
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// Entity unknown to the entity store
    #[error("Entity not found: {entity_id}")]
    MissingEntity {
        entity_id: String,
    },

    /// Job record missing from the job store
    #[error("Job not found: {job_id}")]
    JobNotFound {
        job_id: Uuid,
    },

    /// Job is not in a state that allows the operation
    #[error("Job {job_id} is {status}, expected {expected}")]
    InvalidJobState {
        job_id: Uuid,
        status: String,
        expected: String,
    },

    /// Job or entity store failure
    #[error("Store error: {message}")]
    StoreError {
        message: String,
    },

    /// Restoration rejected the translated content
    #[error("Restore error: {0}")]
    Restore(#[from] RestoreError),

    /// Wrapper for anyhow errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TranslationError {
    /// Transient provider refusals that the queue retries with backoff
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            TranslationError::QuotaExceededError | TranslationError::RateLimitError { .. }
        )
    }
}

impl From<anyhow::Error> for TranslationError {
    fn from(err: anyhow::Error) -> Self {
        TranslationError::InternalError(err.to_string())
    }
}

/// Malformed structured payload. Recovered locally by the extractor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// PHP-serialized payload could not be decoded
    #[error("serialized payload invalid at byte {offset}: {message}")]
    Serialized {
        offset: usize,
        message: String,
    },

    /// JSON payload could not be decoded
    #[error("JSON payload invalid: {0}")]
    Json(String),

    /// Block or shortcode markers do not pair up
    #[error("unbalanced {format} markers: {message}")]
    Markers {
        format: &'static str,
        message: String,
    },

    /// Nesting deeper than the traversal bound
    #[error("payload nesting exceeds depth limit {limit}")]
    DepthExceeded {
        limit: usize,
    },
}

/// Restoration failures
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreError {
    /// Translated segment count differs from the block count
    #[error("segment count mismatch: expected {expected} blocks, got {actual} segments")]
    SegmentMismatch {
        expected: usize,
        actual: usize,
    },

    /// Translated text opens and closes a different number of tables
    #[error("unbalanced tables: {opening} <table> vs {closing} </table>")]
    UnbalancedTable {
        opening: usize,
        closing: usize,
    },

    /// Original structured payload could not be rebuilt
    #[error("cannot rebuild {format} payload: {message}")]
    Rebuild {
        format: String,
        message: String,
    },
}

impl From<ParseError> for RestoreError {
    fn from(err: ParseError) -> Self {
        RestoreError::Rebuild {
            format: "structured".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;
