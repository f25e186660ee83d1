//! Error types for the docstore client

use docstore_model::{FormatError, ModelError};
use http::StatusCode;
use thiserror::Error;

/// Docstore client error
#[derive(Debug, Error)]
pub enum DocstoreError {
    /// Item does not exist and the caller asked for an error
    #[error("Item not found: {0}")]
    NotFound(String),

    /// Store returned a status the client does not handle
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: StatusCode, message: String },

    /// Value could not be converted to or from the requested type
    #[error("Failed to convert to {type_name}: {source}")]
    Serialization {
        type_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Value cannot be used as a partition key
    #[error("Invalid partition key value: {0}")]
    InvalidPartitionKeyValue(String),

    /// Partition composition failed
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Query parameter declared twice
    #[error("Duplicate query parameter: {0}")]
    DuplicateParameter(String),

    /// Still throttled after the retry budget was spent
    #[error("Request still throttled after {retries} retries (last status {last_status})")]
    RetriesExhausted { retries: u32, last_status: StatusCode },

    /// Operation cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Document model error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl DocstoreError {
    pub(crate) fn serialization<T, E>(source: E) -> Self
    where
        T: ?Sized,
        E: std::error::Error + Send + Sync + 'static,
    {
        DocstoreError::Serialization {
            type_name: std::any::type_name::<T>().to_string(),
            source: Box::new(source),
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DocstoreError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            DocstoreError::UnexpectedStatus { status, .. } => Some(*status),
            DocstoreError::RetriesExhausted { last_status, .. } => Some(*last_status),
            _ => None,
        }
    }
}

/// Result type for docstore operations
pub type Result<T> = std::result::Result<T, DocstoreError>;
