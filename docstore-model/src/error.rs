//! Error types for the document model.

use thiserror::Error;

/// Raised when a partition-key component cannot be formatted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Culture name is not in the supported table
    #[error("Unknown culture: {0}")]
    UnknownCulture(String),

    /// Format string is malformed or uses an unsupported specifier
    #[error("Invalid format string '{format}': {reason}")]
    InvalidFormat { format: String, reason: String },

    /// Format string does not apply to the property's value type
    #[error("Format string '{format}' cannot be applied to {value_kind} value of property '{property}'")]
    Incompatible {
        property: String,
        format: String,
        value_kind: &'static str,
    },
}

impl FormatError {
    pub(crate) fn invalid(format: &str, reason: impl Into<String>) -> Self {
        FormatError::InvalidFormat {
            format: format.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building or loading documents.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Partition composition failed
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// A document can only be loaded from a JSON object
    #[error("Document JSON must be an object, got {0}")]
    NotAnObject(&'static str),

    /// `id`, `type` and `partition` only accept scalar values
    #[error("Property '{property}' must be a scalar, got {value_kind}")]
    NonScalarReserved {
        property: String,
        value_kind: &'static str,
    },

    /// Registry lookup needs a string `type` property
    #[error("Document JSON has no string 'type' property")]
    MissingType,

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
