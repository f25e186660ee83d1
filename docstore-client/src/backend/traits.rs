//! Core traits for container backends.
//!
//! This module defines the `ContainerBackend` trait - the single-attempt
//! transport the client's retry and paging logic is layered on.

use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::partition_key::PartitionKey;
use crate::query::{QueryDefinition, QueryOptions};

/// Error raised by a backend for a non-success status.
///
/// Some stores report throttling and missing items as errors rather than
/// as responses; the executor treats both forms the same way.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Store error {status}: {message}")]
pub struct StoreError {
    pub status: StatusCode,
    pub message: String,
    /// Server-provided retry hint
    pub retry_after: Option<Duration>,
}

impl StoreError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// A throttling error with an optional retry hint.
    pub fn throttled(retry_after: Option<Duration>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Request rate is large".to_string(),
            retry_after,
        }
    }
}

/// Response to a single backend attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreResponse {
    pub status: StatusCode,
    /// Item or page body
    pub body: Option<Value>,
    /// Token for the next page of a query
    pub continuation_token: Option<String>,
    /// Cost reported by the store
    pub request_charge: f64,
    /// Server-provided retry hint
    pub retry_after: Option<Duration>,
}

impl StoreResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            continuation_token: None,
            request_charge: 0.0,
            retry_after: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn with_request_charge(mut self, charge: f64) -> Self {
        self.request_charge = charge;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Documents of a query page. A body without a `Documents` array is an
    /// empty page.
    pub fn documents(&self) -> Vec<Value> {
        match self.body.as_ref().and_then(|b| b.get("Documents")) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// Outcome of a single backend attempt.
pub type StoreResult = Result<StoreResponse, StoreError>;

/// Core trait for container backends.
///
/// Every method performs exactly one remote attempt; retrying is the
/// executor's job.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Get the container identifier.
    fn id(&self) -> &str;

    /// Create or replace an item.
    async fn upsert_item(&self, item: &Value, partition_key: Option<&PartitionKey>) -> StoreResult;

    /// Read an item by id within a partition.
    async fn read_item(&self, id: &str, partition_key: &PartitionKey) -> StoreResult;

    /// Delete an item by id within a partition.
    async fn delete_item(&self, id: &str, partition_key: &PartitionKey) -> StoreResult;

    /// Fetch one page of query results.
    async fn query_page(&self, query: &QueryDefinition, options: &QueryOptions) -> StoreResult;
}
