//! In-memory container backend for testing.

use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::traits::*;
use crate::partition_key::PartitionKey;
use crate::query::{QueryDefinition, QueryOptions};

const DEFAULT_PAGE_SIZE: usize = 100;
const TOKEN_PREFIX: &str = "memory:";

/// A scripted failure returned instead of performing the next call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Throttle the call, reported as a 429 response or as a 429 error
    Throttle {
        retry_after: Option<Duration>,
        as_error: bool,
    },
    /// Fail the call with the given status, reported as an error
    Status(StatusCode),
}

/// Predicate deciding which items a query returns.
pub type QueryFilter = Arc<dyn Fn(&QueryDefinition, &Value) -> bool + Send + Sync>;

struct StoredItem {
    id: String,
    partition: Value,
    body: Value,
}

/// Mock container backed by an insertion-ordered item list.
///
/// Queries scan items in insertion order; continuation tokens are offsets.
/// The query filter is applied within each scanned page, so a page can be
/// empty and still carry a continuation token.
pub struct MemoryContainer {
    id: String,
    partition_key_path: String,
    items: RwLock<Vec<StoredItem>>,
    faults: Mutex<VecDeque<Fault>>,
    filter: Option<QueryFilter>,
    call_count: AtomicU32,
}

impl MemoryContainer {
    /// Create an empty container partitioned on `/partition`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            partition_key_path: "/partition".to_string(),
            items: RwLock::new(Vec::new()),
            faults: Mutex::new(VecDeque::new()),
            filter: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the JSON pointer of the partition-key property.
    pub fn with_partition_key_path(mut self, path: impl Into<String>) -> Self {
        self.partition_key_path = path.into();
        self
    }

    /// Restrict query results with a predicate.
    pub fn with_query_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&QueryDefinition, &Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Queue faults to be returned by the next calls, in order.
    pub fn with_faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.get_mut().extend(faults);
        self
    }

    /// Queue a fault for a later call.
    pub async fn inject(&self, fault: Fault) {
        self.faults.lock().await.push_back(fault);
    }

    /// Queue `count` throttles for the next calls.
    pub async fn throttle_next(&self, count: usize, retry_after: Option<Duration>, as_error: bool) {
        let mut faults = self.faults.lock().await;
        for _ in 0..count {
            faults.push_back(Fault::Throttle {
                retry_after,
                as_error,
            });
        }
    }

    /// Number of backend calls made, including faulted ones.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Count the call and return the next scripted fault, if any.
    async fn begin_call(&self) -> Option<StoreResult> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let fault = self.faults.lock().await.pop_front()?;
        debug!(container = %self.id, fault = ?fault, "Injecting fault");

        Some(match fault {
            Fault::Throttle {
                retry_after,
                as_error: false,
            } => Ok(StoreResponse::new(StatusCode::TOO_MANY_REQUESTS).with_retry_after(retry_after)),
            Fault::Throttle {
                retry_after,
                as_error: true,
            } => Err(StoreError::throttled(retry_after)),
            Fault::Status(status) => Err(StoreError::new(status, "Injected failure")),
        })
    }

    fn partition_of(&self, item: &Value) -> Value {
        item.pointer(&self.partition_key_path)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl ContainerBackend for MemoryContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn upsert_item(&self, item: &Value, partition_key: Option<&PartitionKey>) -> StoreResult {
        if let Some(fault) = self.begin_call().await {
            return fault;
        }

        let id = match item.get("id") {
            Some(Value::String(id)) => id.clone(),
            _ => {
                return Err(StoreError::new(
                    StatusCode::BAD_REQUEST,
                    "Item must have a string 'id' property",
                ))
            }
        };

        let partition = self.partition_of(item);
        if let Some(key) = partition_key {
            if !key.matches(Some(&partition)) {
                return Err(StoreError::new(
                    StatusCode::BAD_REQUEST,
                    format!("Partition key {} does not match item", key),
                ));
            }
        }

        let mut items = self.items.write().await;
        let existing = items
            .iter_mut()
            .find(|stored| stored.id == id && stored.partition == partition);

        let status = match existing {
            Some(stored) => {
                stored.body = item.clone();
                StatusCode::OK
            }
            None => {
                items.push(StoredItem {
                    id,
                    partition,
                    body: item.clone(),
                });
                StatusCode::CREATED
            }
        };

        Ok(StoreResponse::new(status)
            .with_body(item.clone())
            .with_request_charge(10.0))
    }

    async fn read_item(&self, id: &str, partition_key: &PartitionKey) -> StoreResult {
        if let Some(fault) = self.begin_call().await {
            return fault;
        }

        let items = self.items.read().await;
        items
            .iter()
            .find(|stored| stored.id == id && partition_key.matches(Some(&stored.partition)))
            .map(|stored| {
                StoreResponse::new(StatusCode::OK)
                    .with_body(stored.body.clone())
                    .with_request_charge(1.0)
            })
            .ok_or_else(|| StoreError::new(StatusCode::NOT_FOUND, format!("Item '{}' not found", id)))
    }

    async fn delete_item(&self, id: &str, partition_key: &PartitionKey) -> StoreResult {
        if let Some(fault) = self.begin_call().await {
            return fault;
        }

        let mut items = self.items.write().await;
        let position = items
            .iter()
            .position(|stored| stored.id == id && partition_key.matches(Some(&stored.partition)));

        Ok(match position {
            Some(index) => {
                items.remove(index);
                StoreResponse::new(StatusCode::NO_CONTENT).with_request_charge(5.0)
            }
            None => StoreResponse::new(StatusCode::NOT_FOUND).with_request_charge(1.0),
        })
    }

    async fn query_page(&self, query: &QueryDefinition, options: &QueryOptions) -> StoreResult {
        if let Some(fault) = self.begin_call().await {
            return fault;
        }

        let offset = match options.continuation_token.as_deref() {
            None => 0,
            Some(token) => token
                .strip_prefix(TOKEN_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    StoreError::new(
                        StatusCode::BAD_REQUEST,
                        format!("Invalid continuation token '{}'", token),
                    )
                })?,
        };
        let page_size = options
            .max_item_count
            .map(|n| n.max(1) as usize)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let items = self.items.read().await;
        let end = (offset + page_size).min(items.len());
        let page: Vec<Value> = items
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|stored| &stored.body)
            .filter(|body| self.filter.as_ref().map_or(true, |f| f(query, body)))
            .cloned()
            .collect();
        let token = (end < items.len()).then(|| format!("{}{}", TOKEN_PREFIX, end));

        debug!(
            container = %self.id,
            offset = offset,
            returned = page.len(),
            has_more = token.is_some(),
            "Served query page"
        );

        let charge = 2.0 + 0.1 * page.len() as f64;
        Ok(StoreResponse::new(StatusCode::OK)
            .with_body(json!({ "Documents": page, "_count": page.len() }))
            .with_continuation_token(token)
            .with_request_charge(charge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_creates_then_replaces() {
        let container = MemoryContainer::new("items");
        let item = json!({ "id": "1", "partition": "p", "n": 1 });

        let created = container.upsert_item(&item, None).await.unwrap();
        let replaced = container.upsert_item(&item, None).await.unwrap();

        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(replaced.status, StatusCode::OK);
        assert_eq!(container.len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_requires_id() {
        let container = MemoryContainer::new("items");
        let err = container.upsert_item(&json!({ "n": 1 }), None).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_partition_scoping() {
        let container = MemoryContainer::new("items");
        container
            .upsert_item(&json!({ "id": "1", "partition": "a" }), None)
            .await
            .unwrap();

        assert!(container.read_item("1", &"a".into()).await.is_ok());
        let miss = container.read_item("1", &"b".into()).await.unwrap_err();
        assert_eq!(miss.status, StatusCode::NOT_FOUND);

        let gone = container.delete_item("1", &"b".into()).await.unwrap();
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_faults_consumed_in_order() {
        let container = MemoryContainer::new("items").with_faults([
            Fault::Throttle {
                retry_after: None,
                as_error: false,
            },
            Fault::Status(StatusCode::SERVICE_UNAVAILABLE),
        ]);
        let query = QueryDefinition::new("SELECT * FROM c");
        let options = QueryOptions::default();

        let first = container.query_page(&query, &options).await.unwrap();
        assert_eq!(first.status, StatusCode::TOO_MANY_REQUESTS);
        let second = container.query_page(&query, &options).await.unwrap_err();
        assert_eq!(second.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(container.query_page(&query, &options).await.is_ok());
        assert_eq!(container.call_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_token_rejected() {
        let container = MemoryContainer::new("items");
        let options = QueryOptions::new().with_continuation_token("bogus");
        let err = container
            .query_page(&QueryDefinition::new("SELECT * FROM c"), &options)
            .await
            .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
