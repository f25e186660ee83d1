//! Paging through query results page-by-page and as a lazy stream.

use async_trait::async_trait;
use docstore_client::{
    Container, ContainerBackend, ContainerOptions, MemoryContainer, PartitionKey, QueryDefinition,
    QueryOptions, StoreError, StoreResponse, StoreResult,
};
use futures::StreamExt;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Item {
    id: String,
    partition: String,
    seq: u32,
}

async fn seeded(count: u32, backend: MemoryContainer) -> (Container, Arc<MemoryContainer>) {
    let backend = Arc::new(backend);
    let container = Container::new(backend.clone(), ContainerOptions::default());
    for seq in 0..count {
        let item = Item {
            id: format!("item-{}", seq),
            partition: "items".to_string(),
            seq,
        };
        container.upsert(&item, None).await.unwrap();
    }
    backend.reset_call_count();
    (container, backend)
}

fn select_all() -> QueryDefinition {
    QueryDefinition::new("SELECT * FROM c")
}

#[tokio::test]
async fn test_thousand_items_in_fifty_pages() {
    let (container, backend) = seeded(1000, MemoryContainer::new("items")).await;

    let mut page = container
        .query_page::<Item>(select_all(), QueryOptions::new().with_max_item_count(20))
        .await
        .unwrap();
    let mut pages = 1;
    let mut seen: Vec<u32> = page.items().iter().map(|i| i.seq).collect();

    while let Some(next) = page.next_page().await.unwrap() {
        assert!(next.items().len() <= 20);
        seen.extend(next.items().iter().map(|i| i.seq));
        pages += 1;
        page = next;
    }

    assert_eq!(pages, 50);
    assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    assert!(!page.has_more_results());
    assert_eq!(backend.call_count(), 50);
}

#[tokio::test]
async fn test_stream_fetches_pages_lazily() {
    let (container, backend) = seeded(45, MemoryContainer::new("items")).await;
    let options = QueryOptions::new().with_max_item_count(10);

    let mut stream = container.query_with::<Item>(select_all(), options);
    assert_eq!(backend.call_count(), 0);

    let first: Vec<Item> = stream.by_ref().take(10).map(Result::unwrap).collect().await;
    assert_eq!(first.len(), 10);
    assert_eq!(backend.call_count(), 1);

    let next = stream.next().await.unwrap().unwrap();
    assert_eq!(next.seq, 10);
    assert_eq!(backend.call_count(), 2);

    let rest: Vec<Item> = stream.map(Result::unwrap).collect().await;
    assert_eq!(rest.len(), 34);
    assert_eq!(backend.call_count(), 5);
}

#[tokio::test]
async fn test_resume_from_retained_token() {
    let (container, _) = seeded(30, MemoryContainer::new("items")).await;

    let first = container
        .query_page::<Item>(select_all(), QueryOptions::new().with_max_item_count(12))
        .await
        .unwrap();
    let token = first.continuation_token().unwrap().to_string();

    let resumed: Vec<Item> = container
        .query_with::<Item>(
            select_all(),
            QueryOptions::new()
                .with_continuation_token(token)
                .with_max_item_count(12),
        )
        .map(Result::unwrap)
        .collect()
        .await;

    assert_eq!(resumed.len(), 18);
    assert_eq!(resumed[0].seq, 12);
}

#[tokio::test]
async fn test_empty_pages_with_token_are_skipped() {
    // Only the last item matches; the first two pages come back empty.
    let backend = Arc::new(
        MemoryContainer::new("items")
            .with_query_filter(|_, item: &Value| item.get("keep") == Some(&Value::Bool(true))),
    );
    let container = Container::new(backend, ContainerOptions::default().with_max_item_count(2));
    for seq in 0..6 {
        let item = serde_json::json!({
            "id": seq.to_string(),
            "partition": "items",
            "keep": seq == 5,
        });
        container.upsert(&item, None).await.unwrap();
    }

    let items: Vec<Value> = container.query_all(select_all()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "5");
}

#[tokio::test]
async fn test_first_and_empty_results() {
    let (container, _) = seeded(3, MemoryContainer::new("items")).await;

    let first: Option<Item> = container.query_first(select_all()).await.unwrap();
    assert_eq!(first.map(|i| i.seq), Some(0));

    let (empty, _) = seeded(0, MemoryContainer::new("empty")).await;
    let none: Option<Item> = empty.query_first(select_all()).await.unwrap();
    assert!(none.is_none());

    let page = empty
        .query_page::<Item>(select_all(), QueryOptions::default())
        .await
        .unwrap();
    assert!(page.items().is_empty());
    assert!(page.next_page().await.unwrap().is_none());
}

/// Store that ends every query with an empty continuation token.
#[derive(Default)]
struct EmptyTokenStore {
    calls: AtomicU32,
}

#[async_trait]
impl ContainerBackend for EmptyTokenStore {
    fn id(&self) -> &str {
        "empty-token"
    }

    async fn upsert_item(&self, _: &Value, _: Option<&PartitionKey>) -> StoreResult {
        Err(StoreError::new(StatusCode::METHOD_NOT_ALLOWED, "read-only"))
    }

    async fn read_item(&self, _: &str, _: &PartitionKey) -> StoreResult {
        Err(StoreError::new(StatusCode::METHOD_NOT_ALLOWED, "read-only"))
    }

    async fn delete_item(&self, _: &str, _: &PartitionKey) -> StoreResult {
        Err(StoreError::new(StatusCode::METHOD_NOT_ALLOWED, "read-only"))
    }

    async fn query_page(&self, _: &QueryDefinition, _: &QueryOptions) -> StoreResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StoreResponse::new(StatusCode::OK)
            .with_body(json!({ "Documents": [{ "id": "only" }] }))
            .with_continuation_token(Some(String::new())))
    }
}

#[tokio::test]
async fn test_empty_continuation_token_ends_results() {
    let backend = Arc::new(EmptyTokenStore::default());
    let container = Container::new(backend.clone(), ContainerOptions::default());

    let page = container
        .query_page::<Value>(select_all(), QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(page.items().len(), 1);
    assert!(!page.has_more_results());
    assert!(page.continuation_token().is_none());
    assert!(page.next_page().await.unwrap().is_none());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    let streamed: Vec<Value> = container.query_all(select_all()).await.unwrap();
    assert_eq!(streamed.len(), 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
}
