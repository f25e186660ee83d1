//! Paginated query results.
//!
//! Results can be consumed a page at a time through [`QueryPage`], or as a
//! lazy [`ItemStream`] that fetches the next page only when the current
//! one has been drained.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::backend::ContainerBackend;
use crate::error::{DocstoreError, Result};
use crate::executor::RequestExecutor;
use crate::query::{QueryDefinition, QueryOptions};

/// Converts a raw item into the caller's item type.
pub type ItemDecoder<T> = Arc<dyn Fn(Value) -> Result<T> + Send + Sync>;

/// Lazy, forward-only sequence of query items.
pub type ItemStream<T> = BoxStream<'static, Result<T>>;

/// Everything needed to fetch further pages of one query.
pub(crate) struct PageSource<T> {
    backend: Arc<dyn ContainerBackend>,
    executor: RequestExecutor,
    query: Arc<QueryDefinition>,
    max_item_count: Option<u32>,
    decoder: ItemDecoder<T>,
}

impl<T> Clone for PageSource<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            executor: self.executor.clone(),
            query: self.query.clone(),
            max_item_count: self.max_item_count,
            decoder: self.decoder.clone(),
        }
    }
}

struct FetchedPage<T> {
    items: Vec<T>,
    continuation_token: Option<String>,
    request_charge: f64,
}

impl<T> PageSource<T> {
    pub(crate) fn new(
        backend: Arc<dyn ContainerBackend>,
        executor: RequestExecutor,
        query: QueryDefinition,
        max_item_count: Option<u32>,
        decoder: ItemDecoder<T>,
    ) -> Self {
        Self {
            backend,
            executor,
            query: Arc::new(query),
            max_item_count,
            decoder,
        }
    }

    async fn fetch(&self, continuation_token: Option<String>) -> Result<FetchedPage<T>> {
        let options = QueryOptions {
            continuation_token,
            max_item_count: self.max_item_count,
        };

        let response = self
            .executor
            .execute(|| self.backend.query_page(&self.query, &options), true)
            .await?
            .ok_or_else(|| DocstoreError::NotFound(self.backend.id().to_string()))?;

        let items = response
            .documents()
            .into_iter()
            .map(|raw| (self.decoder)(raw))
            .collect::<Result<Vec<T>>>()?;

        // An empty token marks the last page, same as no token.
        let continuation_token = response.continuation_token.filter(|t| !t.is_empty());

        debug!(
            container = %self.backend.id(),
            items = items.len(),
            charge = response.request_charge,
            has_more = continuation_token.is_some(),
            "Fetched query page"
        );

        Ok(FetchedPage {
            items,
            continuation_token,
            request_charge: response.request_charge,
        })
    }

    /// Fetch one page as a [`QueryPage`].
    pub(crate) async fn page(self, continuation_token: Option<String>) -> Result<QueryPage<T>> {
        let fetched = self.fetch(continuation_token).await?;
        Ok(QueryPage {
            items: fetched.items,
            continuation_token: fetched.continuation_token,
            request_charge: fetched.request_charge,
            source: self,
        })
    }
}

/// One page of query results.
///
/// A page is a snapshot; [`next_page`](QueryPage::next_page) fetches the
/// following page without changing this one.
pub struct QueryPage<T> {
    items: Vec<T>,
    continuation_token: Option<String>,
    request_charge: f64,
    source: PageSource<T>,
}

impl<T> QueryPage<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Token for resuming after this page, absent on the last page.
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    pub fn request_charge(&self) -> f64 {
        self.request_charge
    }

    pub fn has_more_results(&self) -> bool {
        self.continuation_token.is_some()
    }

    /// Fetch the next page, or `None` when this was the last one.
    pub async fn next_page(&self) -> Result<Option<QueryPage<T>>> {
        match &self.continuation_token {
            Some(token) => self.source.clone().page(Some(token.clone())).await.map(Some),
            None => Ok(None),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryPage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPage")
            .field("items", &self.items)
            .field("continuation_token", &self.continuation_token)
            .field("request_charge", &self.request_charge)
            .finish()
    }
}

enum CursorState<T> {
    Fetching(Option<String>),
    HasPage {
        items: VecDeque<T>,
        next: Option<String>,
    },
    Exhausted,
}

/// Lazily stream items, one page fetch per drained page.
///
/// Empty pages that still carry a continuation token are skipped. The
/// stream ends after the first error.
pub(crate) fn item_stream<T: Send + 'static>(
    source: PageSource<T>,
    continuation_token: Option<String>,
) -> ItemStream<T> {
    let initial = CursorState::Fetching(continuation_token);

    stream::unfold((source, initial), |(source, mut state)| async move {
        loop {
            state = match state {
                CursorState::Fetching(token) => match source.fetch(token).await {
                    Ok(page) => CursorState::HasPage {
                        items: page.items.into(),
                        next: page.continuation_token,
                    },
                    Err(e) => return Some((Err(e), (source, CursorState::Exhausted))),
                },
                CursorState::HasPage { mut items, next } => match items.pop_front() {
                    Some(item) => {
                        return Some((Ok(item), (source, CursorState::HasPage { items, next })))
                    }
                    None => match next {
                        Some(token) => CursorState::Fetching(Some(token)),
                        None => CursorState::Exhausted,
                    },
                },
                CursorState::Exhausted => return None,
            };
        }
    })
    .boxed()
}
