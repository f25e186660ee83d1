//! Container facade.
//!
//! [`Container`] wraps a [`ContainerBackend`] with throttling retries,
//! not-found handling, partition-key coercion, typed (de)serialization and
//! paginated queries. Each operation is one executor invocation.

use futures::{StreamExt, TryStreamExt};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use docstore_model::{Document, DocumentKind, KindRegistry, TYPE};

use crate::backend::{ContainerBackend, StoreResponse};
use crate::cancel::CancelSignal;
use crate::config::ContainerOptions;
use crate::cursor::{item_stream, ItemDecoder, ItemStream, PageSource, QueryPage};
use crate::error::{DocstoreError, Result};
use crate::executor::{RequestExecutor, RetryStats};
use crate::partition_key::{KeyValue, PartitionKey};
use crate::query::{QueryDefinition, QueryOptions};

/// Runtime type of the value passed to an upsert.
#[derive(Debug, Clone)]
pub enum TypeTag {
    /// A plain Rust type, by name
    Rust(&'static str),
    /// A document of the given kind
    Kind(Arc<DocumentKind>),
}

impl TypeTag {
    pub fn name(&self) -> &str {
        match self {
            TypeTag::Rust(name) => name,
            TypeTag::Kind(kind) => kind.name(),
        }
    }
}

/// Result of an upsert, carrying the stored JSON and the runtime type of
/// the value that was written.
#[derive(Debug, Clone)]
pub struct Upserted {
    raw: Value,
    type_tag: TypeTag,
    status: StatusCode,
    request_charge: f64,
}

impl Upserted {
    /// Stored item as returned by the store.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// `201 Created` for new items, `200 OK` for replacements.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn request_charge(&self) -> f64 {
        self.request_charge
    }

    /// Deserialize the stored item as `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.raw).map_err(DocstoreError::serialization::<T, _>)
    }

    /// Rebuild the stored item as a document of the kind that was written.
    /// Plain values fall back to the kind named by their `type` property.
    pub fn into_document(self) -> Result<Document> {
        let kind = match self.type_tag {
            TypeTag::Kind(kind) => kind,
            TypeTag::Rust(name) => {
                let name = self.raw.get(TYPE).and_then(Value::as_str).unwrap_or(name);
                DocumentKind::plain(name)
            }
        };
        Ok(Document::from_json(kind, self.raw)?)
    }
}

/// How query results are turned into documents.
#[derive(Debug, Clone)]
pub enum ReturnAs {
    /// Every item is a document of this kind
    Kind(Arc<DocumentKind>),
    /// Each item's kind is looked up from its `type` property
    Registry(Arc<KindRegistry>),
}

impl ReturnAs {
    fn decoder(self) -> ItemDecoder<Document> {
        match self {
            ReturnAs::Kind(kind) => Arc::new(move |raw: Value| -> Result<Document> {
                Ok(Document::from_json(kind.clone(), raw)?)
            }),
            ReturnAs::Registry(registry) => Arc::new(move |raw: Value| -> Result<Document> {
                Ok(Document::from_json_registered(&registry, raw)?)
            }),
        }
    }
}

fn typed_decoder<T: DeserializeOwned>() -> ItemDecoder<T> {
    Arc::new(|raw: Value| serde_json::from_value(raw).map_err(DocstoreError::serialization::<T, _>))
}

/// Client for a single container.
///
/// Cheap to clone; clones share the backend and options.
#[derive(Clone)]
pub struct Container {
    backend: Arc<dyn ContainerBackend>,
    options: Arc<ContainerOptions>,
    executor: RequestExecutor,
}

impl Container {
    pub fn new(backend: Arc<dyn ContainerBackend>, options: ContainerOptions) -> Self {
        info!(
            container = %backend.id(),
            default_retry_delay_ms = options.default_retry_delay_ms,
            max_retries = ?options.max_retries,
            "Created container client"
        );

        let executor = RequestExecutor::new(options.retry_policy());
        Self {
            backend,
            options: Arc::new(options),
            executor,
        }
    }

    /// Client whose operations abort when `signal` fires.
    pub fn with_cancel(&self, signal: CancelSignal) -> Self {
        Self {
            backend: self.backend.clone(),
            options: self.options.clone(),
            executor: self.executor.clone().with_cancel(signal),
        }
    }

    pub fn id(&self) -> &str {
        self.backend.id()
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    /// Create or replace an item.
    pub async fn upsert<T>(&self, item: &T, partition_key: Option<PartitionKey>) -> Result<Upserted>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_value(item).map_err(DocstoreError::serialization::<T, _>)?;
        self.upsert_raw(raw, partition_key, TypeTag::Rust(std::any::type_name::<T>()))
            .await
    }

    /// Create or replace an item under a partition-key value that is coerced
    /// first.
    pub async fn upsert_by_value<T>(
        &self,
        item: &T,
        partition_value: impl Into<KeyValue>,
    ) -> Result<Upserted>
    where
        T: Serialize + ?Sized,
    {
        let partition_key = partition_value.into().coerce()?;
        self.upsert(item, Some(partition_key)).await
    }

    /// Create or replace a document, remembering its kind.
    pub async fn upsert_document(
        &self,
        document: &Document,
        partition_key: Option<PartitionKey>,
    ) -> Result<Upserted> {
        let raw = Value::Object(document.to_json());
        self.upsert_raw(raw, partition_key, TypeTag::Kind(document.kind().clone()))
            .await
    }

    async fn upsert_raw(
        &self,
        raw: Value,
        partition_key: Option<PartitionKey>,
        type_tag: TypeTag,
    ) -> Result<Upserted> {
        let response = self
            .run(
                || self.backend.upsert_item(&raw, partition_key.as_ref()),
                true,
            )
            .await?
            .0
            .ok_or_else(|| DocstoreError::NotFound(self.id().to_string()))?;

        debug!(
            container = %self.id(),
            type_name = %type_tag.name(),
            status = %response.status,
            "Upserted item"
        );

        Ok(Upserted {
            status: response.status,
            request_charge: response.request_charge,
            raw: response.body.unwrap_or(raw),
            type_tag,
        })
    }

    /// Read an item. Missing items are `Ok(None)` unless the options say
    /// to throw.
    pub async fn read<T: DeserializeOwned>(
        &self,
        id: &str,
        partition_key: &PartitionKey,
    ) -> Result<Option<T>> {
        self.read_raw(id, partition_key)
            .await?
            .map(|raw| serde_json::from_value(raw).map_err(DocstoreError::serialization::<T, _>))
            .transpose()
    }

    /// Read an item as a document.
    pub async fn read_document(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        return_as: ReturnAs,
    ) -> Result<Option<Document>> {
        let decoder = return_as.decoder();
        self.read_raw(id, partition_key)
            .await?
            .map(|raw| decoder(raw))
            .transpose()
    }

    async fn read_raw(&self, id: &str, partition_key: &PartitionKey) -> Result<Option<Value>> {
        let (response, _) = self
            .run(
                || self.backend.read_item(id, partition_key),
                self.options.throw_if_not_found,
            )
            .await?;
        Ok(response.and_then(|r| r.body))
    }

    /// Delete an item. Returns whether an item was deleted.
    pub async fn delete(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        throw_if_not_found: bool,
    ) -> Result<bool> {
        let (response, _) = self
            .run(
                || self.backend.delete_item(id, partition_key),
                throw_if_not_found,
            )
            .await?;

        debug!(container = %self.id(), id = %id, deleted = response.is_some(), "Delete finished");
        Ok(response.is_some())
    }

    /// Delete an item, coercing the partition-key value first.
    pub async fn delete_by_value(
        &self,
        id: &str,
        partition_value: impl Into<KeyValue>,
        throw_if_not_found: bool,
    ) -> Result<bool> {
        let partition_key = partition_value.into().coerce()?;
        self.delete(id, &partition_key, throw_if_not_found).await
    }

    /// Delete a document from its own partition.
    pub async fn delete_document(&self, document: &Document, throw_if_not_found: bool) -> Result<bool> {
        let partition_key = PartitionKey::from(document.partition());
        self.delete(document.id(), &partition_key, throw_if_not_found)
            .await
    }

    /// Fetch one page of typed results.
    pub async fn query_page<T>(&self, query: QueryDefinition, options: QueryOptions) -> Result<QueryPage<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let token = options.continuation_token.clone();
        self.page_source(query, &options, typed_decoder::<T>())
            .page(token)
            .await
    }

    /// Lazily stream typed results.
    pub fn query<T>(&self, query: QueryDefinition) -> ItemStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query_with(query, QueryOptions::default())
    }

    /// Lazily stream typed results, optionally resuming from a token.
    pub fn query_with<T>(&self, query: QueryDefinition, options: QueryOptions) -> ItemStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let token = options.continuation_token.clone();
        item_stream(self.page_source(query, &options, typed_decoder::<T>()), token)
    }

    /// Fetch one page of documents.
    pub async fn query_document_page(
        &self,
        query: QueryDefinition,
        options: QueryOptions,
        return_as: ReturnAs,
    ) -> Result<QueryPage<Document>> {
        let token = options.continuation_token.clone();
        self.page_source(query, &options, return_as.decoder())
            .page(token)
            .await
    }

    /// Lazily stream documents, possibly of different kinds.
    pub fn query_documents(&self, query: QueryDefinition, return_as: ReturnAs) -> ItemStream<Document> {
        item_stream(
            self.page_source(query, &QueryOptions::default(), return_as.decoder()),
            None,
        )
    }

    /// First result, if any.
    pub async fn query_first<T>(&self, query: QueryDefinition) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query::<T>(query).next().await.transpose()
    }

    /// All results, fetching every page.
    pub async fn query_all<T>(&self, query: QueryDefinition) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query::<T>(query).try_collect().await
    }

    fn page_source<T>(
        &self,
        query: QueryDefinition,
        options: &QueryOptions,
        decoder: ItemDecoder<T>,
    ) -> PageSource<T> {
        PageSource::new(
            self.backend.clone(),
            self.executor.clone(),
            query,
            options.max_item_count.or(self.options.max_item_count),
            decoder,
        )
    }

    async fn run<F, Fut>(
        &self,
        operation: F,
        throw_if_not_found: bool,
    ) -> Result<(Option<StoreResponse>, RetryStats)>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = crate::backend::StoreResult>,
    {
        let (response, stats) = self
            .executor
            .execute_with_stats(operation, throw_if_not_found)
            .await?;

        if stats.retries > 0 {
            info!(
                container = %self.id(),
                retries = stats.retries,
                waited_ms = stats.delays.iter().map(|d| d.as_millis() as u64).sum::<u64>(),
                "Request succeeded after throttling"
            );
        }
        Ok((response, stats))
    }
}
