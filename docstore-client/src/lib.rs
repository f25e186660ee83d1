//! Docstore Client
//!
//! A resilient client layer for partitioned document stores.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Container                   │
//! │  upsert / read / delete / query (typed)      │
//! ├──────────────────────────────────────────────┤
//! │  RequestExecutor        QueryPage/ItemStream │
//! │  (429 backoff, 404,     (continuation-token  │
//! │   cancellation)          paging)             │
//! ├──────────────────────────────────────────────┤
//! │         ContainerBackend (one attempt)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use docstore_client::{Container, ContainerOptions, MemoryContainer, QueryBuilder};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let container = Container::new(
//!     Arc::new(MemoryContainer::new("people")),
//!     ContainerOptions::default(),
//! );
//!
//! let person = serde_json::json!({ "id": "1", "partition": "Person", "name": "Doe" });
//! container.upsert(&person, None).await.unwrap();
//!
//! let query = QueryBuilder::new()
//!     .append_text("SELECT * FROM c")
//!     .build()
//!     .unwrap();
//! let all: Vec<serde_json::Value> = container.query_all(query).await.unwrap();
//! assert_eq!(all.len(), 1);
//! # });
//! ```

pub mod backend;
pub mod cancel;
pub mod config;
pub mod container;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod partition_key;
pub mod query;

pub use backend::{ContainerBackend, Fault, MemoryContainer, StoreError, StoreResponse, StoreResult};
pub use cancel::CancelSignal;
pub use config::ContainerOptions;
pub use container::{Container, ReturnAs, TypeTag, Upserted};
pub use cursor::{ItemStream, QueryPage};
pub use error::{DocstoreError, Result};
pub use executor::{RequestExecutor, RetryPolicy, RetryStats};
pub use partition_key::{KeyValue, PartitionKey};
pub use query::{QueryBuilder, QueryDefinition, QueryOptions, QueryParameter};

pub use docstore_model as model;
