//! Document model for the docstore client.
//!
//! Documents are property bags bound to a [`DocumentKind`]. A kind declares
//! which properties make up the document's synthetic partition key; the
//! partition is kept current as those properties change.
//!
//! ```
//! use docstore_model::{Document, DocumentKind};
//!
//! let person = DocumentKind::builder("Person")
//!     .partition_key("type", 0)
//!     .partition_key("lastName", 1)
//!     .separator("|")
//!     .build();
//!
//! let mut doc = Document::new(person);
//! doc.set("lastName", "Doe").unwrap();
//! assert_eq!(doc.partition(), "Person|Doe");
//! ```

pub mod compose;
pub mod document;
pub mod error;
pub mod format;
pub mod kind;
pub mod store;
pub mod value;

pub use compose::{compose, is_trigger};
pub use document::{sanitize_id, Document, CREATED, ID, MODIFIED, PARTITION, TYPE};
pub use error::{FormatError, ModelError, Result};
pub use format::{format_component, lookup_culture, Culture};
pub use kind::{
    DocumentKind, DocumentKindBuilder, KindRegistry, PartitionKeyDescriptor, PartitionKeyProperty,
};
pub use store::{ChangeObserver, PropertyChange, PropertyStore};
pub use value::PropertyValue;
