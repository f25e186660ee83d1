//! Documents: a property bag bound to a kind.
//!
//! A [`Document`] always carries an `id`, a `type` and a `partition`. The
//! partition is derived from the kind's partition-key descriptor and is
//! recomputed synchronously whenever a contributing property changes, so
//! it is never stale when the document is serialized.

use chrono::{DateTime, FixedOffset, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::compose::{compose, is_trigger};
use crate::error::{ModelError, Result};
use crate::kind::{DocumentKind, KindRegistry};
use crate::store::{PropertyChange, PropertyStore};
use crate::value::PropertyValue;

pub const ID: &str = "id";
pub const TYPE: &str = "type";
pub const PARTITION: &str = "partition";
pub const CREATED: &str = "created";
pub const MODIFIED: &str = "modified";

/// Replace characters the store does not accept in ids (`#`, `/`, `\`)
/// with `_`.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '#' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

fn is_reserved(name: &str) -> bool {
    matches!(name, ID | TYPE | PARTITION)
}

/// Render a reserved property as text. Scalars use their invariant form and
/// the id is sanitized; null and structured values are rejected.
fn reserved_text(name: &str, value: PropertyValue) -> Result<PropertyValue> {
    if !is_reserved(name) {
        return Ok(value);
    }

    let value_kind = value.kind_name();
    let text = match value {
        PropertyValue::Text(text) => text,
        PropertyValue::Null | PropertyValue::Json(_) => {
            return Err(ModelError::NonScalarReserved {
                property: name.to_string(),
                value_kind,
            })
        }
        scalar => scalar.to_string(),
    };

    Ok(PropertyValue::Text(if name == ID {
        sanitize_id(&text)
    } else {
        text
    }))
}

/// A document of a given kind.
pub struct Document {
    kind: Arc<DocumentKind>,
    properties: PropertyStore,
}

impl Document {
    /// Create a document with a random id.
    pub fn new(kind: Arc<DocumentKind>) -> Self {
        Self::with_id(kind, Uuid::new_v4().to_string())
    }

    /// Create a document with the given id.
    ///
    /// `type` is set to the kind name and `partition` to the type until a
    /// contributing property is assigned.
    pub fn with_id(kind: Arc<DocumentKind>, id: impl AsRef<str>) -> Self {
        let mut properties = PropertyStore::new();
        properties.load(ID, sanitize_id(id.as_ref()));
        properties.load(TYPE, kind.name());
        properties.load(PARTITION, kind.name());

        Self { kind, properties }
    }

    pub fn kind(&self) -> &Arc<DocumentKind> {
        &self.kind
    }

    /// Read access to the underlying property bag.
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Set a property and recompute the partition if the property
    /// contributes to it.
    ///
    /// The value is stored even when recomputation fails; the error is
    /// returned and the partition keeps its previous value. `id`, `type`
    /// and `partition` are stored as text and reject null or structured
    /// values without storing them.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<bool> {
        let value = reserved_text(name, value.into())?;

        let changed = self.properties.replace(name, value).is_some();
        if changed && is_trigger(&self.kind, name) {
            self.recompose(name)?;
        }
        Ok(changed)
    }

    /// Get a property, storing the factory's value through [`set`] on a miss.
    ///
    /// [`set`]: Document::set
    pub fn get_or_insert_with<F>(
        &mut self,
        name: &str,
        factory: F,
    ) -> Result<PropertyValue>
    where
        F: FnOnce() -> PropertyValue,
    {
        if let Some(value) = self.properties.get(name) {
            return Ok(value.clone());
        }

        let value = factory();
        self.set(name, value.clone())?;
        Ok(value)
    }

    fn recompose(&mut self, trigger: &str) -> Result<()> {
        let partition = compose(&self.kind, &self.properties)?;
        debug!(
            kind = %self.kind.name(),
            trigger = %trigger,
            partition = %partition,
            "Recomputed partition"
        );
        self.properties.set(PARTITION, partition);
        Ok(())
    }

    pub fn id(&self) -> &str {
        self.text(ID)
    }

    pub fn set_id(&mut self, id: impl AsRef<str>) -> Result<bool> {
        self.set(ID, id.as_ref())
    }

    pub fn doc_type(&self) -> &str {
        self.text(TYPE)
    }

    pub fn set_type(&mut self, doc_type: impl Into<String>) -> Result<bool> {
        self.set(TYPE, doc_type.into())
    }

    pub fn partition(&self) -> &str {
        self.text(PARTITION)
    }

    /// Overwrite the partition directly. The next change to a contributing
    /// property replaces it again.
    pub fn set_partition(&mut self, partition: impl Into<String>) -> bool {
        self.properties.set(PARTITION, partition.into())
    }

    /// Creation timestamp; a missing value is initialized to now.
    pub fn created(&mut self) -> Result<Option<DateTime<FixedOffset>>> {
        self.timestamp(CREATED)
    }

    pub fn set_created(
        &mut self,
        created: DateTime<FixedOffset>,
    ) -> Result<bool> {
        self.set(CREATED, created)
    }

    /// Modification timestamp; a missing value is initialized to now.
    pub fn modified(&mut self) -> Result<Option<DateTime<FixedOffset>>> {
        self.timestamp(MODIFIED)
    }

    pub fn set_modified(
        &mut self,
        modified: DateTime<FixedOffset>,
    ) -> Result<bool> {
        self.set(MODIFIED, modified)
    }

    fn timestamp(
        &mut self,
        name: &str,
    ) -> Result<Option<DateTime<FixedOffset>>> {
        let value = self.get_or_insert_with(name, || Utc::now().into())?;
        Ok(value.as_timestamp())
    }

    fn text(&self, name: &str) -> &str {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
    }

    /// Register the change observer for this document.
    pub fn on_change<F>(&mut self, observer: F)
    where
        F: FnMut(&PropertyChange) + Send + 'static,
    {
        self.properties.on_change(observer);
    }

    pub fn clear_observer(&mut self) {
        self.properties.clear_observer();
    }

    /// Flat JSON object of all properties.
    pub fn to_json(&self) -> Map<String, Value> {
        self.properties
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect()
    }

    /// Load a document of `kind` from a JSON object.
    ///
    /// Missing or null `id` and `type` get their defaults; a missing
    /// `partition` is composed from the loaded values. Scalar `id`, `type`
    /// and `partition` values load as text. Loading never notifies.
    pub fn from_json(kind: Arc<DocumentKind>, value: Value) -> Result<Self> {
        let object = match value {
            Value::Object(object) => object,
            other => return Err(ModelError::NotAnObject(json_kind(&other))),
        };

        let mut properties = PropertyStore::new();
        for (name, value) in object {
            let value = PropertyValue::from_json(value);
            if value.is_null() && is_reserved(&name) {
                continue;
            }
            let value = reserved_text(&name, value)?;
            properties.load(name, value);
        }

        if !properties.contains(ID) {
            properties.load(ID, Uuid::new_v4().to_string());
        }
        if !properties.contains(TYPE) {
            properties.load(TYPE, kind.name());
        }
        if !properties.contains(PARTITION) {
            let partition = compose(&kind, &properties)?;
            properties.load(PARTITION, partition);
        }

        Ok(Self { kind, properties })
    }

    /// Load a document, picking its kind from the `type` property.
    pub fn from_json_registered(registry: &KindRegistry, value: Value) -> Result<Self> {
        let kind = match value.get(TYPE) {
            Some(Value::String(name)) => registry.resolve(name),
            _ if !value.is_object() => return Err(ModelError::NotAnObject(json_kind(&value))),
            _ => return Err(ModelError::MissingType),
        };
        Self::from_json(kind, value)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Clone for Document {
    /// The clone has no observer.
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("kind", &self.kind.name())
            .field("id", &self.id())
            .field("partition", &self.partition())
            .field("properties", &self.properties.len())
            .finish()
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len()))?;
        for (name, value) in self.properties.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Mutex;

    fn tagged() -> Arc<DocumentKind> {
        DocumentKind::builder("TestDocument")
            .partition_key(TYPE, 0)
            .build()
    }

    #[test]
    fn test_defaults_without_annotations() {
        let doc = Document::new(DocumentKind::plain("Note"));

        assert_eq!(doc.doc_type(), "Note");
        assert_eq!(doc.partition(), "Note");
        assert!(Uuid::parse_str(doc.id()).is_ok());
    }

    #[test]
    fn test_type_change_moves_partition_without_annotations() {
        let mut doc = Document::new(DocumentKind::plain("Note"));
        doc.set_type("Memo").unwrap();

        assert_eq!(doc.partition(), "Memo");
    }

    #[test]
    fn test_composed_partition() {
        let person = DocumentKind::builder("Person")
            .partition_key(TYPE, 0)
            .partition_key("lastName", 1)
            .separator("|")
            .build();
        let mut doc = Document::new(person);
        doc.set("firstName", "John").unwrap();
        doc.set("lastName", "Doe").unwrap();

        assert_eq!(doc.partition(), "Person|Doe");
    }

    #[test]
    fn test_non_contributing_properties_do_not_affect_partition() {
        let kind = DocumentKind::builder("Person")
            .partition_key("lastName", 0)
            .build();
        let mut a = Document::new(kind.clone());
        let mut b = Document::new(kind);
        a.set("lastName", "Doe").unwrap();
        b.set("lastName", "Doe").unwrap();
        a.set("age", 31).unwrap();
        b.set("age", 45).unwrap();

        assert_eq!(a.partition(), b.partition());
    }

    #[test]
    fn test_formatted_components() {
        let kind = DocumentKind::builder("TestDocument7")
            .extends(&tagged())
            .partition_key_formatted("d1", 1, "F1", Some("en-US"))
            .partition_key_formatted("d2", 2, "F1", Some("fi-FI"))
            .inherit_base_properties(false)
            .build();
        let mut doc = Document::new(kind);
        doc.set("d1", 5.3).unwrap();
        doc.set("d2", 12.5).unwrap();

        assert_eq!(doc.partition(), "5.3/12,5");
    }

    #[test]
    fn test_padded_index_and_date_components() {
        let indexed = DocumentKind::builder("TestDocument6")
            .partition_key_formatted("index", 0, "D2", None)
            .build();
        for (index, expected) in [(4, "04"), (45, "45"), (183, "183")] {
            let mut doc = Document::new(indexed.clone());
            doc.set("index", index).unwrap();
            assert_eq!(doc.partition(), expected);
        }

        let dated = DocumentKind::builder("TestDocument5")
            .partition_key_formatted("timestamp", 0, "yyyyMMdd", None)
            .build();
        let mut doc = Document::new(dated);
        doc.set("timestamp", Utc.with_ymd_and_hms(2023, 3, 9, 0, 0, 0).unwrap())
            .unwrap();
        assert_eq!(doc.partition(), "20230309");
    }

    #[test]
    fn test_declared_only_and_dropped_annotations() {
        let declared_only = DocumentKind::builder("TestDocument3")
            .extends(&tagged())
            .partition_key("foo", 1)
            .inherit_base_properties(false)
            .build();
        let mut doc = Document::new(declared_only);
        doc.set("foo", "bar").unwrap();
        assert_eq!(doc.partition(), "bar");

        let dropped = DocumentKind::builder("TestDocument4")
            .extends(&tagged())
            .partition_key("foo", 1)
            .without_partition_key(TYPE)
            .build();
        let mut doc = Document::new(dropped);
        doc.set("foo", "bar").unwrap();
        assert_eq!(doc.partition(), "bar");
    }

    #[test]
    fn test_id_is_sanitized_on_every_path() {
        let mut doc = Document::with_id(DocumentKind::plain("Note"), "x#y");
        assert_eq!(doc.id(), "x_y");

        doc.set_id("a#b/c\\d").unwrap();
        assert_eq!(doc.id(), "a_b_c_d");

        let loaded = Document::from_json(DocumentKind::plain("Note"), json!({ "id": "1/2" })).unwrap();
        assert_eq!(loaded.id(), "1_2");
    }

    #[test]
    fn test_scalar_ids_become_text() {
        let mut doc = Document::new(DocumentKind::plain("Note"));
        doc.set(ID, 42).unwrap();
        assert_eq!(doc.id(), "42");
        assert_eq!(doc.get(ID), Some(&PropertyValue::from("42")));

        doc.set(TYPE, true).unwrap();
        assert_eq!(doc.doc_type(), "true");
        assert_eq!(doc.partition(), "true");

        let loaded = Document::from_json(
            DocumentKind::plain("Note"),
            json!({ "id": 42, "type": 7, "partition": 3 }),
        )
        .unwrap();
        assert_eq!(loaded.id(), "42");
        assert_eq!(loaded.doc_type(), "7");
        assert_eq!(loaded.partition(), "3");
    }

    #[test]
    fn test_non_scalar_ids_are_rejected() {
        let mut doc = Document::with_id(DocumentKind::plain("Note"), "keep");
        assert!(matches!(
            doc.set(ID, PropertyValue::Null),
            Err(ModelError::NonScalarReserved { value_kind: "null", .. })
        ));
        assert!(doc.set(TYPE, json!({ "a": 1 })).is_err());
        assert_eq!(doc.id(), "keep");
        assert_eq!(doc.doc_type(), "Note");

        assert!(matches!(
            Document::from_json(DocumentKind::plain("Note"), json!({ "id": [1, 2] })),
            Err(ModelError::NonScalarReserved { value_kind: "array", .. })
        ));

        let defaulted =
            Document::from_json(DocumentKind::plain("Note"), json!({ "id": null, "type": null }))
                .unwrap();
        assert!(Uuid::parse_str(defaulted.id()).is_ok());
        assert_eq!(defaulted.doc_type(), "Note");
    }

    #[test]
    fn test_partition_change_is_observed() {
        let kind = DocumentKind::builder("Person")
            .partition_key("lastName", 0)
            .build();
        let mut doc = Document::new(kind);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        doc.on_change(move |c| sink.lock().unwrap().push(c.name.clone()));

        doc.set("lastName", "Doe").unwrap();
        doc.set("lastName", "Doe").unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["lastName", PARTITION]);
    }

    #[test]
    fn test_timestamps_written_on_first_read() {
        let mut doc = Document::new(DocumentKind::plain("Note"));
        assert!(doc.get(CREATED).is_none());

        let created = doc.created().unwrap();
        assert!(created.is_some());
        assert_eq!(doc.created().unwrap(), created);

        let fixed = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap().fixed_offset();
        doc.set_modified(fixed).unwrap();
        assert_eq!(doc.modified().unwrap(), Some(fixed));
    }

    #[test]
    fn test_format_error_keeps_value() {
        let kind = DocumentKind::builder("Bad")
            .partition_key_formatted("name", 0, "F2", None)
            .build();
        let mut doc = Document::new(kind);

        assert!(doc.set("name", "text").is_err());
        assert_eq!(doc.get("name"), Some(&PropertyValue::from("text")));
        assert_eq!(doc.partition(), "Bad");
    }

    #[test]
    fn test_json_round_trip_keeps_derived_fields() {
        let kind = DocumentKind::builder("Person")
            .partition_key("lastName", 0)
            .build();
        let mut doc = Document::new(kind.clone());
        doc.set("lastName", "Doe").unwrap();
        doc.set("tags", json!(["a", "b"])).unwrap();

        let json = serde_json::to_value(&doc).unwrap();
        let back = Document::from_json(kind, json).unwrap();

        assert_eq!(back.id(), doc.id());
        assert_eq!(back.partition(), "Doe");
        assert_eq!(back.get("tags"), Some(&PropertyValue::Json(json!(["a", "b"]))));
    }

    #[test]
    fn test_registry_picks_kind_from_type() {
        let registry = KindRegistry::new();
        registry.register(
            DocumentKind::builder("Person")
                .partition_key("lastName", 0)
                .build(),
        );

        let doc =
            Document::from_json_registered(&registry, json!({ "type": "Person", "lastName": "Doe" }))
                .unwrap();
        assert_eq!(doc.kind().name(), "Person");
        assert_eq!(doc.partition(), "Doe");

        assert!(matches!(
            Document::from_json_registered(&registry, json!({ "id": "1" })),
            Err(ModelError::MissingType)
        ));
        assert!(matches!(
            Document::from_json(DocumentKind::plain("Note"), json!([1])),
            Err(ModelError::NotAnObject("array"))
        ));
    }
}
