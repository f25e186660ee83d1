//! Document kinds and their partition-key descriptors.
//!
//! A [`DocumentKind`] names a family of documents and declares which of
//! their properties make up the synthetic partition key. Kinds compose: a
//! kind may extend a base kind and either inherit its annotated properties
//! or only use its own. The effective [`PartitionKeyDescriptor`] is computed
//! once when the kind is built.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default separator between partition-key components.
pub const DEFAULT_SEPARATOR: &str = "/";

/// A property annotated as a partition-key component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyProperty {
    /// Property name in the bag
    pub name: String,
    /// Position of the component; lower comes first
    pub index: i32,
    /// Optional format string
    pub format: Option<String>,
    /// Optional culture for the format string
    pub culture: Option<String>,
}

impl PartitionKeyProperty {
    pub fn new(name: impl Into<String>, index: i32) -> Self {
        Self {
            name: name.into(),
            index,
            format: None,
            culture: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }
}

/// Ordered partition-key components of a kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionKeyDescriptor {
    entries: Vec<PartitionKeyProperty>,
}

impl PartitionKeyDescriptor {
    /// Build from unsorted entries. Equal indexes keep their input order.
    pub fn new(mut entries: Vec<PartitionKeyProperty>) -> Self {
        entries.sort_by_key(|e| e.index);
        Self { entries }
    }

    pub fn entries(&self) -> &[PartitionKeyProperty] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartitionKeyProperty> {
        self.entries.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A document kind with its partition-key configuration.
#[derive(Debug)]
pub struct DocumentKind {
    name: String,
    base: Option<Arc<DocumentKind>>,
    declared: Vec<PartitionKeyProperty>,
    removed: Vec<String>,
    separator: String,
    inherit_base_properties: bool,
    descriptor: PartitionKeyDescriptor,
}

impl DocumentKind {
    /// Start building a kind.
    pub fn builder(name: impl Into<String>) -> DocumentKindBuilder {
        DocumentKindBuilder::new(name)
    }

    /// A kind with no partition-key annotations.
    pub fn plain(name: impl Into<String>) -> Arc<Self> {
        Self::builder(name).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<&Arc<DocumentKind>> {
        self.base.as_ref()
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn inherits_base_properties(&self) -> bool {
        self.inherit_base_properties
    }

    /// Effective, sorted partition-key components.
    pub fn descriptor(&self) -> &PartitionKeyDescriptor {
        &self.descriptor
    }

    /// Components declared directly on this kind.
    pub fn declared_properties(&self) -> &[PartitionKeyProperty] {
        &self.declared
    }

    /// Whether this kind is `name` or extends it.
    pub fn is_a(&self, name: &str) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind.name == name {
                return true;
            }
            current = kind.base.as_deref();
        }
        false
    }

    /// Kinds from the root base down to this one.
    fn lineage(&self) -> Vec<&DocumentKind> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(kind) = current {
            chain.push(kind);
            current = kind.base.as_deref();
        }
        chain.reverse();
        chain
    }

    fn resolve_descriptor(&self) -> PartitionKeyDescriptor {
        if !self.inherit_base_properties {
            return PartitionKeyDescriptor::new(self.declared.clone());
        }

        let mut entries: Vec<PartitionKeyProperty> = Vec::new();
        for kind in self.lineage() {
            entries.retain(|e| !kind.removed.contains(&e.name));
            for declared in &kind.declared {
                entries.retain(|e| e.name != declared.name);
                entries.push(declared.clone());
            }
        }
        PartitionKeyDescriptor::new(entries)
    }
}

/// Builder for [`DocumentKind`].
#[derive(Debug)]
pub struct DocumentKindBuilder {
    name: String,
    base: Option<Arc<DocumentKind>>,
    declared: Vec<PartitionKeyProperty>,
    removed: Vec<String>,
    separator: Option<String>,
    inherit_base_properties: Option<bool>,
}

impl DocumentKindBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            declared: Vec::new(),
            removed: Vec::new(),
            separator: None,
            inherit_base_properties: None,
        }
    }

    /// Extend a base kind. Separator and inheritance flag default to the
    /// base's values.
    pub fn extends(mut self, base: &Arc<DocumentKind>) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Annotate a property as a partition-key component.
    pub fn partition_key(self, name: impl Into<String>, index: i32) -> Self {
        self.partition_key_property(PartitionKeyProperty::new(name, index))
    }

    /// Annotate a property with a format string and optional culture.
    pub fn partition_key_formatted(
        self,
        name: impl Into<String>,
        index: i32,
        format: impl Into<String>,
        culture: Option<&str>,
    ) -> Self {
        let mut property = PartitionKeyProperty::new(name, index).with_format(format);
        property.culture = culture.map(str::to_string);
        self.partition_key_property(property)
    }

    pub fn partition_key_property(mut self, property: PartitionKeyProperty) -> Self {
        self.removed.retain(|n| *n != property.name);
        self.declared.retain(|p| p.name != property.name);
        self.declared.push(property);
        self
    }

    /// Drop an annotation inherited from a base kind.
    pub fn without_partition_key(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.declared.retain(|p| p.name != name);
        self.removed.push(name);
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// Whether base-kind annotations participate. Defaults to `true`.
    pub fn inherit_base_properties(mut self, inherit: bool) -> Self {
        self.inherit_base_properties = Some(inherit);
        self
    }

    pub fn build(self) -> Arc<DocumentKind> {
        let separator = self
            .separator
            .or_else(|| self.base.as_ref().map(|b| b.separator.clone()))
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string());
        let inherit_base_properties = self
            .inherit_base_properties
            .or_else(|| self.base.as_ref().map(|b| b.inherit_base_properties))
            .unwrap_or(true);

        let mut kind = DocumentKind {
            name: self.name,
            base: self.base,
            declared: self.declared,
            removed: self.removed,
            separator,
            inherit_base_properties,
            descriptor: PartitionKeyDescriptor::default(),
        };
        kind.descriptor = kind.resolve_descriptor();

        Arc::new(kind)
    }
}

/// Registry of document kinds, keyed by kind name.
///
/// Used to recover the concrete kind of a persisted document from its
/// `type` property.
#[derive(Debug, Default)]
pub struct KindRegistry {
    kinds: DashMap<String, Arc<DocumentKind>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind, returning any kind previously registered under the
    /// same name.
    pub fn register(&self, kind: Arc<DocumentKind>) -> Option<Arc<DocumentKind>> {
        self.kinds.insert(kind.name().to_string(), kind)
    }

    /// Register several kinds.
    pub fn register_all(&self, kinds: impl IntoIterator<Item = Arc<DocumentKind>>) {
        for kind in kinds {
            self.register(kind);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<DocumentKind>> {
        self.kinds.get(name).map(|k| k.value().clone())
    }

    /// Registered kind for `name`, or a plain kind of that name.
    pub fn resolve(&self, name: &str) -> Arc<DocumentKind> {
        self.get(name).unwrap_or_else(|| DocumentKind::plain(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
