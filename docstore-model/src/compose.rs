//! Synthetic partition-key composition.

use crate::document::{PARTITION, TYPE};
use crate::error::FormatError;
use crate::format::format_component;
use crate::kind::DocumentKind;
use crate::store::PropertyStore;
use crate::value::PropertyValue;

/// Whether a change to `name` requires the partition to be recomputed.
///
/// A kind without annotations derives its partition from `type`; the
/// partition itself never triggers recomposition.
pub fn is_trigger(kind: &DocumentKind, name: &str) -> bool {
    if name == PARTITION {
        return false;
    }

    let descriptor = kind.descriptor();
    if descriptor.is_empty() {
        name == TYPE
    } else {
        descriptor.contains(name)
    }
}

/// Compose the partition value from the kind's descriptor and the current
/// property values.
///
/// Absent properties contribute an empty component. A kind without
/// annotations yields its type value.
pub fn compose(kind: &DocumentKind, store: &PropertyStore) -> Result<String, FormatError> {
    let descriptor = kind.descriptor();
    if descriptor.is_empty() {
        return Ok(store
            .get(TYPE)
            .map(PropertyValue::to_string)
            .unwrap_or_else(|| kind.name().to_string()));
    }

    let null = PropertyValue::Null;
    let parts = descriptor
        .iter()
        .map(|entry| {
            let value = store.get(&entry.name).unwrap_or(&null);
            format_component(
                &entry.name,
                value,
                entry.format.as_deref(),
                entry.culture.as_deref(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(parts.join(kind.separator()))
}
