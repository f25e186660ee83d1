//! Change-notifying property bag.
//!
//! Every document keeps its values in a [`PropertyStore`]. Writes compare the
//! new value against the stored one and notify a single observer
//! synchronously when something actually changed.

use std::collections::HashMap;
use std::fmt;

use crate::value::PropertyValue;

/// A change that was applied to a property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Name of the property that changed
    pub name: String,
    /// Previous value, `None` if the property was absent
    pub old_value: Option<PropertyValue>,
    /// Value now stored
    pub new_value: PropertyValue,
}

/// Callback invoked for every applied change.
pub type ChangeObserver = Box<dyn FnMut(&PropertyChange) + Send>;

/// Named property bag with change notification.
///
/// Not safe for concurrent mutation; a store assumes a single writer.
#[derive(Default)]
pub struct PropertyStore {
    values: HashMap<String, PropertyValue>,
    observer: Option<ChangeObserver>,
}

impl PropertyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the observer, replacing any previous one.
    pub fn on_change<F>(&mut self, observer: F)
    where
        F: FnMut(&PropertyChange) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Remove the observer.
    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn has_observer(&self) -> bool {
        self.observer.is_some()
    }

    /// Get a stored value.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Get a value, storing the factory's result on a miss.
    ///
    /// The factory runs at most once and the write goes through [`set`],
    /// so a miss fires a change notification.
    ///
    /// [`set`]: PropertyStore::set
    pub fn get_or_insert_with<F>(&mut self, name: &str, factory: F) -> PropertyValue
    where
        F: FnOnce() -> PropertyValue,
    {
        if let Some(value) = self.values.get(name) {
            return value.clone();
        }

        let value = factory();
        self.set(name, value.clone());
        value
    }

    /// Set a value. Returns `true` if the stored value changed.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> bool {
        self.replace(name, value).is_some()
    }

    /// Set a value and return the applied change, if any.
    pub fn replace(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyChange> {
        let name = name.into();
        let value = value.into();

        if self.values.get(&name) == Some(&value) {
            return None;
        }

        let old_value = self.values.insert(name.clone(), value.clone());
        let change = PropertyChange {
            name,
            old_value,
            new_value: value,
        };

        if let Some(observer) = self.observer.as_mut() {
            observer(&change);
        }

        Some(change)
    }

    /// Insert a value without comparing or notifying.
    ///
    /// Used when hydrating a store from persisted data.
    pub fn load(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Remove a property without notifying.
    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    /// Iterate over all stored properties.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Clone for PropertyStore {
    /// Clones the values only; the observer stays with the original.
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            observer: None,
        }
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyStore")
            .field("values", &self.values)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_store() -> (PropertyStore, Arc<Mutex<Vec<PropertyChange>>>) {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        let mut store = PropertyStore::new();
        store.on_change(move |c| sink.lock().unwrap().push(c.clone()));
        (store, changes)
    }

    #[test]
    fn test_set_notifies_on_new_and_changed_values() {
        let (mut store, changes) = recording_store();

        assert!(store.set("name", "a"));
        assert!(store.set("name", "b"));

        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].old_value, None);
        assert_eq!(changes[1].old_value, Some(PropertyValue::from("a")));
        assert_eq!(changes[1].new_value, PropertyValue::from("b"));
    }

    #[test]
    fn test_equal_value_is_not_a_change() {
        let (mut store, changes) = recording_store();

        assert!(store.set("count", 3));
        assert!(!store.set("count", 3));
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_default_factory_runs_once_and_writes() {
        let (mut store, changes) = recording_store();
        let mut calls = 0;

        let first = store.get_or_insert_with("created", || {
            calls += 1;
            PropertyValue::Integer(1)
        });
        let second = store.get_or_insert_with("created", || {
            calls += 1;
            PropertyValue::Integer(2)
        });

        assert_eq!(calls, 1);
        assert_eq!(first, second);
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_load_is_silent() {
        let (mut store, changes) = recording_store();
        store.load("id", "x");

        assert_eq!(store.get("id"), Some(&PropertyValue::from("x")));
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clone_drops_observer() {
        let (store, _) = recording_store();
        assert!(store.has_observer());
        assert!(!store.clone().has_observer());
    }
}
