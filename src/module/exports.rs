//! Exports container handed to units that declare the `exports` prerequisite

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::module::traits::Value;

/// Reserved key whose entry becomes the unit's defined value
pub const DEFAULT_EXPORT: &str = "default";

/// Shared, mutable, insertion-ordered container a unit attaches its values to
///
/// Clones share the same entries. Once the unit's initializer returns, the
/// unit is defined as the `default` entry if one was set, otherwise as the
/// container itself.
#[derive(Clone, Default)]
pub struct Exports {
    entries: Arc<Mutex<IndexMap<String, Value>>>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an entry, returning the previous value under `key`
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.lock().insert(key.into(), value)
    }

    /// Set the reserved `default` entry
    pub fn set_default(&self, value: Value) -> Option<Value> {
        self.set(DEFAULT_EXPORT, value)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    pub fn default_export(&self) -> Option<Value> {
        self.get(DEFAULT_EXPORT)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether both handles point at the same container
    pub fn ptr_eq(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Value the owning unit is defined as
    pub(crate) fn into_defined_value(self) -> Value {
        match self.default_export() {
            Some(value) => value,
            None => Arc::new(self),
        }
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exports").field("keys", &self.keys()).finish()
    }
}
