//! Unit registry
//!
//! Owns the tables every producer and consumer shares: pending units, defined
//! values, the in-progress marker used for cycle detection, the raw
//! registration records and the ready/error callback slots.

pub mod dependencies;
pub mod manifest;

pub use dependencies::{Prerequisite, UnitDependencies, EXPORTS_SENTINEL, REQUIRE_SENTINEL};
pub use manifest::{RunOrder, UnitEntry, UnitManifest};

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::module::traits::{ErrorCallback, Initializer, ModuleError, ReadyCallback, Value};

/// A unit waiting for its prerequisites
#[derive(Clone)]
pub struct PendingUnit {
    pub prerequisites: Arc<[Prerequisite]>,
    pub initializer: Arc<dyn Initializer>,
}

impl PendingUnit {
    pub fn new(prerequisites: Vec<Prerequisite>, initializer: Arc<dyn Initializer>) -> Self {
        Self {
            prerequisites: prerequisites.into(),
            initializer,
        }
    }
}

impl fmt::Debug for PendingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUnit")
            .field("prerequisites", &self.prerequisites)
            .finish_non_exhaustive()
    }
}

/// What a producer registered under a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub name: String,
    /// `None` for immediate units registered without a prerequisite list
    pub prerequisites: Option<Vec<Prerequisite>>,
}

/// Check that `name` can be used as a unit name
pub fn validate_name(name: &str) -> Result<(), ModuleError> {
    let reason = if name.is_empty() {
        "name cannot be empty"
    } else if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        "name cannot contain whitespace or control characters"
    } else if name == REQUIRE_SENTINEL || name == EXPORTS_SENTINEL {
        "name is a reserved prerequisite"
    } else {
        return Ok(());
    };

    Err(ModuleError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Registry tables
///
/// A name is never both pending and defined, and a defined value is never
/// overwritten. `epoch` advances on every [`Registry::clear`] so work started
/// before a reset can tell that its tables are gone.
#[derive(Default)]
pub struct Registry {
    pending: IndexMap<String, PendingUnit>,
    defined: HashMap<String, Option<Value>>,
    in_progress: HashSet<String>,
    records: IndexMap<String, UnitRecord>,
    on_ready: Option<ReadyCallback>,
    on_error: Option<ErrorCallback>,
    epoch: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Discard every table and callback slot
    pub fn clear(&mut self) {
        debug!(
            "Clearing registry ({} pending, {} defined)",
            self.pending.len(),
            self.defined.len()
        );
        *self = Registry {
            epoch: self.epoch.wrapping_add(1),
            ..Registry::default()
        };
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains_key(name)
    }

    /// Defined value for `name`; `None` when absent or defined as undefined
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.defined.get(name).cloned().flatten()
    }

    /// Raw table entry: `Some(None)` means "defined as undefined"
    pub fn defined_entry(&self, name: &str) -> Option<Option<Value>> {
        self.defined.get(name).cloned()
    }

    /// Commit a defined value; returns false if `name` was already defined
    pub fn define(&mut self, name: &str, value: Option<Value>) -> bool {
        if self.defined.contains_key(name) {
            return false;
        }
        self.pending.shift_remove(name);
        self.defined.insert(name.to_string(), value);
        true
    }

    /// Store a pending unit, returning the unit it replaced
    pub fn insert_pending(&mut self, name: &str, unit: PendingUnit) -> Option<PendingUnit> {
        self.pending.insert(name.to_string(), unit)
    }

    pub fn take_pending(&mut self, name: &str) -> Option<PendingUnit> {
        self.pending.shift_remove(name)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    /// Pending names in registration order
    pub fn pending_names(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn defined_len(&self) -> usize {
        self.defined.len()
    }

    /// Mark `name` as being resolved; false if it already was
    pub fn mark_in_progress(&mut self, name: &str) -> bool {
        self.in_progress.insert(name.to_string())
    }

    pub fn unmark_in_progress(&mut self, name: &str) {
        self.in_progress.remove(name);
    }

    pub fn is_in_progress(&self, name: &str) -> bool {
        self.in_progress.contains(name)
    }

    /// No pending units and nothing mid-resolution
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_empty()
    }

    pub fn record(&mut self, record: UnitRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn get_record(&self, name: &str) -> Option<&UnitRecord> {
        self.records.get(name)
    }

    pub fn records(&self) -> &IndexMap<String, UnitRecord> {
        &self.records
    }

    /// Arm the ready slot, replacing any callbacks armed earlier
    pub fn arm_callbacks(&mut self, on_ready: ReadyCallback, on_error: Option<ErrorCallback>) {
        self.on_ready = Some(on_ready);
        self.on_error = on_error;
    }

    pub fn has_ready_callback(&self) -> bool {
        self.on_ready.is_some()
    }

    pub fn take_callbacks(&mut self) -> (Option<ReadyCallback>, Option<ErrorCallback>) {
        (self.on_ready.take(), self.on_error.take())
    }
}
