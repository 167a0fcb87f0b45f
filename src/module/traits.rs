//! Unit system traits and interfaces
//!
//! Defines the values, positional arguments and initializer interface that flow
//! between producers, the resolver and consumers.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::module::exports::Exports;
use crate::module::loader::Loader;

/// A defined value.
///
/// Units produce arbitrary values; consumers downcast them back to the concrete
/// type they expect. A missing (`None`) value stands for "undefined".
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value for storage in the registry
pub fn into_value<T: Any + Send + Sync>(value: T) -> Value {
    Arc::new(value)
}

/// Downcast a defined value to a concrete type
pub fn downcast_value<T: Any + Send + Sync>(value: &Value) -> Option<Arc<T>> {
    Arc::clone(value).downcast::<T>().ok()
}

/// Context handed to every initializer
///
/// Carries the name the unit is being resolved under, so a single initializer
/// can be shared between units and still know which one it is building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitContext {
    /// Name of the unit being initialized
    pub name: String,
}

impl InitContext {
    /// Create a context for the named unit
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A single positional argument passed to an initializer
#[derive(Clone)]
pub enum Argument {
    /// Defined value of a named prerequisite (`None` when it is undefined)
    Value(Option<Value>),
    /// Handle to the loader that is resolving the unit
    Loader(Loader),
    /// Fresh exports container owned by the unit being resolved
    Exports(Exports),
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(Some(value)) => f.debug_tuple("Value").field(value).finish(),
            Argument::Value(None) => f.write_str("Value(undefined)"),
            Argument::Loader(_) => f.write_str("Loader"),
            Argument::Exports(exports) => f.debug_tuple("Exports").field(exports).finish(),
        }
    }
}

/// Positional argument list, one entry per declared prerequisite
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    args: Vec<Argument>,
}

impl Arguments {
    pub fn new(args: Vec<Argument>) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.args.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.iter()
    }

    /// Defined value at `index`, if that slot holds one
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.args.get(index) {
            Some(Argument::Value(Some(value))) => Some(value),
            _ => None,
        }
    }

    /// Defined value at `index`, downcast to `T`
    pub fn downcast<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.value(index).and_then(downcast_value::<T>)
    }

    /// Loader handle at `index` (the `require` self-reference)
    pub fn loader(&self, index: usize) -> Option<&Loader> {
        match self.args.get(index) {
            Some(Argument::Loader(loader)) => Some(loader),
            _ => None,
        }
    }

    /// Exports container at `index`
    pub fn exports(&self, index: usize) -> Option<&Exports> {
        match self.args.get(index) {
            Some(Argument::Exports(exports)) => Some(exports),
            _ => None,
        }
    }

    pub fn into_vec(self) -> Vec<Argument> {
        self.args
    }
}

/// Initializer trait that every unit provides
///
/// Implemented for any `Fn(&InitContext, Arguments) -> anyhow::Result<Option<Value>>`,
/// so plain closures can be registered directly.
pub trait Initializer: Send + Sync {
    /// Build the unit's value from its resolved prerequisites
    ///
    /// Returning `Ok(None)` defines the unit as undefined. Returning an error
    /// leaves the unit undefined; the failure is reported but never aborts the
    /// surrounding resolution pass. A panic during a pass is reported the same
    /// way. A panic in an immediate unit propagates to the `define` caller.
    fn initialize(&self, context: &InitContext, args: Arguments) -> anyhow::Result<Option<Value>>;
}

impl<F> Initializer for F
where
    F: Fn(&InitContext, Arguments) -> anyhow::Result<Option<Value>> + Send + Sync,
{
    fn initialize(&self, context: &InitContext, args: Arguments) -> anyhow::Result<Option<Value>> {
        self(context, args)
    }
}

/// Callback armed with [`Loader::ready`]
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

/// Error callback armed with [`Loader::ready_with_error`]
pub type ErrorCallback = Box<dyn FnOnce(&[UnitFailure]) + Send>;

/// An initializer failure caught at the resolution-pass boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    /// Unit whose initializer failed
    pub name: String,
    /// Rendered error chain
    pub reason: String,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// Unit system errors
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Invalid unit name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Callback function required")]
    CallbackRequired,

    #[error("ModuleError in \"{name}\": {reason}")]
    InitializationFailed { name: String, reason: String },

    #[error("Invalid unit manifest: {0}")]
    InvalidManifest(String),
}

impl From<toml::de::Error> for ModuleError {
    fn from(e: toml::de::Error) -> Self {
        ModuleError::InvalidManifest(e.to_string())
    }
}
