//! Unit system for modresolve
//!
//! Producers register named units together with the prerequisites they need;
//! the loader defers each unit until its prerequisites are available, runs its
//! initializer exactly once and caches the result.
//!
//! ## Architecture
//!
//! - **Registry**: pending units, defined values, the in-progress marker and
//!   the ready/error callback slots, shared by every handle to a loader
//! - **Resolver**: recursive walk of a unit's prerequisites in declared order,
//!   with cycle detection against the active resolution path
//! - **Scheduler**: coalesces a burst of registrations into one deferred pass;
//!   lookups resolve immediately instead of waiting for it

pub mod diagnostics;
pub mod exports;
pub mod loader;
pub mod registry;
pub(crate) mod resolver;
pub(crate) mod scheduler;
pub mod traits;

pub use diagnostics::{Diagnostic, MemorySink, TracingSink, WarnSink};
pub use exports::{Exports, DEFAULT_EXPORT};
pub use loader::Loader;
pub use registry::{Prerequisite, RunOrder, UnitManifest, UnitRecord};
pub use traits::{
    downcast_value, into_value, Argument, Arguments, InitContext, Initializer, ModuleError,
    UnitFailure, Value,
};
