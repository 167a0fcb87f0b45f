//! modresolve - dependency-graph-aware unit registration and resolution
//!
//! Producers register named units of work along with the prerequisites they
//! need. The loader defers each unit until its prerequisites are available,
//! caches each unit's result exactly once, reports circular prerequisite
//! chains, and offers both a batched deferred resolution path and an
//! immediate lookup path.
//!
//! ## Design Principles
//!
//! 1. **Explicit context**: every registry lives behind a [`Loader`] handle;
//!    there is no process-wide state
//! 2. **First registration wins**: a defined value is never overwritten
//! 3. **Non-fatal diagnostics**: cycles and missing prerequisites are
//!    reported and resolution continues with an undefined value
//!
//! ## Example
//!
//! ```rust
//! use modresolve::{into_value, Loader};
//!
//! let loader = Loader::new();
//! loader
//!     .define_with("greeting", ["name"], |_, args| {
//!         let name = args.downcast::<String>(0).map(|n| n.to_string()).unwrap_or_default();
//!         Ok(Some(into_value(format!("hello {}", name))))
//!     })
//!     .unwrap();
//! loader
//!     .define("name", |_, _| {
//!         Ok(Some(into_value("world".to_string())))
//!     })
//!     .unwrap();
//!
//! let greeting = loader.require_as::<String>("greeting").unwrap();
//! assert_eq!(greeting.as_str(), "hello world");
//! ```

pub mod config;
pub mod module;
pub mod utils;

// Re-export config module
pub use config::*;

// Re-export the unit system surface
pub use module::{
    downcast_value, into_value, Argument, Arguments, Diagnostic, Exports, InitContext,
    Initializer, Loader, MemorySink, ModuleError, Prerequisite, RunOrder, TracingSink,
    UnitFailure, UnitManifest, UnitRecord, Value, WarnSink, DEFAULT_EXPORT,
};
