//! Non-fatal resolution diagnostics and the sinks they are routed to
//!
//! Cycles and unresolved prerequisites never fail a resolution: they are
//! reported here and the missing value is passed as undefined.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A resolution diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `dependency` is already being resolved further up the current path
    CyclicDependency { name: String, dependency: String },
    /// `dependency` has no defined value when `name` is initialized
    UnresolvedDependency { name: String, dependency: String },
}

impl Diagnostic {
    /// Unit whose resolution produced the diagnostic
    pub fn name(&self) -> &str {
        match self {
            Diagnostic::CyclicDependency { name, .. }
            | Diagnostic::UnresolvedDependency { name, .. } => name,
        }
    }

    pub fn dependency(&self) -> &str {
        match self {
            Diagnostic::CyclicDependency { dependency, .. }
            | Diagnostic::UnresolvedDependency { dependency, .. } => dependency,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::CyclicDependency { name, dependency } => {
                write!(f, "Recursive dependency between \"{}\" and \"{}\"", name, dependency)
            }
            Diagnostic::UnresolvedDependency { name, dependency } => write!(
                f,
                "Module \"{}\" requires \"{}\", but is undefined",
                name, dependency
            ),
        }
    }
}

/// Destination for diagnostics
pub trait WarnSink: Send + Sync {
    fn warn(&self, diagnostic: &Diagnostic);
}

/// Default sink: logs each diagnostic at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl WarnSink for TracingSink {
    fn warn(&self, diagnostic: &Diagnostic) {
        warn!(
            unit = diagnostic.name(),
            dependency = diagnostic.dependency(),
            "{}",
            diagnostic
        );
    }
}

/// Sink that keeps every diagnostic in memory, in emission order
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    /// Rendered messages, in emission order
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }

    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }
}

impl WarnSink for MemorySink {
    fn warn(&self, diagnostic: &Diagnostic) {
        self.diagnostics.lock().push(diagnostic.clone());
    }
}
