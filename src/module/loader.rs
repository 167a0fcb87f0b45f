//! Loader: the producer/consumer surface of the unit system
//!
//! A `Loader` is a cheap, cloneable handle to one registry. Producers call
//! [`Loader::define`] / [`Loader::define_with`]; consumers call the
//! `require*` family, which always resolves pending work first.

use parking_lot::{Mutex, ReentrantMutex};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::module::diagnostics::{Diagnostic, TracingSink, WarnSink};
use crate::module::registry::{
    validate_name, PendingUnit, Prerequisite, Registry, UnitDependencies, UnitRecord,
};
use crate::module::scheduler::Scheduler;
use crate::module::traits::{
    downcast_value, Arguments, InitContext, Initializer, ModuleError, UnitFailure, Value,
};

pub(crate) struct LoaderInner {
    /// Re-entrant so initializers can call back into the loader mid-pass
    pub(crate) registry: ReentrantMutex<RefCell<Registry>>,
    pub(crate) scheduler: Mutex<Scheduler>,
    pub(crate) surface_errors: bool,
    sink: Arc<dyn WarnSink>,
    ignore_warnings: AtomicBool,
}

/// Handle to a unit registry
#[derive(Clone)]
pub struct Loader {
    pub(crate) inner: Arc<LoaderInner>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("pending", &self.pending_names())
            .field("ignore_warnings", &self.ignore_warnings())
            .finish_non_exhaustive()
    }
}

impl Loader {
    /// Create a loader with default configuration, logging diagnostics
    pub fn new() -> Self {
        Self::with_config(&LoaderConfig::default())
    }

    pub fn with_config(config: &LoaderConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a loader that routes diagnostics to `sink`
    pub fn with_sink(config: &LoaderConfig, sink: Arc<dyn WarnSink>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                registry: ReentrantMutex::new(RefCell::new(Registry::new())),
                scheduler: Mutex::new(Scheduler::new(config.batch_delay())),
                surface_errors: config.surface_errors,
                sink,
                ignore_warnings: AtomicBool::new(config.ignore_warnings),
            }),
        }
    }

    /// Define an immediate unit
    ///
    /// The initializer runs now, with no arguments, and its return value is
    /// stored as the unit's value. If the name is already defined this is a
    /// no-op and the initializer does not run.
    pub fn define<F>(&self, name: &str, initializer: F) -> Result<(), ModuleError>
    where
        F: Fn(&InitContext, Arguments) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.define_unit(name, None, Arc::new(initializer))
    }

    /// Define a unit that runs once its prerequisites are resolved
    ///
    /// The initializer receives one argument per prerequisite, in declared
    /// order. An empty prerequisite list still defers the unit to the next
    /// resolution pass.
    pub fn define_with<P, F>(
        &self,
        name: &str,
        prerequisites: P,
        initializer: F,
    ) -> Result<(), ModuleError>
    where
        P: IntoIterator,
        P::Item: Into<Prerequisite>,
        F: Fn(&InitContext, Arguments) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        let prerequisites: Vec<Prerequisite> = prerequisites.into_iter().map(Into::into).collect();
        self.define_unit(name, Some(prerequisites), Arc::new(initializer))
    }

    /// Register any [`Initializer`]
    ///
    /// `None` prerequisites define an immediate unit, `Some` a deferred one.
    pub fn define_unit(
        &self,
        name: &str,
        prerequisites: Option<Vec<Prerequisite>>,
        initializer: Arc<dyn Initializer>,
    ) -> Result<(), ModuleError> {
        validate_name(name)?;

        {
            let guard = self.inner.registry.lock();
            guard.borrow_mut().record(UnitRecord {
                name: name.to_string(),
                prerequisites: prerequisites.clone(),
            });
            let defined = guard.borrow().is_defined(name);

            if defined {
                debug!("Unit {} already defined, ignoring registration", name);
            } else if let Some(prerequisites) = prerequisites {
                let unit = PendingUnit::new(prerequisites, initializer);
                if guard.borrow_mut().insert_pending(name, unit).is_some() {
                    debug!("Unit {} re-registered before resolution, replacing", name);
                } else {
                    debug!("Unit {} pending", name);
                }
            } else {
                let context = InitContext::new(name);
                let value = initializer
                    .initialize(&context, Arguments::default())
                    .map_err(|e| ModuleError::InitializationFailed {
                        name: name.to_string(),
                        reason: format!("{:#}", e),
                    })?;
                guard.borrow_mut().define(name, value);
                debug!("Unit {} defined immediately", name);
            }
        }

        self.schedule_batch();
        Ok(())
    }

    /// Resolve pending units and return the value defined for `name`
    pub fn require(&self, name: &str) -> Option<Value> {
        self.resolve();
        self.lookup(name)
    }

    /// [`Loader::require`], downcast to `T`
    pub fn require_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.require(name).as_ref().and_then(downcast_value::<T>)
    }

    /// Synchronous lookup of a name list
    ///
    /// Only a single name can be returned without a callback; more than one
    /// fails with [`ModuleError::CallbackRequired`].
    pub fn require_many(&self, names: &[&str]) -> Result<Option<Value>, ModuleError> {
        self.resolve();
        match names {
            [] => Ok(None),
            [name] => Ok(self.lookup(name)),
            _ => Err(ModuleError::CallbackRequired),
        }
    }

    /// Resolve pending units and hand the values for `names`, positionally,
    /// to `callback`
    pub fn require_with<F>(&self, names: &[&str], callback: F)
    where
        F: FnOnce(Vec<Option<Value>>),
    {
        self.resolve();
        let values = names.iter().map(|name| self.lookup(name)).collect();
        callback(values);
    }

    /// Defined value for `name`, without resolving anything
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let guard = self.inner.registry.lock();
        let value = guard.borrow().lookup(name);
        value
    }

    /// Arm the one-shot callback fired when a pass leaves the registry settled
    pub fn ready<R>(&self, on_ready: R)
    where
        R: FnOnce() + Send + 'static,
    {
        let guard = self.inner.registry.lock();
        guard.borrow_mut().arm_callbacks(Box::new(on_ready), None);
    }

    /// [`Loader::ready`] with an error callback
    ///
    /// When the settling pass caught initializer failures, `on_error`
    /// receives them instead of `on_ready` being called.
    pub fn ready_with_error<R, E>(&self, on_ready: R, on_error: E)
    where
        R: FnOnce() + Send + 'static,
        E: FnOnce(&[UnitFailure]) + Send + 'static,
    {
        let guard = self.inner.registry.lock();
        guard
            .borrow_mut()
            .arm_callbacks(Box::new(on_ready), Some(Box::new(on_error)));
    }

    /// Discard every pending unit, defined value and armed callback
    pub fn clear(&self) {
        self.inner.scheduler.lock().cancel();
        let guard = self.inner.registry.lock();
        guard.borrow_mut().clear();
    }

    pub fn ignore_warnings(&self) -> bool {
        self.inner.ignore_warnings.load(Ordering::Relaxed)
    }

    /// Silence cycle and unresolved-prerequisite diagnostics
    pub fn set_ignore_warnings(&self, ignore: bool) {
        self.inner.ignore_warnings.store(ignore, Ordering::Relaxed);
    }

    pub(crate) fn emit(&self, diagnostic: Diagnostic) {
        if !self.ignore_warnings() {
            self.inner.sink.warn(&diagnostic);
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        let guard = self.inner.registry.lock();
        let defined = guard.borrow().is_defined(name);
        defined
    }

    pub fn is_pending(&self, name: &str) -> bool {
        let guard = self.inner.registry.lock();
        let pending = guard.borrow().is_pending(name);
        pending
    }

    pub fn pending_names(&self) -> Vec<String> {
        let guard = self.inner.registry.lock();
        let names = guard.borrow().pending_names();
        names
    }

    /// Latest registration recorded under `name`
    pub fn record(&self, name: &str) -> Option<UnitRecord> {
        let guard = self.inner.registry.lock();
        let record = guard.borrow().get_record(name).cloned();
        record
    }

    /// Every registration, in first-registration order
    pub fn records(&self) -> Vec<UnitRecord> {
        let guard = self.inner.registry.lock();
        let records = guard.borrow().records().values().cloned().collect();
        records
    }

    /// `names` plus every unit they transitively require
    pub fn dependency_closure(&self, names: &[&str]) -> Vec<String> {
        let guard = self.inner.registry.lock();
        let closure = UnitDependencies::closure(names.iter().copied(), guard.borrow().records());
        closure
    }

    /// Whether both handles share the same registry
    pub fn ptr_eq(&self, other: &Loader) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of resolution passes run so far
    pub fn pass_count(&self) -> u64 {
        self.inner.scheduler.lock().passes()
    }

    /// Whether a deferred pass is waiting to run
    pub fn is_batch_armed(&self) -> bool {
        self.inner.scheduler.lock().is_armed()
    }
}
