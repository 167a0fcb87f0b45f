//! Recursive unit resolution
//!
//! Walks a unit's prerequisites in declared order, resolving pending ones
//! first, detects cycles against the units currently on the resolution path,
//! then runs the unit's initializer and commits its value.
//!
//! No `RefCell` borrow of the registry is held while an initializer runs, so
//! initializers may call back into the loader.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace, warn};

use crate::module::diagnostics::Diagnostic;
use crate::module::exports::Exports;
use crate::module::loader::Loader;
use crate::module::registry::{PendingUnit, Prerequisite, Registry};
use crate::module::traits::{Argument, Arguments, InitContext, UnitFailure};

/// Clears a unit's in-progress mark when dropped
///
/// Runs on success, on initializer errors and while unwinding, unless the
/// registry was cleared in the meantime.
struct InProgressGuard<'a> {
    state: &'a RefCell<Registry>,
    name: &'a str,
    epoch: u64,
}

impl<'a> InProgressGuard<'a> {
    fn enter(state: &'a RefCell<Registry>, name: &'a str, epoch: u64) -> Self {
        state.borrow_mut().mark_in_progress(name);
        Self { state, name, epoch }
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.state.try_borrow_mut() {
            if registry.epoch() == self.epoch {
                registry.unmark_in_progress(self.name);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Resolver for a single pass
pub(crate) struct Resolver<'a> {
    loader: &'a Loader,
    state: &'a RefCell<Registry>,
    epoch: u64,
    failures: Vec<UnitFailure>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(loader: &'a Loader, state: &'a RefCell<Registry>) -> Self {
        let epoch = state.borrow().epoch();
        Self {
            loader,
            state,
            epoch,
            failures: Vec::new(),
        }
    }

    /// Whether the registry this resolver started on is still live
    pub(crate) fn is_current(&self) -> bool {
        self.state.borrow().epoch() == self.epoch
    }

    /// Failures caught so far, including failed prerequisites
    pub(crate) fn into_failures(self) -> Vec<UnitFailure> {
        self.failures
    }

    /// Resolve `name`, already taken out of the pending table, and catch
    /// any initializer failure
    ///
    /// A panicking initializer is recorded as a failure like any other error.
    pub(crate) fn resolve_unit(&mut self, name: &str, unit: PendingUnit) {
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.resolve(name, unit))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => format!("initializer panicked: {}", panic_message(payload.as_ref())),
        };
        warn!("Unit {} failed to initialize: {}", name, reason);
        self.failures.push(UnitFailure {
            name: name.to_string(),
            reason,
        });
    }

    fn resolve(&mut self, name: &str, unit: PendingUnit) -> anyhow::Result<()> {
        if !self.is_current() {
            debug!("Registry cleared, dropping {}", name);
            return Ok(());
        }
        if self.state.borrow().is_defined(name) {
            trace!("Unit {} already defined", name);
            return Ok(());
        }

        let state = self.state;
        let _guard = InProgressGuard::enter(state, name, self.epoch);

        for dep in unit.prerequisites.iter().filter_map(Prerequisite::name) {
            if !self.is_current() {
                return Ok(());
            }
            let cycle = state.borrow().is_in_progress(dep);
            if cycle {
                self.loader.emit(Diagnostic::CyclicDependency {
                    name: name.to_string(),
                    dependency: dep.to_string(),
                });
                continue;
            }

            let dep_unit = state.borrow_mut().take_pending(dep);
            if let Some(dep_unit) = dep_unit {
                debug!("Resolving {} for {}", dep, name);
                self.resolve_unit(dep, dep_unit);
            }
        }

        // A prerequisite may have cleared the registry or, through a nested
        // pass, defined us already.
        if !self.is_current() || state.borrow().is_defined(name) {
            return Ok(());
        }

        let mut exports = None;
        let mut args = Vec::with_capacity(unit.prerequisites.len());
        for prerequisite in unit.prerequisites.iter() {
            match prerequisite {
                Prerequisite::SelfReference => args.push(Argument::Loader(self.loader.clone())),
                Prerequisite::ExportsContainer => {
                    let container = Exports::new();
                    exports = Some(container.clone());
                    args.push(Argument::Exports(container));
                }
                Prerequisite::Named(dep) => {
                    let entry = state.borrow().defined_entry(dep);
                    match entry {
                        Some(value) => args.push(Argument::Value(value)),
                        None => {
                            self.loader.emit(Diagnostic::UnresolvedDependency {
                                name: name.to_string(),
                                dependency: dep.clone(),
                            });
                            args.push(Argument::Value(None));
                        }
                    }
                }
            }
        }

        let context = InitContext::new(name);
        let returned = unit.initializer.initialize(&context, Arguments::new(args))?;
        let value = match exports {
            Some(container) => Some(container.into_defined_value()),
            None => returned,
        };

        let mut registry = state.borrow_mut();
        if registry.epoch() != self.epoch {
            debug!("Registry cleared while resolving {}, dropping its value", name);
        } else if registry.define(name, value) {
            debug!("Unit {} defined", name);
        }

        Ok(())
    }
}
