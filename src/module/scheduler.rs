//! Batch scheduling of resolution passes
//!
//! Registrations arm a one-shot deferred pass; re-arming aborts the previous
//! arm, so a burst of registrations within one tick produces a single pass.
//! Lookups bypass the timer and resolve immediately.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::module::loader::Loader;
use crate::module::resolver::Resolver;
use crate::module::traits::{ErrorCallback, ReadyCallback, UnitFailure};

/// An outstanding arm
#[derive(Debug)]
enum Arm {
    /// Deferred pass running on the tokio runtime
    Task { id: u64, handle: JoinHandle<()> },
    /// No runtime was available; the pass runs on the next immediate resolve
    Deferred { id: u64 },
}

impl Arm {
    fn id(&self) -> u64 {
        match self {
            Arm::Task { id, .. } | Arm::Deferred { id } => *id,
        }
    }

    fn cancel(self) {
        if let Arm::Task { handle, .. } = self {
            handle.abort();
        }
    }
}

/// Debounce state for deferred passes
#[derive(Debug)]
pub(crate) struct Scheduler {
    delay: Duration,
    armed: Option<Arm>,
    next_id: u64,
    passes: u64,
}

impl Scheduler {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed: None,
            next_id: 0,
            passes: 0,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub(crate) fn passes(&self) -> u64 {
        self.passes
    }

    /// Drop the outstanding arm, if any
    pub(crate) fn cancel(&mut self) {
        if let Some(arm) = self.armed.take() {
            debug!("Cancelling batch arm {}", arm.id());
            arm.cancel();
        }
    }

    /// Claim the arm `id` for firing; false if it was cancelled or replaced
    fn claim(&mut self, id: u64) -> bool {
        match &self.armed {
            Some(arm) if arm.id() == id => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Loader {
    /// Arm a deferred pass, replacing any outstanding arm
    pub(crate) fn schedule_batch(&self) {
        let mut scheduler = self.inner.scheduler.lock();
        scheduler.cancel();

        scheduler.next_id = scheduler.next_id.wrapping_add(1);
        let id = scheduler.next_id;
        let delay = scheduler.delay;

        let arm = match Handle::try_current() {
            Ok(runtime) => {
                let weak = Arc::downgrade(&self.inner);
                let handle = runtime.spawn(async move {
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    if let Some(inner) = weak.upgrade() {
                        Loader { inner }.fire(id);
                    }
                });
                Arm::Task { id, handle }
            }
            Err(_) => {
                debug!("No tokio runtime, batch {} runs on next resolve", id);
                Arm::Deferred { id }
            }
        };
        scheduler.armed = Some(arm);
    }

    fn fire(&self, id: u64) {
        let claimed = self.inner.scheduler.lock().claim(id);
        if claimed {
            debug!("Batch arm {} fired", id);
            self.run_pass();
        }
    }

    /// Cancel any outstanding arm and run a full resolution pass now
    pub fn resolve(&self) {
        self.inner.scheduler.lock().cancel();
        self.run_pass();
    }

    /// Resolve every currently pending unit, then fire the ready slot if the
    /// registry is settled
    pub(crate) fn run_pass(&self) {
        let guard = self.inner.registry.lock();
        let state = &*guard;

        let names = state.borrow().pending_names();
        debug!("Resolution pass over {} pending units", names.len());

        let mut resolver = Resolver::new(self, state);
        for name in &names {
            if !resolver.is_current() {
                debug!("Registry cleared mid-pass, abandoning remaining units");
                break;
            }
            let unit = state.borrow_mut().take_pending(name);
            if let Some(unit) = unit {
                resolver.resolve_unit(name, unit);
            }
        }
        let current = resolver.is_current();
        let failures = resolver.into_failures();

        let passes = {
            let mut scheduler = self.inner.scheduler.lock();
            scheduler.passes += 1;
            scheduler.passes
        };

        let callbacks = {
            let mut registry = state.borrow_mut();
            if current && registry.is_settled() {
                registry.take_callbacks()
            } else {
                (None, None)
            }
        };
        drop(guard);

        info!(
            "Resolution pass {} complete: {} units visited, {} failed",
            passes,
            names.len(),
            failures.len()
        );

        self.dispatch_callbacks(callbacks, &failures);
    }

    fn dispatch_callbacks(
        &self,
        (on_ready, on_error): (Option<ReadyCallback>, Option<ErrorCallback>),
        failures: &[UnitFailure],
    ) {
        match (on_error, failures.is_empty()) {
            (Some(on_error), false) if self.inner.surface_errors => {
                debug!("Delivering {} failures to error callback", failures.len());
                on_error(failures);
            }
            _ => {
                if let Some(on_ready) = on_ready {
                    debug!("Registry settled, firing ready callback");
                    on_ready();
                }
            }
        }
    }
}
