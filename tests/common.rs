//! Shared fixtures for the integration tests

#![allow(dead_code)]

use modresolve::{downcast_value, into_value, Loader, LoaderConfig, MemorySink, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Initializer result holding a `String`
pub fn text(value: &str) -> anyhow::Result<Option<Value>> {
    Ok(Some(into_value(value.to_string())))
}

/// Read a `String` value back out
pub fn as_text(value: &Option<Value>) -> Option<String> {
    value
        .as_ref()
        .and_then(downcast_value::<String>)
        .map(|s| s.to_string())
}

/// Loader that records diagnostics instead of logging them
pub fn recording_loader() -> (Loader, MemorySink) {
    recording_loader_with(&LoaderConfig::default())
}

pub fn recording_loader_with(config: &LoaderConfig) -> (Loader, MemorySink) {
    let sink = MemorySink::new();
    let loader = Loader::with_sink(config, Arc::new(sink.clone()));
    (loader, sink)
}

/// Give the runtime time to fire any armed batch
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

/// Counts initializer invocations
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ordered log of names, shared with initializers
#[derive(Debug, Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}
