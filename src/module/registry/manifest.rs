//! Unit manifest parsing and registration
//!
//! Handles parsing unit manifests (`[[unit]]` tables in TOML) and registering
//! their entries with a loader. Used by the plan tool to dry-run a graph.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::module::loader::Loader;
use crate::module::registry::validate_name;
use crate::module::traits::{into_value, Arguments, InitContext, ModuleError, Value};

/// Unit manifest (units.toml structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitManifest {
    /// Units in registration order
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitEntry>,
}

/// A single `[[unit]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitEntry {
    /// Unit name
    pub name: String,
    /// Prerequisite names; omit for an immediate unit
    #[serde(default)]
    pub prerequisites: Option<Vec<String>>,
    /// Value the unit is defined as (defaults to its name)
    #[serde(default)]
    pub value: Option<String>,
    /// If set, the initializer fails with this message
    #[serde(default)]
    pub fail: Option<String>,
}

/// Order in which manifest initializers actually ran
#[derive(Debug, Clone, Default)]
pub struct RunOrder {
    names: Arc<Mutex<Vec<String>>>,
}

impl RunOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.names.lock().push(name.to_string());
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().clone()
    }
}

impl UnitManifest {
    /// Load manifest from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a manifest
    pub fn from_toml_str(contents: &str) -> Result<Self, ModuleError> {
        let manifest: UnitManifest = toml::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ModuleError> {
        if self.units.is_empty() {
            return Err(ModuleError::InvalidManifest(
                "Manifest declares no units".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.units {
            validate_name(&entry.name)
                .map_err(|e| ModuleError::InvalidManifest(e.to_string()))?;
            if !seen.insert(entry.name.as_str()) {
                return Err(ModuleError::InvalidManifest(format!(
                    "Unit {} is declared more than once",
                    entry.name
                )));
            }
        }

        Ok(())
    }

    /// Register every entry with `loader`
    ///
    /// Each initializer records its name in `run_order` when it runs.
    /// Immediate entries therefore run (and are recorded) during this call.
    pub fn register_all(&self, loader: &Loader, run_order: &RunOrder) -> Result<(), ModuleError> {
        for entry in &self.units {
            let initializer = entry.initializer(run_order.clone());
            match &entry.prerequisites {
                Some(prerequisites) => {
                    loader.define_with(&entry.name, prerequisites, initializer)?
                }
                None => loader.define(&entry.name, initializer)?,
            }
        }
        debug!("Registered {} manifest units", self.units.len());
        Ok(())
    }
}

impl UnitEntry {
    fn initializer(
        &self,
        run_order: RunOrder,
    ) -> impl Fn(&InitContext, Arguments) -> anyhow::Result<Option<Value>> + Send + Sync + 'static
    {
        let value = self.value.clone().unwrap_or_else(|| self.name.clone());
        let fail = self.fail.clone();
        move |ctx: &InitContext, _args: Arguments| {
            run_order.record(&ctx.name);
            if let Some(message) = &fail {
                anyhow::bail!("{}", message);
            }
            Ok(Some(into_value(value.clone())))
        }
    }
}
