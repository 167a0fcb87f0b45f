//! Dry-run a unit manifest through the resolver
//!
//! Registers every `[[unit]]` of a manifest with a fresh loader, runs one
//! resolution pass and reports the order initializers ran in, the diagnostics
//! emitted and the value each unit ended up with.

use clap::Parser;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use modresolve::utils::init_logging_from_config;
use modresolve::{
    downcast_value, Exports, Loader, LoaderConfig, MemorySink, RunOrder, UnitFailure, UnitManifest,
};

#[derive(Parser, Debug)]
#[command(name = "modresolve-plan", about = "Resolve a unit manifest and report the outcome")]
struct Args {
    /// Unit manifest (TOML with [[unit]] tables)
    manifest: PathBuf,

    /// Loader configuration file (.json or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Silence cycle and unresolved-prerequisite diagnostics
    #[arg(long)]
    ignore_warnings: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Also list every unit reachable from these names
    #[arg(long = "closure", value_name = "UNIT")]
    closure: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    run_order: Vec<String>,
    diagnostics: Vec<String>,
    failures: Vec<UnitFailure>,
    values: IndexMap<String, Option<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    closure: Vec<String>,
}

fn render(loader: &Loader, name: &str) -> Option<String> {
    let value = loader.lookup(name)?;
    if let Some(text) = downcast_value::<String>(&value) {
        return Some(text.to_string());
    }
    if let Some(exports) = downcast_value::<Exports>(&value) {
        return Some(format!("exports {:?}", exports.keys()));
    }
    Some("<opaque>".to_string())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    }
    .with_env_overrides();
    if args.ignore_warnings {
        config.ignore_warnings = true;
    }
    config.validate()?;
    init_logging_from_config(config.logging.as_ref());

    let manifest = UnitManifest::from_file(&args.manifest)?;
    let sink = MemorySink::new();
    let loader = Loader::with_sink(&config, Arc::new(sink.clone()));

    let failures: Arc<Mutex<Vec<UnitFailure>>> = Arc::default();
    let collected = Arc::clone(&failures);
    loader.ready_with_error(|| {}, move |failed| collected.lock().extend_from_slice(failed));

    let run_order = RunOrder::new();
    manifest.register_all(&loader, &run_order)?;
    loader.resolve();

    let values = manifest
        .units
        .iter()
        .map(|unit| (unit.name.clone(), render(&loader, &unit.name)))
        .collect();
    let roots: Vec<&str> = args.closure.iter().map(String::as_str).collect();
    let closure = if roots.is_empty() {
        Vec::new()
    } else {
        loader.dependency_closure(&roots)
    };

    let report = PlanReport {
        run_order: run_order.names(),
        diagnostics: sink.messages(),
        failures: failures.lock().clone(),
        values,
        closure,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("run order: {}", report.run_order.join(", "));
    if !report.diagnostics.is_empty() {
        println!("diagnostics:");
        for message in &report.diagnostics {
            println!("  {}", message);
        }
    }
    if !report.failures.is_empty() {
        println!("failures:");
        for failure in &report.failures {
            println!("  {}", failure);
        }
    }
    println!("values:");
    for (name, value) in &report.values {
        match value {
            Some(value) => println!("  {} = {}", name, value),
            None => println!("  {} = undefined", name),
        }
    }
    if !report.closure.is_empty() {
        println!("closure: {}", report.closure.join(", "));
    }

    Ok(())
}
