//! Loader behavior tests
//!
//! Registration, lookup, diagnostics, exports and lifecycle of a single
//! registry. No tokio runtime is running here, so every batch stays armed
//! until a lookup resolves it.

use modresolve::{
    downcast_value, into_value, Argument, Exports, LoaderConfig, ModuleError, Prerequisite,
    UnitFailure,
};
use parking_lot::Mutex;
use std::sync::Arc;
mod common;
use common::*;

#[test]
fn test_define_immediate_runs_now() {
    let (loader, _sink) = recording_loader();
    let counter = CallCounter::new();
    let calls = counter.clone();

    loader
        .define("foo", move |ctx, args| {
            calls.hit();
            assert_eq!(ctx.name, "foo");
            assert!(args.is_empty());
            text("bar")
        })
        .unwrap();

    assert_eq!(counter.count(), 1);
    assert!(loader.is_defined("foo"));
    assert_eq!(as_text(&loader.lookup("foo")), Some("bar".to_string()));
}

#[test]
fn test_define_with_receives_prerequisite_values() {
    let (loader, sink) = recording_loader();
    let seen = Trace::new();
    let record = seen.clone();

    loader
        .define_with("bar", ["baz"], move |_, args| {
            assert_eq!(args.len(), 1);
            record.push(args.downcast::<String>(0).unwrap().as_str());
            text("bar")
        })
        .unwrap();
    loader.define("baz", |_, _| text("baz")).unwrap();

    assert!(loader.is_pending("bar"));
    assert_eq!(as_text(&loader.require("bar")), Some("bar".to_string()));
    assert_eq!(seen.entries(), vec!["baz"]);
    assert!(sink.is_empty());
}

#[test]
fn test_prerequisites_registered_later_resolve_first() {
    let (loader, sink) = recording_loader();
    let order = Trace::new();

    let o = order.clone();
    loader
        .define_with("app", ["db", "cache"], move |_, _| {
            o.push("app");
            text("app")
        })
        .unwrap();
    let o = order.clone();
    loader
        .define_with("cache", ["db"], move |_, _| {
            o.push("cache");
            text("cache")
        })
        .unwrap();
    let o = order.clone();
    loader
        .define_with("db", Vec::<&str>::new(), move |_, _| {
            o.push("db");
            text("db")
        })
        .unwrap();

    loader.resolve();

    assert_eq!(order.entries(), vec!["db", "cache", "app"]);
    assert!(loader.pending_names().is_empty());
    assert!(sink.is_empty());
}

#[test]
fn test_require_many_single_name() {
    let (loader, _sink) = recording_loader();
    loader.define("bar", |_, _| text("bar")).unwrap();

    let value = loader.require_many(&["bar"]).unwrap();
    assert_eq!(as_text(&value), Some("bar".to_string()));
    assert!(loader.require_many(&[]).unwrap().is_none());
}

#[test]
fn test_require_many_without_callback_fails() {
    let (loader, _sink) = recording_loader();
    loader.define("bar", |_, _| text("bar")).unwrap();
    loader.define("baz", |_, _| text("baz")).unwrap();

    let err = loader.require_many(&["bar", "baz"]).unwrap_err();
    assert!(matches!(err, ModuleError::CallbackRequired));
    assert_eq!(err.to_string(), "Callback function required");
}

#[test]
fn test_require_with_passes_values_positionally() {
    let (loader, _sink) = recording_loader();
    loader.define("bar", |_, _| text("bar")).unwrap();
    loader
        .define_with("baz", ["bar"], |_, _| text("baz"))
        .unwrap();

    let mut received = Vec::new();
    loader.require_with(&["baz", "missing", "bar"], |values| {
        received = values.iter().map(as_text).collect();
    });

    assert_eq!(
        received,
        vec![Some("baz".to_string()), None, Some("bar".to_string())]
    );
}

#[test]
fn test_require_and_exports_sentinels() {
    let (loader, sink) = recording_loader();
    let inner = Trace::new();
    let record = inner.clone();

    loader
        .define_with("bar", ["require", "exports"], move |_, args| {
            let require = args.loader(0).unwrap();
            let baz = require.require_as::<String>("baz").unwrap();
            record.push(baz.as_str());

            args.exports(1)
                .unwrap()
                .set_default(into_value("bar".to_string()));
            Ok(None)
        })
        .unwrap();
    loader.define("baz", |_, _| text("baz")).unwrap();

    assert_eq!(as_text(&loader.require("bar")), Some("bar".to_string()));
    assert_eq!(inner.entries(), vec!["baz"]);
    assert!(sink.is_empty());
}

#[test]
fn test_require_sentinel_is_the_same_registry() {
    let (loader, _sink) = recording_loader();
    let outer = loader.clone();
    let matched = CallCounter::new();
    let m = matched.clone();

    loader
        .define_with("probe", [Prerequisite::SelfReference], move |_, args| {
            if args.loader(0).is_some_and(|l| l.ptr_eq(&outer)) {
                m.hit();
            }
            Ok(None)
        })
        .unwrap();

    loader.resolve();
    assert_eq!(matched.count(), 1);
}

#[test]
fn test_exports_without_default_define_the_container() {
    let (loader, _sink) = recording_loader();
    loader
        .define_with("m", ["exports"], |_, args| {
            let exports = args.exports(0).unwrap();
            exports.set("a", into_value(1u32));
            exports.set("b", into_value(2u32));
            text("ignored")
        })
        .unwrap();

    let value = loader.require("m").unwrap();
    let exports = downcast_value::<Exports>(&value).unwrap();
    assert_eq!(exports.keys(), vec!["a", "b"]);
    assert_eq!(
        *downcast_value::<u32>(&exports.get("b").unwrap()).unwrap(),
        2
    );
}

#[test]
fn test_missing_prerequisite_warns_once() {
    let (loader, sink) = recording_loader();
    let slots = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&slots);

    loader
        .define_with("bar", ["bogus"], move |_, args| {
            s.lock().push(args.len());
            assert!(matches!(args.get(0), Some(Argument::Value(None))));
            text("bar")
        })
        .unwrap();

    assert_eq!(as_text(&loader.require("bar")), Some("bar".to_string()));
    assert_eq!(
        sink.messages(),
        vec!["Module \"bar\" requires \"bogus\", but is undefined"]
    );
    assert_eq!(*slots.lock(), vec![1]);
}

#[test]
fn test_ignore_warnings_keeps_argument_slot() {
    let config = LoaderConfig {
        ignore_warnings: true,
        ..Default::default()
    };
    let (loader, sink) = recording_loader_with(&config);
    let slots = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&slots);

    loader
        .define_with("bar", ["bogus", "baz"], move |_, args| {
            s.lock().push(args.len());
            assert!(args.value(0).is_none());
            assert_eq!(args.downcast::<String>(1).unwrap().as_str(), "baz");
            text("bar")
        })
        .unwrap();
    loader.define("baz", |_, _| text("baz")).unwrap();

    assert!(loader.require("bar").is_some());
    assert!(sink.is_empty());
    assert_eq!(*slots.lock(), vec![2]);
}

#[test]
fn test_cycle_is_reported_and_every_unit_defined() {
    let (loader, sink) = recording_loader();
    loader.define_with("a", ["b"], |_, _| text("a")).unwrap();
    loader.define_with("b", ["c"], |_, _| text("b")).unwrap();
    loader
        .define_with("c", ["a"], |_, args| {
            assert!(args.value(0).is_none());
            text("c")
        })
        .unwrap();

    loader.resolve();

    let messages = sink.messages();
    assert_eq!(
        messages.first().map(String::as_str),
        Some("Recursive dependency between \"c\" and \"a\"")
    );
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Module \"c\" requires \"a\", but is undefined")
    );
    for name in ["a", "b", "c"] {
        assert_eq!(as_text(&loader.lookup(name)), Some(name.to_string()));
    }
}

#[test]
fn test_self_dependency_is_a_cycle() {
    let (loader, sink) = recording_loader();
    loader.define_with("loop", ["loop"], |_, _| text("loop")).unwrap();

    assert!(loader.require("loop").is_some());
    assert_eq!(
        sink.messages(),
        vec![
            "Recursive dependency between \"loop\" and \"loop\"",
            "Module \"loop\" requires \"loop\", but is undefined",
        ]
    );
}

#[test]
fn test_invalid_names_are_rejected() {
    let (loader, _sink) = recording_loader();

    for name in ["", "has space", "require", "exports", "tab\tname"] {
        let err = loader.define(name, |_, _| text("x")).unwrap_err();
        assert!(
            matches!(err, ModuleError::InvalidName { .. }),
            "{:?} should be rejected",
            name
        );
    }
    assert!(loader.records().is_empty());
}

#[test]
fn test_unit_runs_once_and_value_is_shared() {
    let (loader, _sink) = recording_loader();
    let counter = CallCounter::new();
    let calls = counter.clone();

    loader
        .define_with("x", Vec::<&str>::new(), move |_, _| {
            calls.hit();
            Ok(Some(into_value(vec![1u8, 2, 3])))
        })
        .unwrap();

    let first = loader.require("x").unwrap();
    let second = loader.require("x").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counter.count(), 1);

    loader
        .define_with("x", Vec::<&str>::new(), |_, _| text("replacement"))
        .unwrap();
    loader.define("x", |_, _| text("replacement")).unwrap();
    assert!(Arc::ptr_eq(&first, &loader.require("x").unwrap()));
    assert!(!loader.is_pending("x"));
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_undefined_value_counts_as_defined() {
    let (loader, sink) = recording_loader();
    loader.define("nothing", |_, _| Ok(None)).unwrap();
    loader
        .define_with("user", ["nothing"], |_, args| {
            assert!(args.value(0).is_none());
            text("user")
        })
        .unwrap();

    assert!(loader.require("user").is_some());
    assert!(loader.is_defined("nothing"));
    assert!(loader.lookup("nothing").is_none());
    assert!(sink.is_empty());
}

#[test]
fn test_re_registration_while_pending_replaces_unit() {
    let (loader, _sink) = recording_loader();
    loader
        .define_with("p", Vec::<&str>::new(), |_, _| text("first"))
        .unwrap();
    loader
        .define_with("p", Vec::<&str>::new(), |_, _| text("second"))
        .unwrap();

    assert_eq!(loader.pending_names(), vec!["p"]);
    assert_eq!(as_text(&loader.require("p")), Some("second".to_string()));
}

#[test]
fn test_immediate_define_supersedes_pending() {
    let (loader, _sink) = recording_loader();
    let counter = CallCounter::new();
    let calls = counter.clone();

    loader
        .define_with("p", ["never"], move |_, _| {
            calls.hit();
            text("deferred")
        })
        .unwrap();
    loader.define("p", |_, _| text("immediate")).unwrap();

    assert!(!loader.is_pending("p"));
    assert_eq!(as_text(&loader.require("p")), Some("immediate".to_string()));
    assert_eq!(counter.count(), 0);
}

#[test]
fn test_failed_initializer_leaves_unit_undefined() {
    let (loader, sink) = recording_loader();
    loader
        .define_with("bad", Vec::<&str>::new(), |_, _| anyhow::bail!("boom"))
        .unwrap();
    loader
        .define_with("user", ["bad"], |_, args| {
            assert!(args.value(0).is_none());
            text("user")
        })
        .unwrap();

    loader.resolve();

    assert!(!loader.is_defined("bad"));
    assert!(loader.is_defined("user"));
    assert_eq!(
        sink.messages(),
        vec!["Module \"user\" requires \"bad\", but is undefined"]
    );

    loader
        .define_with("bad", Vec::<&str>::new(), |_, _| text("fixed"))
        .unwrap();
    assert_eq!(as_text(&loader.require("bad")), Some("fixed".to_string()));
}

#[test]
fn test_ready_fires_once_when_settled() {
    let (loader, _sink) = recording_loader();
    let counter = CallCounter::new();
    let calls = counter.clone();

    loader.ready(move || calls.hit());
    loader.define_with("x", ["y"], |_, _| text("x")).unwrap();
    loader.define_with("y", Vec::<&str>::new(), |_, _| text("y")).unwrap();
    assert_eq!(counter.count(), 0);

    loader.resolve();
    assert_eq!(counter.count(), 1);

    loader.define_with("z", Vec::<&str>::new(), |_, _| text("z")).unwrap();
    loader.resolve();
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_ready_waits_for_units_registered_mid_pass() {
    let (loader, _sink) = recording_loader();
    let counter = CallCounter::new();
    let calls = counter.clone();

    loader.ready(move || calls.hit());
    loader
        .define_with("outer", ["require"], |_, args| {
            let loader = args.loader(0).unwrap();
            loader.define_with("late", Vec::<&str>::new(), |_, _| text("late"))?;
            text("outer")
        })
        .unwrap();

    loader.resolve();
    assert!(loader.is_defined("outer"));
    assert!(loader.is_pending("late"));
    assert!(loader.is_batch_armed());
    assert_eq!(counter.count(), 0);

    assert_eq!(as_text(&loader.require("late")), Some("late".to_string()));
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_error_callback_receives_failures() {
    let (loader, _sink) = recording_loader();
    let readies = CallCounter::new();
    let failures: Arc<Mutex<Vec<UnitFailure>>> = Arc::default();

    let r = readies.clone();
    let f = Arc::clone(&failures);
    loader.ready_with_error(move || r.hit(), move |failed| f.lock().extend_from_slice(failed));
    loader
        .define_with("bad", Vec::<&str>::new(), |_, _| anyhow::bail!("boom"))
        .unwrap();
    loader.define_with("good", Vec::<&str>::new(), |_, _| text("good")).unwrap();

    loader.resolve();

    assert_eq!(readies.count(), 0);
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "bad");
    assert!(failures[0].reason.contains("boom"));
}

#[test]
fn test_ready_fires_despite_failures_when_errors_not_surfaced() {
    let config = LoaderConfig {
        surface_errors: false,
        ..Default::default()
    };
    let (loader, _sink) = recording_loader_with(&config);
    let readies = CallCounter::new();
    let errors = CallCounter::new();

    let r = readies.clone();
    let e = errors.clone();
    loader.ready_with_error(move || r.hit(), move |_| e.hit());
    loader
        .define_with("bad", Vec::<&str>::new(), |_, _| anyhow::bail!("boom"))
        .unwrap();

    loader.resolve();
    assert_eq!(readies.count(), 1);
    assert_eq!(errors.count(), 0);
}

#[test]
fn test_ready_without_error_callback_fires_on_failure() {
    let (loader, _sink) = recording_loader();
    let readies = CallCounter::new();
    let r = readies.clone();

    loader.ready(move || r.hit());
    loader
        .define_with("bad", Vec::<&str>::new(), |_, _| anyhow::bail!("boom"))
        .unwrap();

    loader.resolve();
    assert_eq!(readies.count(), 1);
}

#[test]
fn test_clear_discards_everything() {
    let (loader, _sink) = recording_loader();
    let readies = CallCounter::new();
    let r = readies.clone();

    loader.ready(move || r.hit());
    loader.define("a", |_, _| text("a")).unwrap();
    loader.define_with("b", ["a"], |_, _| text("b")).unwrap();

    loader.clear();

    assert!(!loader.is_defined("a"));
    assert!(!loader.is_pending("b"));
    assert!(loader.records().is_empty());
    assert!(!loader.is_batch_armed());

    loader.resolve();
    assert_eq!(readies.count(), 0);

    loader.define("a", |_, _| text("again")).unwrap();
    assert_eq!(as_text(&loader.require("a")), Some("again".to_string()));
}

#[test]
fn test_clear_during_resolution_drops_stale_value() {
    let (loader, _sink) = recording_loader();
    let counter = CallCounter::new();
    let calls = counter.clone();

    loader
        .define_with("wipe", ["require"], |_, args| {
            args.loader(0).unwrap().clear();
            text("wipe")
        })
        .unwrap();
    loader
        .define_with("after", Vec::<&str>::new(), move |_, _| {
            calls.hit();
            text("after")
        })
        .unwrap();

    loader.resolve();

    assert!(!loader.is_defined("wipe"));
    assert!(!loader.is_defined("after"));
    assert!(loader.pending_names().is_empty());
    assert_eq!(counter.count(), 0);

    loader.define("wipe", |_, _| text("fresh")).unwrap();
    assert_eq!(as_text(&loader.require("wipe")), Some("fresh".to_string()));
}

#[test]
fn test_registration_after_mid_pass_clear_survives() {
    let (loader, sink) = recording_loader();
    loader.define_with("a", ["b", "c"], |_, _| text("a")).unwrap();
    loader
        .define_with("b", ["require"], |_, args| {
            let loader = args.loader(0).unwrap();
            loader.clear();
            loader.define_with("c", Vec::<&str>::new(), |_, _| text("fresh"))?;
            text("b")
        })
        .unwrap();
    loader
        .define_with("c", Vec::<&str>::new(), |_, _| text("stale"))
        .unwrap();

    loader.resolve();

    assert_eq!(loader.pending_names(), vec!["c"]);
    assert!(!loader.is_defined("a"));
    assert!(!loader.is_defined("b"));

    let readies = CallCounter::new();
    let r = readies.clone();
    loader.ready(move || r.hit());
    loader
        .define_with("d", ["c"], |_, args| {
            assert_eq!(args.downcast::<String>(0).unwrap().as_str(), "fresh");
            text("d")
        })
        .unwrap();

    assert_eq!(as_text(&loader.require("d")), Some("d".to_string()));
    assert_eq!(as_text(&loader.lookup("c")), Some("fresh".to_string()));
    assert!(sink.is_empty());
    assert_eq!(readies.count(), 1);
}

#[test]
fn test_panicking_initializer_is_a_failure() {
    let (loader, _sink) = recording_loader();
    let failures: Arc<Mutex<Vec<UnitFailure>>> = Arc::default();
    let f = Arc::clone(&failures);
    loader.ready_with_error(|| {}, move |failed| f.lock().extend_from_slice(failed));

    loader
        .define_with("explodes", Vec::<&str>::new(), |_, _| panic!("kaboom"))
        .unwrap();
    loader
        .define_with("user", ["explodes"], |_, _| text("user"))
        .unwrap();
    loader
        .define_with("bystander", Vec::<&str>::new(), |_, _| text("bystander"))
        .unwrap();

    loader.resolve();

    assert!(!loader.is_defined("explodes"));
    assert!(loader.is_defined("user"));
    assert!(loader.is_defined("bystander"));
    assert!(loader.pending_names().is_empty());

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "explodes");
    assert!(failures[0].reason.contains("kaboom"));
}

#[test]
fn test_dependency_closure_follows_records() {
    let (loader, _sink) = recording_loader();
    loader
        .define_with("app", ["db", "require", "log"], |_, _| text("app"))
        .unwrap();
    loader.define_with("db", ["log"], |_, _| text("db")).unwrap();
    loader.define("log", |_, _| text("log")).unwrap();
    loader.define("unrelated", |_, _| text("x")).unwrap();

    assert_eq!(loader.dependency_closure(&["app"]), vec!["app", "db", "log"]);
    assert_eq!(loader.dependency_closure(&["db"]), vec!["db", "log"]);
    assert_eq!(loader.dependency_closure(&["ghost"]), vec!["ghost"]);
}

#[test]
fn test_records_keep_first_registration_order() {
    let (loader, _sink) = recording_loader();
    loader.define_with("b", ["a"], |_, _| text("b")).unwrap();
    loader.define("a", |_, _| text("a")).unwrap();

    let names: Vec<String> = loader.records().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(loader.record("a").unwrap().prerequisites, None);
    assert_eq!(
        loader.record("b").unwrap().prerequisites,
        Some(vec![Prerequisite::named("a")])
    );
}
