// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader integration tests
//!
//! Resources come from a [`MemoryLoader`] and run on a paused tokio clock, so
//! delays and timeouts are exact and nothing actually waits.

use spacey_amd::{
    ConfigUpdate, Definition, Function, Loader, LoaderError, MemoryLoader, Mode, ModuleSpec,
    RecordingHost, Resource, Value,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn value(v: &str) -> Resource {
    Resource::define(Definition::new().value(v))
}

fn text(v: &Value) -> &str {
    v.as_str().unwrap_or("<not a string>")
}

#[tokio::test(start_paused = true)]
async fn test_require_preserves_order() {
    let resources = MemoryLoader::new()
        .with("slow.js", value("slow").with_delay(Duration::from_millis(300)))
        .with("fast.js", value("fast").with_delay(Duration::from_millis(10)));
    let loader = Loader::new(resources);

    let values = loader.require(["slow", "fast"]).await.unwrap();
    assert_eq!(values, vec![Value::from("slow"), Value::from("fast")]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_share_one_load() {
    let resources = MemoryLoader::new()
        .with("shared.js", value("shared").with_delay(Duration::from_millis(50)));
    let loader = Loader::new(resources.clone());

    let (first, second) = tokio::join!(loader.require(["shared"]), loader.require(["shared"]));
    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(resources.request_count("shared.js"), 1);

    // Resolved modules are served from the cache
    loader.require(["shared"]).await.unwrap();
    assert_eq!(resources.request_count("shared.js"), 1);
    assert!(loader.is_resolved("shared"));
}

#[tokio::test(start_paused = true)]
async fn test_dependencies_resolve_relative_to_module() {
    let resources = MemoryLoader::new()
        .with(
            "app/main.js",
            Resource::define(
                Definition::new()
                    .dependencies(["./util", "../lib/format"])
                    .factory(|args| {
                        let util = args.get(0);
                        let format = args.get(1);
                        Ok(Value::from(format!(
                            "{}+{}",
                            util.as_str().unwrap_or(""),
                            format.as_str().unwrap_or("")
                        )))
                    }),
            ),
        )
        .with("app/util.js", value("util"))
        .with("lib/format.js", value("format"));
    let loader = Loader::new(resources);

    let main = loader.require_one("app/main").await.unwrap();
    assert_eq!(text(&main), "util+format");
    assert!(loader.is_resolved("app/util"));
    assert!(loader.is_resolved("lib/format"));
}

#[tokio::test(start_paused = true)]
async fn test_shared_dependency_loads_once() {
    let resources = MemoryLoader::new()
        .with(
            "a.js",
            Resource::define(Definition::new().dependencies(["common"]).value("a")),
        )
        .with(
            "b.js",
            Resource::define(Definition::new().dependencies(["common"]).value("b")),
        )
        .with("common.js", value("common").with_delay(Duration::from_millis(100)));
    let loader = Loader::new(resources.clone());

    let values = loader.require(["a", "b"]).await.unwrap();
    assert_eq!(values, vec![Value::from("a"), Value::from("b")]);
    assert_eq!(resources.request_count("common.js"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_walks_fallbacks() {
    let resources = MemoryLoader::new()
        .with("primary.js", Resource::hang())
        .with("secondary.js", Resource::fail("503 Service Unavailable"))
        .with("tertiary.js", value("lib"));
    let loader = Loader::new(resources.clone());
    loader
        .configure(
            ConfigUpdate::new()
                .timeout(1500)
                .module("lib", ModuleSpec::with_fallbacks("primary", ["secondary", "tertiary"])),
        )
        .unwrap();

    let start = Instant::now();
    let lib = loader.require_one("lib").await.unwrap();
    assert_eq!(text(&lib), "lib");
    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert!(start.elapsed() < Duration::from_millis(1600));

    assert_eq!(resources.requests(), vec!["primary.js", "secondary.js", "tertiary.js"]);
    assert_eq!(resources.released(), vec!["primary.js", "secondary.js", "tertiary.js"]);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_gets_its_own_timer() {
    let resources = MemoryLoader::new()
        .with("primary.js", Resource::hang())
        .with("secondary.js", value("secondary").with_delay(Duration::from_millis(900)));
    let loader = Loader::new(resources);
    loader
        .configure(
            ConfigUpdate::new()
                .timeout(1000)
                .module("lib", ModuleSpec::with_fallbacks("primary", ["secondary"])),
        )
        .unwrap();

    let start = Instant::now();
    let lib = loader.require_one("lib").await.unwrap();
    assert_eq!(text(&lib), "secondary");
    assert!(start.elapsed() >= Duration::from_millis(1900));
}

#[tokio::test(start_paused = true)]
async fn test_late_success_of_superseded_attempt_is_ignored() {
    let resources = MemoryLoader::new()
        .with("primary.js", value("late").with_delay(Duration::from_millis(2500)))
        .with("secondary.js", value("fallback"));
    let loader = Loader::new(resources.clone());
    loader
        .configure(
            ConfigUpdate::new()
                .timeout(1000)
                .module("lib", ModuleSpec::with_fallbacks("primary", ["secondary"])),
        )
        .unwrap();

    let lib = loader.require_one("lib").await.unwrap();
    assert_eq!(text(&lib), "fallback");

    // Let the superseded attempt finish and define its module
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(loader.get("lib").unwrap(), Value::from("fallback"));
    assert_eq!(resources.request_count("primary.js"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_dependencies_resolve_next_to_loaded_copy() {
    let resources = MemoryLoader::new()
        .with("cdn/m.js", Resource::fail("503"))
        .with(
            "local/m.js",
            Resource::define(
                Definition::new()
                    .dependencies(["./dep"])
                    .factory(|args| Ok(args.get(0))),
            ),
        )
        .with("local/dep.js", value("local dep"));
    let loader = Loader::new(resources.clone());
    loader
        .configure(ConfigUpdate::new().module("m", ModuleSpec::with_fallbacks("cdn/m", ["local/m"])))
        .unwrap();

    let m = loader.require_one("m").await.unwrap();
    assert_eq!(text(&m), "local dep");
    assert_eq!(resources.requests(), vec!["cdn/m.js", "local/m.js", "local/dep.js"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_fallbacks() {
    let resources = MemoryLoader::new().with("primary.js", Resource::fail("500"));
    let loader = Loader::new(resources);
    loader
        .configure(ConfigUpdate::new().module("lib", ModuleSpec::with_fallbacks("primary", ["missing"])))
        .unwrap();

    let err = loader.require(["lib"]).await.unwrap_err();
    match err {
        LoaderError::LoadExhausted { id, attempts, reason } => {
            assert_eq!(id, "lib");
            assert_eq!(attempts, vec!["primary.js", "missing.js"]);
            assert!(reason.contains("404"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failure_is_remembered() {
    let resources = MemoryLoader::new().with("broken.js", Resource::fail("500"));
    let loader = Loader::new(resources.clone());

    let first = loader.require(["broken"]).await.unwrap_err();
    let second = loader.require(["broken"]).await.unwrap_err();
    assert_eq!(first, second);
    assert_eq!(resources.request_count("broken.js"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_configure_timeout_floor() {
    let resources = MemoryLoader::new().with("stuck.js", Resource::hang());
    let loader = Loader::new(resources);

    let err = loader.configure(ConfigUpdate::new().timeout(500)).unwrap_err();
    assert_eq!(
        err,
        LoaderError::TimeoutTooLow {
            requested: 500,
            minimum: 1000
        }
    );
    assert_eq!(loader.config().timeout, Duration::from_millis(7000));

    loader.configure(ConfigUpdate::new().timeout(1500)).unwrap();
    assert_eq!(loader.config().timeout, Duration::from_millis(1500));

    let start = Instant::now();
    let err = loader.require(["stuck"]).await.unwrap_err();
    assert_eq!(err.kind(), "LoadExhausted");
    assert!(start.elapsed() >= Duration::from_millis(1500));
    assert!(start.elapsed() < Duration::from_millis(1600));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_configuration_is_not_applied() {
    let loader = Loader::new(MemoryLoader::new());

    let update = ConfigUpdate::new()
        .base_url("/static")
        .timeout(10)
        .module("lib", "vendor/lib");
    assert!(loader.configure(update).is_err());

    let config = loader.config();
    assert_eq!(config.base_url, None);
    assert_eq!(loader.plan("lib").unwrap()[0].path, "lib.js");
}

#[tokio::test(start_paused = true)]
async fn test_definition_missing() {
    let resources = MemoryLoader::new().with("silent.js", Resource::empty());
    let loader = Loader::new(resources);

    let err = loader.require(["silent"]).await.unwrap_err();
    assert_eq!(
        err,
        LoaderError::DefinitionMissing {
            id: "silent".to_string(),
            path: "silent.js".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_definition_duplicate() {
    let resources = MemoryLoader::new().with(
        "twice.js",
        Resource::execute(|attempt| {
            attempt.define(Definition::new().value(1.0));
            attempt.define(Definition::new().value(2.0));
        }),
    );
    let loader = Loader::new(resources);

    let err = loader.require(["twice"]).await.unwrap_err();
    assert_eq!(
        err,
        LoaderError::DefinitionDuplicate {
            id: "twice".to_string(),
            count: 2
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_path_mismatch() {
    let resources =
        MemoryLoader::new().with("a.js", value("a").reporting_path("somewhere/else.js"));
    let loader = Loader::new(resources);

    let err = loader.require(["a"]).await.unwrap_err();
    assert_eq!(
        err,
        LoaderError::PathMismatch {
            id: "a".to_string(),
            expected: "a.js".to_string(),
            actual: "somewhere/else.js".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_factory() {
    let resources = MemoryLoader::new().with(
        "empty.js",
        Resource::define(Definition::new().dependencies(["x"])),
    );
    let loader = Loader::new(resources);

    let err = loader.require(["empty"]).await.unwrap_err();
    assert_eq!(err, LoaderError::MissingFactory { id: None });
}

#[tokio::test(start_paused = true)]
async fn test_factory_error_propagates() {
    let resources = MemoryLoader::new().with(
        "bad.js",
        Resource::define(
            Definition::new().factory(|args| Err(LoaderError::factory(args.id, "boom"))),
        ),
    );
    let loader = Loader::new(resources);

    let err = loader.require(["bad"]).await.unwrap_err();
    assert_eq!(err, LoaderError::factory("bad", "boom"));
}

#[tokio::test(start_paused = true)]
async fn test_synchronous_lookup() {
    let resources = MemoryLoader::new().with("later.js", value("later"));
    let loader = Loader::new(resources.clone());

    let err = loader.get("later").unwrap_err();
    assert_eq!(err, LoaderError::SynchronousLookupUnresolved("later".to_string()));
    assert!(resources.requests().is_empty());

    loader.require(["later"]).await.unwrap();
    assert_eq!(loader.require_sync(["later"]).unwrap(), vec![Value::from("later")]);
}

#[tokio::test(start_paused = true)]
async fn test_commonjs_exports() {
    let source = r#"function (require, exports, module) {
        var helper = require('./helper');
        exports.greeting = helper.prefix + ' world';
    }"#;

    let resources = MemoryLoader::new()
        .with(
            "app/greeter.js",
            Resource::define(Definition::new().source(source).factory(|args| {
                let helper = args.require.get("./helper")?;
                let prefix = helper
                    .as_object()
                    .and_then(|helper| helper.get("prefix"))
                    .unwrap_or_default();
                args.exports.set(
                    "greeting",
                    format!("{} world", prefix.as_str().unwrap_or("")),
                );
                Ok(Value::Undefined)
            })),
        )
        .with(
            "app/helper.js",
            Resource::define(Definition::new().factory(|args| {
                args.exports.set("prefix", "hello");
                Ok(Value::Undefined)
            })),
        );
    let loader = Loader::new(resources.clone());

    let greeter = loader.require_one("app/greeter").await.unwrap();
    let greeting = greeter.as_object().and_then(|o| o.get("greeting")).unwrap();
    assert_eq!(greeting, Value::from("hello world"));
    assert_eq!(resources.request_count("app/helper.js"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_commonjs_module_exports_replacement() {
    let resources = MemoryLoader::new().with(
        "answer.js",
        Resource::define(Definition::new().factory(|args| {
            args.module.set("exports", 42.0);
            Ok(Value::Undefined)
        })),
    );
    let loader = Loader::new(resources);

    assert_eq!(loader.require_one("answer").await.unwrap(), Value::Number(42.0));
}

#[tokio::test(start_paused = true)]
async fn test_undefined_factory_result_is_null() {
    let resources = MemoryLoader::new()
        .with(
            "quiet.js",
            Resource::define(
                Definition::new()
                    .dependencies(Vec::<String>::new())
                    .factory(|_| Ok(Value::Undefined)),
            ),
        )
        .with(
            "filler.js",
            Resource::define(
                Definition::new()
                    .dependencies(["exports"])
                    .factory(|args| {
                        args.exports.set("filled", true);
                        Ok(Value::Undefined)
                    }),
            ),
        );
    let loader = Loader::new(resources);

    assert_eq!(loader.require_one("quiet").await.unwrap(), Value::Null);
    assert_eq!(loader.get("quiet").unwrap(), Value::Null);

    let filler = loader.require_one("filler").await.unwrap();
    assert_eq!(
        filler.as_object().and_then(|o| o.get("filled")),
        Some(Value::Boolean(true))
    );
}

#[tokio::test(start_paused = true)]
async fn test_configure_hook_replaces_value() {
    let resources = MemoryLoader::new()
        .with("lib.js", value("raw"))
        .with("kept.js", value("kept"));
    let loader = Loader::new(resources);

    let wrap = Function::new("wrap", |args: &[Value]| {
        let raw = args.first().and_then(Value::as_str).unwrap_or("");
        Ok(Value::from(format!("wrapped {}", raw)))
    });
    let observe = Function::new("observe", |_: &[Value]| Ok(Value::Undefined));
    loader
        .configure(
            ConfigUpdate::new()
                .module("lib", ModuleSpec::path("lib").configure(wrap))
                .module("kept", ModuleSpec::path("kept").configure(observe)),
        )
        .unwrap();

    assert_eq!(text(&loader.require_one("lib").await.unwrap()), "wrapped raw");
    assert_eq!(text(&loader.get("lib").unwrap()), "wrapped raw");

    // A hook returning undefined keeps the loaded value
    assert_eq!(text(&loader.require_one("kept").await.unwrap()), "kept");
}

#[tokio::test(start_paused = true)]
async fn test_stylesheet_resolves_to_true() {
    let resources = MemoryLoader::new().with("theme/dark.css", Resource::empty());
    let loader = Loader::new(resources.clone());

    let theme = loader.require_one("css!theme/dark").await.unwrap();
    assert_eq!(theme, Value::Boolean(true));
    assert_eq!(resources.requests(), vec!["theme/dark.css"]);
}

#[tokio::test(start_paused = true)]
async fn test_stylesheet_extra_dependencies() {
    let resources = MemoryLoader::new()
        .with("widgets.css", Resource::empty())
        .with("base.css", Resource::empty().with_delay(Duration::from_millis(20)));
    let loader = Loader::new(resources.clone());
    loader
        .configure(ConfigUpdate::new().dependency("css!widgets", ["css!base"]))
        .unwrap();

    loader.require(["css!widgets"]).await.unwrap();
    assert!(loader.is_resolved("css!base"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_resource_kind() {
    let loader = Loader::new(MemoryLoader::new());

    let err = loader.require(["tpl!page"]).await.unwrap_err();
    assert_eq!(err, LoaderError::InvalidResourceKind("tpl".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_circular_dependency() {
    let resources = MemoryLoader::new()
        .with("a.js", Resource::define(Definition::new().dependencies(["b"]).value("a")))
        .with("b.js", Resource::define(Definition::new().dependencies(["a"]).value("b")));
    let loader = Loader::new(resources);

    let err = loader.require(["a"]).await.unwrap_err();
    assert_eq!(err.kind(), "CircularDependency");
}

#[tokio::test(start_paused = true)]
async fn test_configured_value_needs_no_load() {
    let resources = MemoryLoader::new();
    let loader = Loader::new(resources.clone());
    loader
        .configure(ConfigUpdate::new().module("config", ModuleSpec::value("ready")))
        .unwrap();

    assert_eq!(loader.require_one("config").await.unwrap(), Value::from("ready"));
    assert!(resources.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_inline_named_define() {
    let resources = MemoryLoader::new().with("dep.js", value("dep"));
    let loader = Loader::new(resources.clone());

    loader
        .define(
            Definition::named("inline")
                .dependencies(["dep"])
                .factory(|args| Ok(args.get(0))),
        )
        .unwrap();
    assert_eq!(
        loader.define(Definition::new().value(1.0)),
        Err(LoaderError::AnonymousDefinition)
    );

    assert_eq!(loader.require_one("inline").await.unwrap(), Value::from("dep"));
    assert_eq!(resources.requests(), vec!["dep.js"]);
}

#[tokio::test(start_paused = true)]
async fn test_named_definition_registers_alias() {
    let resources = MemoryLoader::new().with(
        "vendor/jquery.js",
        Resource::define(Definition::named("jquery").value("$")),
    );
    let loader = Loader::new(resources);

    loader.require(["vendor/jquery"]).await.unwrap();
    assert_eq!(loader.get("jquery").unwrap(), Value::from("$"));
}

#[tokio::test(start_paused = true)]
async fn test_rewrite_and_base_url() {
    let resources = MemoryLoader::new()
        .with("/static/app.js?v=7", value("app"))
        .with("https://cdn.example/jquery.js", value("jq"));
    let loader = Loader::new(resources.clone());
    loader
        .configure(
            ConfigUpdate::new()
                .base_url("/static/")
                .parameter("bust", "7")
                .rewrite("app", "{path}?v={bust}")
                .module("jquery", "https://cdn.example/jquery"),
        )
        .unwrap();

    let values = loader.require(["app", "jquery"]).await.unwrap();
    assert_eq!(values, vec![Value::from("app"), Value::from("jq")]);
}

#[tokio::test(start_paused = true)]
async fn test_require_with_callback() {
    let resources = MemoryLoader::new().with("a.js", value("a"));
    let loader = Loader::new(resources);
    let (tx, rx) = tokio::sync::oneshot::channel();

    loader.require_with(["a"], move |result| {
        let _ = tx.send(result);
    });

    assert_eq!(rx.await.unwrap().unwrap(), vec![Value::from("a")]);
}

#[tokio::test(start_paused = true)]
async fn test_production_redirects_once() {
    let host = Arc::new(RecordingHost::at("https://site.example/app"));
    let loader = Loader::builder(MemoryLoader::new())
        .host(Arc::clone(&host))
        .build();
    loader
        .configure(
            ConfigUpdate::new()
                .mode(Mode::Production)
                .on_error("/error.html"),
        )
        .unwrap();

    assert!(loader.require(["missing"]).await.is_err());
    assert_eq!(
        host.navigations(),
        vec!["/error.html?amd-error=1&kind=LoadExhausted"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_development_does_not_redirect() {
    let host = Arc::new(RecordingHost::at("https://site.example/app"));
    let loader = Loader::builder(MemoryLoader::new())
        .host(Arc::clone(&host))
        .build();
    loader
        .configure(
            ConfigUpdate::new()
                .mode(Mode::Development)
                .on_error("/error.html"),
        )
        .unwrap();

    assert!(loader.require(["missing"]).await.is_err());
    assert!(host.navigations().is_empty());
}
