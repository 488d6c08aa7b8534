//! Tests for configuration validation.

use kiln_config::{
    load, ConfigError, Environment, PipelineKind, RawConfig, RouteSpec, HMR_PIPELINE_ID,
};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn raw(value: serde_json::Value) -> RawConfig {
    RawConfig::from_value(value).expect("raw config")
}

fn project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("prod")).unwrap();
    fs::write(dir.path().join("prod/index.html"), "<html></html>").unwrap();
    dir
}

#[test]
fn loads_original_style_declaration() {
    let dir = project();
    let cfg = raw(json!({
        "environment": "development",
        "js": [{
            "input": "doc/src/test.js",
            "output": "doc/public/test.js",
            "sourcemap": true,
            "html": [{ "filename": "./../dynamic.html" }]
        }],
        "css": [{
            "input": "doc/src/styles.scss",
            "output": "doc/public/styles.css",
            "sourcemap": true
        }],
        "devServer": {
            "hostname": "localhost",
            "port": 3000,
            "publicDir": "prod",
            "publicPath": "/assets/js/",
            "routes": [{ "uri": "/", "file": "prod/index.html" }],
            "useHotModuleReplacement": true,
            "hotModuleBuild": {
                "input": "src/javascript/app.tsx",
                "output": "prod/assets/js/app.js",
                "sourcemap": true
            }
        }
    }));

    let config = load(&cfg, dir.path()).expect("valid config");
    let root = dir.path();

    assert_eq!(config.build.environment, Environment::Development);
    assert_eq!(config.build.pipelines.len(), 2);

    let js = &config.build.pipelines[0];
    assert_eq!(js.id.as_str(), "js:0");
    assert_eq!(js.kind, PipelineKind::Script);
    assert_eq!(js.input, root.join("doc/src/test.js"));
    assert_eq!(js.html_targets, vec![root.join("doc/dynamic.html")]);

    let css = &config.build.pipelines[1];
    assert_eq!(css.id.as_str(), "css:0");
    assert_eq!(css.kind, PipelineKind::Stylesheet);

    let dev = config.dev_server.as_ref().expect("dev server");
    assert_eq!(dev.port, 3000);
    assert_eq!(dev.public_dir, root.join("prod"));
    assert_eq!(dev.public_path, "/assets/js/");
    assert!(matches!(dev.routes[0], RouteSpec::StaticFile { .. }));

    let entry = config.hmr_entry().expect("hmr entry");
    assert_eq!(entry.id.as_str(), HMR_PIPELINE_ID);
    assert_eq!(config.all_pipelines().len(), 3);
}

#[test]
fn missing_required_field_is_reported() {
    let err = load(&raw(json!({ "js": [{ "input": "a.js" }] })), "/project").unwrap_err();
    match err {
        ConfigError::MissingField { field } => assert_eq!(field, "js[0].output"),
        other => panic!("expected MissingField, got {other:?}"),
    }

    let err = load(
        &raw(json!({ "devServer": { "hostname": "localhost", "publicDir": "p" } })),
        "/project",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingField { field } if field == "devServer.port"));
}

#[test]
fn port_out_of_range_is_rejected() {
    for port in [0, 65536, -1] {
        let cfg = raw(json!({
            "devServer": { "hostname": "localhost", "port": port, "publicDir": "/srv" }
        }));
        let err = load(&cfg, "/project").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidPort { port: p } if p == port),
            "port {port} should be rejected"
        );
    }

    let cfg = raw(json!({
        "devServer": { "hostname": "localhost", "port": 65535, "publicDir": "/srv" }
    }));
    assert!(load(&cfg, "/project").is_ok());
}

#[test]
fn route_to_missing_file_is_rejected() {
    let dir = project();
    let cfg = raw(json!({
        "devServer": {
            "hostname": "localhost",
            "port": 3000,
            "publicDir": "prod",
            "routes": [{ "uri": "/", "file": "prod/nope.html" }]
        }
    }));

    let err = load(&cfg, dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::RouteFileNotFound { uri, .. } if uri == "/"));
}

#[test]
fn route_to_unbuilt_output_is_exempt() {
    let dir = project();
    let cfg = raw(json!({
        "js": [{
            "input": "src/app.js",
            "output": "prod/assets/app.js",
            "html": [{ "filename": "../app.html" }]
        }],
        "devServer": {
            "hostname": "localhost",
            "port": 3000,
            "publicDir": "prod",
            "routes": [
                { "uri": "/app/*", "file": "prod/app.html" },
                { "uri": "/bundle", "file": "prod/assets/app.js" }
            ]
        }
    }));

    let config = load(&cfg, dir.path()).expect("exempt routes");
    let dev = config.dev_server.unwrap();
    assert!(matches!(dev.routes[0], RouteSpec::WildcardFallback { .. }));
    assert_eq!(dev.routes[0].file(), dir.path().join("prod/app.html"));
}

#[test]
fn hmr_enabled_without_entry_is_rejected() {
    let cfg = raw(json!({
        "devServer": {
            "hostname": "localhost",
            "port": 3000,
            "publicDir": "/srv",
            "useHotModuleReplacement": true
        }
    }));
    assert!(matches!(load(&cfg, "/project"), Err(ConfigError::HmrEntryMissing)));
}

#[test]
fn hmr_entry_reuses_matching_script_pipeline() {
    let cfg = raw(json!({
        "js": [{ "input": "src/app.js", "output": "public/app.js" }],
        "devServer": {
            "hostname": "localhost",
            "port": 3000,
            "publicDir": "public",
            "useHotModuleReplacement": true,
            "hotModuleBuild": { "input": "src/app.js", "output": "public/app.js" }
        }
    }));

    let config = load(&cfg, "/project").unwrap();
    assert_eq!(config.hmr_entry().unwrap().id.as_str(), "js:0");
    assert_eq!(config.all_pipelines().len(), 1);
}

#[test]
fn duplicate_outputs_are_rejected() {
    let cfg = raw(json!({
        "js": [{ "input": "src/a.js", "output": "public/app.js" }],
        "css": [{ "input": "src/a.css", "output": "public/app.js" }]
    }));
    assert!(matches!(
        load(&cfg, "/project"),
        Err(ConfigError::InvalidValue { .. })
    ));
}

#[test]
fn unknown_environment_is_rejected() {
    let cfg = raw(json!({ "environment": "staging" }));
    assert!(matches!(
        load(&cfg, "/project"),
        Err(ConfigError::InvalidValue { field, .. }) if field == "environment"
    ));
}

#[test]
fn zero_workers_is_rejected() {
    let cfg = raw(json!({ "workers": 0 }));
    assert!(load(&cfg, "/project").is_err());

    let cfg = raw(json!({ "workers": 3 }));
    assert_eq!(load(&cfg, "/project").unwrap().build.workers, 3);
}

#[test]
fn absolute_paths_are_kept_and_cleaned() {
    let cfg = raw(json!({
        "css": [{ "input": "/abs/src/../styles/main.css", "output": "out/main.css" }]
    }));
    let config = load(&cfg, "/project").unwrap();
    let css = &config.build.pipelines[0];
    assert_eq!(css.input, PathBuf::from("/abs/styles/main.css"));
    assert_eq!(css.output, PathBuf::from("/project/out/main.css"));
}
