//! Tests for tiera-datasource: registry, descriptors, and builtin datasources against real files

use serde_json::json;
use tiera_core::{CascadeMode, Error, OptionBag, RequestContext};
use tiera_datasource::*;

fn bag(v: serde_json::Value) -> OptionBag {
    serde_json::from_value(v).unwrap()
}

/// Drive a datasource the way the engine does, until it closes.
async fn drain(ds: &mut Box<dyn Datasource>, req: &RequestContext, mode: CascadeMode) -> AnswerChannel {
    let mut ch = AnswerChannel::new(mode);
    while ch.wants_more() {
        ch.begin_cycle();
        ds.lookup(req, &mut ch).await.unwrap();
    }
    ch
}

// ===========================================================================
// Registry
// ===========================================================================

#[test]
fn default_registry_has_builtins() {
    let reg = create_default_registry().unwrap();
    assert_eq!(reg.list(), vec!["file", "memory"]);
    assert_eq!(reg.len(), 2);
    assert!(!reg.is_empty());
}

#[test]
fn descriptors_declare_options() {
    let reg = create_default_registry().unwrap();
    for d in reg.descriptors() {
        assert!(!d.description().is_empty());
        assert!(d.options().iter().any(|o| o.required), "{} has no required option", d.id());
    }
    let file = reg.resolve("file").unwrap();
    let names: Vec<&str> = file.options().iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["files", "format", "docroot"]);
}

#[test]
fn registering_a_builtin_twice_fails() {
    let mut reg = create_default_registry().unwrap();
    let err = reg.register(datasources::file::descriptor()).unwrap_err();
    assert!(matches!(err, Error::DuplicateDatasource(ref id) if id == "file"));
}

#[test]
fn file_requires_an_array_of_files() {
    let reg = create_default_registry().unwrap();
    let file = reg.resolve("file").unwrap();
    let err = file
        .validate_options(&bag(json!({"files": "/etc/tiera/global.json"})))
        .unwrap_err();
    match err {
        Error::Validation { datasource, option, reason } => {
            assert_eq!(datasource, "file");
            assert_eq!(option, "files");
            assert!(reason.contains("array"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn file_rejects_unknown_format() {
    let reg = create_default_registry().unwrap();
    let file = reg.resolve("file").unwrap();
    let err = file
        .validate_options(&bag(json!({"files": [], "format": "toml"})))
        .unwrap_err();
    assert!(matches!(err, Error::Validation { ref option, .. } if option == "format"));
}

// ===========================================================================
// Builtins through their descriptors
// ===========================================================================

#[tokio::test]
async fn file_first_match_stops_wanting_after_first_hit() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("env.json"), r#"{"prod": {"color": "blue"}}"#).unwrap();
    std::fs::write(
        tmp.path().join("global.json"),
        r#"{"prod": {"color": "red", "size": "M"}}"#,
    )
    .unwrap();

    let reg = create_default_registry().unwrap();
    let file = reg.resolve("file").unwrap();
    let options = file
        .validate_options(&bag(json!({
            "files": ["env.json", "global.json"],
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();

    let mut ds = file.configure(&options).unwrap();
    let ch = drain(&mut ds, &RequestContext::new("color", "prod"), CascadeMode::FirstMatch).await;
    assert_eq!(ch.answers(), &[json!("blue")]);
    assert_eq!(ch.cycle(), 1);
    assert!(!ch.is_closed());

    let mut ds = file.configure(&options).unwrap();
    let ch = drain(&mut ds, &RequestContext::new("size", "prod"), CascadeMode::FirstMatch).await;
    assert_eq!(ch.answers(), &[json!("M")]);
    assert_eq!(ch.cycle(), 2);
}

#[tokio::test]
async fn file_merge_collects_every_document() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a.json"), r#"{"web": {"ports": [80]}}"#).unwrap();
    std::fs::write(tmp.path().join("b.json"), r#"{"web": {"ports": [443]}}"#).unwrap();

    let reg = create_default_registry().unwrap();
    let file = reg.resolve("file").unwrap();
    let options = file
        .validate_options(&bag(json!({
            "files": ["a.json", "b.json"],
            "docroot": tmp.path().to_str().unwrap()
        })))
        .unwrap();
    let mut ds = file.configure(&options).unwrap();
    let ch = drain(&mut ds, &RequestContext::new("ports", "web"), CascadeMode::Merge).await;
    assert!(ch.is_closed());
    assert_eq!(ch.into_answers(), vec![json!([80]), json!([443])]);
}

#[tokio::test]
async fn memory_misses_cleanly() {
    let reg = create_default_registry().unwrap();
    let memory = reg.resolve("memory").unwrap();
    let options = memory
        .validate_options(&bag(json!({"data": {"prod": {"color": "blue"}}})))
        .unwrap();
    let mut ds = memory.configure(&options).unwrap();
    let ch = drain(&mut ds, &RequestContext::new("color", "dev"), CascadeMode::FirstMatch).await;
    assert!(ch.is_closed());
    assert!(ch.answers().is_empty());
}
