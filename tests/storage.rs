//! Sqlite store round-trip tests.

use tempfile::TempDir;

use pkgwatch::storage::{PackageRecord, PackageStore, SqliteStore};

fn test_store() -> (TempDir, SqliteStore) {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::new(&dir.path().join("packages.db")).unwrap();
    (dir, store)
}

fn record(name: &str) -> PackageRecord {
    PackageRecord {
        name: name.into(),
        reference_version: Some("1.0.0".into()),
        upstream_version: None,
        upstream_url: Some(format!("https://example.com/{name}")),
        strategy_hint: None,
        extract_key: None,
        check_test_versions: false,
    }
}

#[test]
fn upsert_then_get_round_trips() {
    let (_dir, store) = test_store();
    let original = record("widget");
    store.upsert(&original).unwrap();

    let loaded = store.get_by_name("widget").unwrap().unwrap();
    assert_eq!(loaded, original);
    assert!(store.get_by_name("ghost").unwrap().is_none());
}

#[test]
fn upsert_replaces_on_name_conflict() {
    let (_dir, store) = test_store();
    store.upsert(&record("widget")).unwrap();

    let mut updated = record("widget");
    updated.reference_version = Some("2.0.0".into());
    updated.check_test_versions = true;
    store.upsert(&updated).unwrap();

    let loaded = store.get_by_name("widget").unwrap().unwrap();
    assert_eq!(loaded.reference_version.as_deref(), Some("2.0.0"));
    assert!(loaded.check_test_versions);
    assert_eq!(store.all_names().unwrap().len(), 1);
}

#[test]
fn get_many_skips_missing_names() {
    let (_dir, store) = test_store();
    store.upsert(&record("alpha")).unwrap();
    store.upsert(&record("beta")).unwrap();

    let names: Vec<String> = ["alpha", "ghost", "beta"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let records = store.get_many(&names).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.contains_key("alpha"));
    assert!(records.contains_key("beta"));
}

#[test]
fn version_updates_touch_only_their_column() {
    let (_dir, store) = test_store();
    store.upsert(&record("widget")).unwrap();

    assert_eq!(store.update_upstream_version("widget", "1.2.0").unwrap(), 1);
    assert_eq!(store.update_reference_version("widget", "1.1.0").unwrap(), 1);
    assert_eq!(store.update_upstream_version("ghost", "9.9.9").unwrap(), 0);

    let loaded = store.get_by_name("widget").unwrap().unwrap();
    assert_eq!(loaded.upstream_version.as_deref(), Some("1.2.0"));
    assert_eq!(loaded.reference_version.as_deref(), Some("1.1.0"));
    assert_eq!(loaded.upstream_url.as_deref(), Some("https://example.com/widget"));
}

#[test]
fn all_names_are_sorted() {
    let (_dir, store) = test_store();
    store.upsert(&record("zsh-widget")).unwrap();
    store.upsert(&record("abc-widget")).unwrap();

    assert_eq!(store.all_names().unwrap(), vec!["abc-widget", "zsh-widget"]);
}
