//! Persisted state record behaviour across process restarts.

use tempfile::TempDir;
use upkeep::update::{StateStore, UpdateState, UpdateStatus};

#[test]
fn test_corrupt_state_file_loads_as_idle() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path());
    std::fs::write(store.path(), "{ this is not json").unwrap();

    let state = store.load();
    assert_eq!(state, UpdateState::default());
    assert_eq!(state.status, UpdateStatus::Idle);

    // The next save replaces the corrupt record.
    store.patch(|s| s.transition(UpdateStatus::Checking)).unwrap();
    assert_eq!(store.load().status, UpdateStatus::Checking);
}

#[test]
fn test_state_survives_a_new_store_instance() {
    let temp = TempDir::new().unwrap();
    StateStore::new(temp.path())
        .patch(|s| {
            s.transition(UpdateStatus::Downloaded);
            s.latest_version = Some("2.0.0".to_string());
            s.asset_path = Some(temp.path().join("2.0.0").join("app"));
        })
        .unwrap();

    let reloaded = StateStore::new(temp.path()).load();
    assert_eq!(reloaded.status, UpdateStatus::Downloaded);
    assert_eq!(reloaded.progress_percent, 100);
    assert_eq!(reloaded.latest_version.as_deref(), Some("2.0.0"));
    assert!(reloaded.updated_at.is_some());
}

#[test]
fn test_state_file_uses_camel_case_keys() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path());
    store.patch(|s| s.fail("boom")).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["status"], "error");
    assert_eq!(raw["error"], "boom");
    assert!(raw.get("progressPercent").is_some());
}
