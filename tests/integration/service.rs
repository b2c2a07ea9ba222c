//! End-to-end update flows through `UpdateService`.

use crate::common::{MockRegistry, RELEASES_PATH, TestInstall, sha256_hex, test_config};
use chrono::Utc;
use serde_json::json;
use upkeep::update::{RunMode, UpdateState, UpdateStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const ASSET: &str = "app-linux-x86_64";
const SIDECAR: &str = "app-linux-x86_64.sha256";

/// Serve release 2.0.0 with a linux binary and a sidecar claiming `digest`.
async fn publish(registry: &MockRegistry, body: &[u8], digest: &str) {
    let release = registry.release(
        "v2.0.0",
        &[(ASSET, body.len() as u64), ("app-windows-x86_64.exe", 10), (SIDECAR, 80)],
    );
    registry.serve_releases(json!([release])).await;
    registry.serve_asset(ASSET, body).await;
    registry.serve_asset(SIDECAR, format!("{digest}  {ASSET}\n").as_bytes()).await;
}

#[tokio::test]
async fn test_check_reports_available_update() {
    let registry = MockRegistry::start().await;
    publish(&registry, b"new build", &sha256_hex(b"new build")).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    let report = service.check(false).await.unwrap();

    assert!(report.update_available);
    assert_eq!(report.current_version, "1.0.0");
    assert_eq!(report.latest_version.as_deref(), Some("2.0.0"));
    assert_eq!(report.download_url, Some(registry.asset_url(ASSET)));
    assert_eq!(report.state.status, UpdateStatus::Available);
    assert!(report.state.last_checked_at.is_some());
}

#[tokio::test]
async fn test_check_reports_up_to_date() {
    let registry = MockRegistry::start().await;
    let release = registry.release("v1.0.0", &[(ASSET, 10)]);
    registry.serve_releases(json!([release])).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    let report = service.check(false).await.unwrap();

    assert!(!report.update_available);
    assert_eq!(report.state.status, UpdateStatus::UpToDate);
}

#[tokio::test]
async fn test_recent_check_is_served_from_cache() {
    let registry = MockRegistry::start().await;
    publish(&registry, b"new build", &sha256_hex(b"new build")).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));
    service
        .store()
        .save(&UpdateState {
            status: UpdateStatus::UpToDate,
            latest_version: Some("1.0.0".to_string()),
            last_checked_at: Some(Utc::now() - chrono::Duration::hours(1)),
            ..UpdateState::default()
        })
        .unwrap();

    let cached = service.check(false).await.unwrap();
    assert!(!cached.update_available);
    assert_eq!(registry.hits(RELEASES_PATH).await, 0);

    let forced = service.check(true).await.unwrap();
    assert!(forced.update_available);
    assert_eq!(registry.hits(RELEASES_PATH).await, 1);
}

#[tokio::test]
async fn test_stale_check_queries_registry_again() {
    let registry = MockRegistry::start().await;
    publish(&registry, b"new build", &sha256_hex(b"new build")).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));
    service
        .store()
        .save(&UpdateState {
            status: UpdateStatus::UpToDate,
            last_checked_at: Some(Utc::now() - chrono::Duration::hours(25)),
            ..UpdateState::default()
        })
        .unwrap();

    let report = service.check(false).await.unwrap();
    assert!(report.update_available);
    assert_eq!(registry.hits(RELEASES_PATH).await, 1);
}

#[tokio::test]
async fn test_registry_failure_is_recorded_after_retries() {
    let registry = MockRegistry::start().await;
    Mock::given(method("GET"))
        .and(path(RELEASES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&registry.server)
        .await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    let report = service.check(true).await.unwrap();

    assert!(!report.update_available);
    assert_eq!(report.state.status, UpdateStatus::Error);
    assert!(report.state.error.unwrap().contains("500"));
    assert_eq!(registry.hits(RELEASES_PATH).await, 3);
}

#[tokio::test]
async fn test_download_stages_verified_asset() {
    let registry = MockRegistry::start().await;
    let body = b"release 2.0.0 binary".to_vec();
    publish(&registry, &body, &sha256_hex(&body)).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    // An older staged version is pruned once the new one lands.
    let stale = install.updates_dir().join("1.5.0");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join(ASSET), b"old").unwrap();

    service.check(false).await.unwrap();
    let response = service.download().await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.latest_version.as_deref(), Some("2.0.0"));
    let asset = install.updates_dir().join("2.0.0").join(ASSET);
    assert_eq!(response.asset_path.as_deref(), Some(asset.as_path()));
    assert_eq!(std::fs::read(&asset).unwrap(), body);
    assert!(!stale.exists());

    let state = service.store().load();
    assert_eq!(state.status, UpdateStatus::Downloaded);
    assert_eq!(state.progress_percent, 100);
    assert_eq!(state.expected_digest, Some(sha256_hex(&body)));
    assert_eq!(state.checksum_path, Some(install.updates_dir().join("2.0.0").join(SIDECAR)));
}

#[tokio::test]
async fn test_download_without_check_is_refused() {
    let registry = MockRegistry::start().await;
    publish(&registry, b"new build", &sha256_hex(b"new build")).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    let response = service.download().await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("No update available"));
    assert_eq!(registry.hits(&format!("/download/{ASSET}")).await, 0);
    assert_eq!(service.store().load().status, UpdateStatus::Idle);
}

#[tokio::test]
async fn test_apply_with_bad_checksum_leaves_install_untouched() {
    let registry = MockRegistry::start().await;
    publish(&registry, b"tampered build", &sha256_hex(b"expected build")).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    service.check(false).await.unwrap();
    let response = service.apply().await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("Checksum mismatch"));
    let state = service.store().load();
    assert_eq!(state.status, UpdateStatus::Error);
    assert!(state.error.unwrap().contains("Checksum mismatch"));
    assert!(!install.updates_dir().join("2.0.0").join(ASSET).exists());
    assert_eq!(std::fs::read(&install.exe).unwrap(), b"installed build 1.0.0");
    assert_eq!(install.launcher.count(), 0);
}

#[tokio::test]
async fn test_apply_downloads_and_launches_helper() {
    let registry = MockRegistry::start().await;
    let body = b"release 2.0.0 binary".to_vec();
    publish(&registry, &body, &sha256_hex(&body)).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    service.check(false).await.unwrap();
    let response = service.apply().await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.requires_elevation, Some(false));
    assert_eq!(service.store().load().status, UpdateStatus::Applied);

    let launched = install.launcher.launched.lock().unwrap();
    assert_eq!(launched.len(), 1);
    let script = &launched[0];
    assert_eq!(script.program, "sh");
    assert!(script.script_path.starts_with(install.updates_dir()));
    assert!(script.contents.contains("kill -TERM 31337"));
    assert!(script.contents.contains(&install.exe.display().to_string()));
    assert!(script.script_path.exists());

    // The helper does the replacement; the running executable is untouched here.
    assert_eq!(std::fs::read(&install.exe).unwrap(), b"installed build 1.0.0");
}

#[tokio::test]
async fn test_apply_refuses_when_staged_file_was_modified() {
    let registry = MockRegistry::start().await;
    let body = b"release 2.0.0 binary".to_vec();
    publish(&registry, &body, &sha256_hex(&body)).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    service.check(false).await.unwrap();
    assert!(service.download().await.success);
    std::fs::write(install.updates_dir().join("2.0.0").join(ASSET), b"swapped").unwrap();

    let response = service.apply().await;

    assert!(!response.success);
    assert_eq!(service.store().load().status, UpdateStatus::Error);
    assert_eq!(install.launcher.count(), 0);
}

#[tokio::test]
async fn test_apply_refuses_staged_release_that_was_withdrawn() {
    let registry = MockRegistry::start().await;
    let body = b"release 2.0.0 binary".to_vec();
    publish(&registry, &body, &sha256_hex(&body)).await;
    let install = TestInstall::new();
    let service = install.service(test_config(&registry.uri()));

    service.check(false).await.unwrap();
    assert!(service.download().await.success);

    // 2.0.0 is pulled from the registry after it was staged.
    registry.server.reset().await;
    registry.serve_releases(json!([])).await;
    let report = service.check(true).await.unwrap();
    assert!(!report.update_available);
    assert_eq!(report.state.status, UpdateStatus::UpToDate);
    assert_eq!(report.state.asset_path, None);
    assert_eq!(report.state.expected_digest, None);

    let response = service.apply().await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("No update available"));
    assert_eq!(install.launcher.count(), 0);
    assert_eq!(service.store().load().status, UpdateStatus::UpToDate);
}

#[tokio::test]
async fn test_apply_after_restart_into_staged_version_is_refused() {
    let registry = MockRegistry::start().await;
    let body = b"release 2.0.0 binary".to_vec();
    publish(&registry, &body, &sha256_hex(&body)).await;
    let install = TestInstall::new();
    let config = test_config(&registry.uri());

    let before = install.service(config.clone());
    before.check(false).await.unwrap();
    assert!(before.download().await.success);
    assert!(install.updates_dir().join("2.0.0").join(ASSET).is_file());

    // The helper installed 2.0.0 and the application restarted into it.
    let after = install.service_at_version(config, "2.0.0");
    let response = after.apply().await;

    assert!(!response.success);
    assert!(response.error.unwrap().contains("No update available"));
    assert_eq!(install.launcher.count(), 0);
    assert_eq!(after.store().load().status, UpdateStatus::Downloaded);
}

#[tokio::test]
async fn test_source_mode_never_downloads_or_applies() {
    let registry = MockRegistry::start().await;
    publish(&registry, b"new build", &sha256_hex(b"new build")).await;
    let install = TestInstall::new();
    let service = install.service_with_mode(test_config(&registry.uri()), RunMode::Source);

    let report = service.check(true).await.unwrap();
    assert!(!report.update_available);
    assert_eq!(report.latest_version.as_deref(), Some("2.0.0"));

    let download = service.download().await;
    assert!(!download.success);
    assert_eq!(download.mode, RunMode::Source);

    let apply = service.apply().await;
    assert!(!apply.success);
    assert_eq!(apply.mode, RunMode::Source);

    assert_eq!(registry.hits(&format!("/download/{ASSET}")).await, 0);
    assert_eq!(install.launcher.count(), 0);
    assert_eq!(service.store().load().status, UpdateStatus::Available);
}
