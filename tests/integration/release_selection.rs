//! Release discovery against a mock registry.

use crate::common::{MockRegistry, test_config};
use serde_json::json;
use upkeep::update::{Platform, ReleaseResolver, TransferEngine};

fn resolver(registry: &MockRegistry, platform: Platform) -> ReleaseResolver {
    let config = test_config(&registry.uri());
    let transfer = TransferEngine::new(&config).unwrap();
    ReleaseResolver::new(transfer, &config, platform)
}

#[tokio::test]
async fn test_resolves_first_stable_release_for_windows() {
    let registry = MockRegistry::start().await;
    let mut draft = registry.release("v3.0.0", &[("app-windows-x86_64.exe", 10)]);
    draft["draft"] = json!(true);
    let mut beta = registry.release("v2.1.0-beta.1", &[("app-windows-x86_64.exe", 10)]);
    beta["prerelease"] = json!(true);
    let stable = registry.release(
        "v2.0.0",
        &[
            ("app-linux-x86_64", 100),
            ("app-windows-x86_64.exe", 120),
            ("app-windows-x86_64.zip", 90),
            ("app.sha256", 1),
        ],
    );
    registry.serve_releases(json!([draft, beta, stable])).await;

    let resolved = resolver(&registry, Platform::new("win32", "x64"))
        .resolve()
        .await
        .unwrap()
        .expect("a stable release");

    assert_eq!(resolved.release.version, "2.0.0");
    assert_eq!(resolved.release.tag, "v2.0.0");
    let main = resolved.selection.main_asset.unwrap();
    assert_eq!(main.name, "app-windows-x86_64.exe");
    assert_eq!(main.download_url, registry.asset_url("app-windows-x86_64.exe"));
    assert_eq!(resolved.selection.checksum_asset.unwrap().name, "app.sha256");
}

#[tokio::test]
async fn test_no_matching_asset_yields_empty_selection() {
    let registry = MockRegistry::start().await;
    let release = registry.release("v2.0.0", &[("app-darwin-arm64", 100), ("app.tar.gz", 90)]);
    registry.serve_releases(json!([release])).await;

    let resolved = resolver(&registry, Platform::new("linux", "x86_64"))
        .resolve()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(resolved.release.version, "2.0.0");
    assert!(resolved.selection.main_asset.is_none());
    assert!(resolved.selection.checksum_asset.is_none());
}

#[tokio::test]
async fn test_only_prereleases_resolves_to_none() {
    let registry = MockRegistry::start().await;
    let mut beta = registry.release("v2.0.0-rc.1", &[("app-linux-x86_64", 10)]);
    beta["prerelease"] = json!(true);
    registry.serve_releases(json!([beta])).await;

    let resolved = resolver(&registry, Platform::new("linux", "x86_64")).resolve().await.unwrap();
    assert!(resolved.is_none());
}
