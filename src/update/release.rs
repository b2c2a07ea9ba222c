//! Release discovery and platform asset selection.
//!
//! The registry returns releases newest first. The first entry that is neither
//! a draft nor a prerelease is the only candidate; older stable releases are
//! never considered. From that release's assets one binary is chosen for the
//! running platform, together with its `.sha256` sidecar when one is published.
//!
//! # Scoring
//!
//! Sidecars, archives and installers are dropped first. Names that mention a
//! different operating system or architecture are dropped too. Each remaining
//! asset is scored by case-insensitive substring match:
//!
//! | match              | points |
//! |--------------------|--------|
//! | `{os}-{arch}`      | 6      |
//! | `{os}`             | 3      |
//! | `{arch}`           | 2      |
//! | product token      | 1      |
//!
//! The highest score wins and ties go to the larger file. Assets scoring zero
//! are never selected.

use crate::constants::{CHECKSUM_SUFFIX, GITHUB_ACCEPT};
use crate::core::{Result, UpdateError};
use crate::update::config::UpdateConfig;
use crate::update::transfer::TransferEngine;
use crate::update::version_check::normalize_tag;
use crate::utils::platform::{arch_key, normalize_arch, normalize_os, os_key};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Name suffixes of auxiliary files published next to binaries.
pub const SIDECAR_SUFFIXES: &[&str] = &[CHECKSUM_SUFFIX, ".manifest.json", ".sig", ".asc"];

/// Name suffixes of packages this updater cannot apply in place.
pub const ARCHIVE_SUFFIXES: &[&str] =
    &[".zip", ".tar.gz", ".tgz", ".tar.xz", ".dmg", ".pkg", ".deb", ".rpm", ".msi", ".appimage"];

const OS_ALIASES: &[(&str, &[&str])] = &[
    ("windows", &["windows"]),
    ("macos", &["macos", "darwin", "osx"]),
    ("linux", &["linux"]),
];

const ARCH_ALIASES: &[(&str, &[&str])] = &[
    ("x86_64", &["x86_64", "amd64", "x64"]),
    ("arm64", &["arm64", "aarch64"]),
];

/// Operating system and architecture keys used to match asset names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    /// `windows`, `macos` or `linux`
    pub os: String,
    /// Normalized architecture, e.g. `x86_64` or `arm64`
    pub arch: String,
}

impl Platform {
    /// Platform of the running build.
    pub fn current() -> Self {
        Self {
            os: os_key().to_string(),
            arch: arch_key(),
        }
    }

    /// Platform from raw names, normalizing aliases such as `darwin` or `amd64`.
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: normalize_os(os).to_string(),
            arch: normalize_arch(arch),
        }
    }

    /// Whether this is a Windows platform.
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    fn os_names(&self) -> Vec<&str> {
        aliases_for(OS_ALIASES, &self.os)
    }

    fn arch_names(&self) -> Vec<&str> {
        aliases_for(ARCH_ALIASES, &self.arch)
    }

    /// Whether `name` mentions an OS or architecture other than this one.
    fn is_foreign(&self, name: &str) -> bool {
        mentions_other(OS_ALIASES, &self.os, name) || mentions_other(ARCH_ALIASES, &self.arch, name)
    }
}

fn mentions_other(table: &[(&str, &[&str])], own: &str, name: &str) -> bool {
    table
        .iter()
        .filter(|(key, _)| *key != own)
        .flat_map(|(_, aliases)| aliases.iter())
        .any(|alias| name.contains(alias))
}

fn aliases_for<'a>(table: &[(&str, &'a [&'a str])], key: &'a str) -> Vec<&'a str> {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map_or_else(|| vec![key], |(_, names)| names.to_vec())
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name as published
    pub name: String,
    /// Direct download URL
    pub download_url: String,
    /// Size in bytes (0 when unknown)
    pub size_bytes: u64,
}

/// One published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseMetadata {
    /// Tag as published, e.g. `v1.4.0`
    pub tag: String,
    /// Normalized semantic version, e.g. `1.4.0`
    pub version: String,
    /// Human-facing release page
    pub html_url: Option<String>,
    /// Draft flag
    pub is_draft: bool,
    /// Prerelease flag
    pub is_prerelease: bool,
    /// Attached files in registry order
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseMetadata {
    /// Whether this release may be offered as an update.
    pub fn is_stable(&self) -> bool {
        !self.is_draft && !self.is_prerelease
    }
}

/// The binary chosen for this platform plus its checksum sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetSelection {
    /// Binary to download, `None` when nothing matches this platform
    pub main_asset: Option<ReleaseAsset>,
    /// `.sha256` sidecar for the binary, if published
    pub checksum_asset: Option<ReleaseAsset>,
}

/// A stable release together with the assets chosen for this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    /// The newest stable release
    pub release: ReleaseMetadata,
    /// Assets chosen from it
    pub selection: AssetSelection,
}

#[derive(Deserialize)]
struct RawRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Deserialize)]
struct RawAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

impl From<RawRelease> for ReleaseMetadata {
    fn from(raw: RawRelease) -> Self {
        Self {
            version: normalize_tag(&raw.tag_name),
            tag: raw.tag_name,
            html_url: raw.html_url,
            is_draft: raw.draft,
            is_prerelease: raw.prerelease,
            assets: raw
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    download_url: a.browser_download_url,
                    size_bytes: a.size,
                })
                .collect(),
        }
    }
}

/// Decode a releases-list payload, preserving registry order.
///
/// A payload that is not a JSON array is an error. Entries that do not look
/// like releases are skipped.
pub fn parse_release_list(payload: serde_json::Value) -> Result<Vec<ReleaseMetadata>> {
    let serde_json::Value::Array(entries) = payload else {
        return Err(UpdateError::network(
            "fetch releases",
            "unexpected API payload: expected a JSON array",
        ));
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawRelease>(entry) {
            Ok(raw) => Some(ReleaseMetadata::from(raw)),
            Err(e) => {
                warn!("Skipping malformed release entry: {e}");
                None
            }
        })
        .collect())
}

/// First stable release in registry order.
pub fn latest_stable(releases: Vec<ReleaseMetadata>) -> Option<ReleaseMetadata> {
    releases.into_iter().find(ReleaseMetadata::is_stable)
}

/// Whether `name` is an archive or installer package.
pub fn is_archive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

fn is_sidecar_name(name: &str) -> bool {
    SIDECAR_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn score(name: &str, platform: &Platform, product_token: &str) -> u32 {
    let os_names = platform.os_names();
    let arch_names = platform.arch_names();
    let mut score = 0;

    if os_names
        .iter()
        .any(|os| arch_names.iter().any(|arch| name.contains(&format!("{os}-{arch}"))))
    {
        score += 6;
    }
    if os_names.iter().any(|os| name.contains(os)) {
        score += 3;
    }
    if arch_names.iter().any(|arch| name.contains(arch)) {
        score += 2;
    }
    if !product_token.is_empty() && name.contains(&product_token.to_ascii_lowercase()) {
        score += 1;
    }
    score
}

/// Choose the binary and checksum sidecar for `platform` from `assets`.
pub fn select_assets(
    assets: &[ReleaseAsset],
    platform: &Platform,
    product_token: &str,
) -> AssetSelection {
    let main_asset = assets
        .iter()
        .filter_map(|asset| {
            let name = asset.name.to_ascii_lowercase();
            if is_sidecar_name(&name) || is_archive_name(&name) || platform.is_foreign(&name) {
                return None;
            }
            if platform.is_windows() && !name.ends_with(".exe") {
                return None;
            }
            let score = score(&name, platform, product_token);
            debug!("Asset {} scored {score}", asset.name);
            (score > 0).then_some((score, asset))
        })
        // max_by_key keeps the last maximum, so reverse to prefer registry order on full ties.
        .rev()
        .max_by_key(|(score, asset)| (*score, asset.size_bytes))
        .map(|(_, asset)| asset.clone());

    let checksum_asset = main_asset.as_ref().and_then(|main| find_checksum_asset(assets, &main.name));

    AssetSelection {
        main_asset,
        checksum_asset,
    }
}

fn find_checksum_asset(assets: &[ReleaseAsset], main_name: &str) -> Option<ReleaseAsset> {
    let main_lower = main_name.to_ascii_lowercase();
    let exact = format!("{main_lower}{CHECKSUM_SUFFIX}");
    let sidecars: Vec<&ReleaseAsset> = assets
        .iter()
        .filter(|a| a.name.to_ascii_lowercase().ends_with(CHECKSUM_SUFFIX))
        .collect();

    sidecars
        .iter()
        .find(|a| a.name.to_ascii_lowercase() == exact)
        .or_else(|| sidecars.iter().find(|a| a.name.to_ascii_lowercase().contains(&main_lower)))
        .or_else(|| sidecars.first())
        .map(|a| (*a).clone())
}

/// Queries the release registry for the newest stable release.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    transfer: TransferEngine,
    releases_url: String,
    platform: Platform,
    product_token: String,
}

impl ReleaseResolver {
    /// Create a resolver for the repository named in `config`.
    pub fn new(transfer: TransferEngine, config: &UpdateConfig, platform: Platform) -> Self {
        Self {
            transfer,
            releases_url: config.releases_url(),
            platform,
            product_token: config.product_token.clone(),
        }
    }

    /// The platform assets are matched against.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Fetch the releases list and return the newest stable release.
    ///
    /// `Ok(None)` means the registry answered but has no stable release.
    /// Transport failures are retried before surfacing as errors.
    pub async fn fetch_latest_stable_release(&self) -> Result<Option<ReleaseMetadata>> {
        let payload = self.transfer.get_json(&self.releases_url, GITHUB_ACCEPT).await?;
        let releases = parse_release_list(payload)?;
        debug!("Registry listed {} releases", releases.len());

        let latest = latest_stable(releases);
        match &latest {
            Some(release) => info!("Latest stable release is {}", release.tag),
            None => info!("No stable release published"),
        }
        Ok(latest)
    }

    /// Newest stable release plus the assets chosen for this platform.
    pub async fn resolve(&self) -> Result<Option<ResolvedRelease>> {
        Ok(self.fetch_latest_stable_release().await?.map(|release| {
            let selection = select_assets(&release.assets, &self.platform, &self.product_token);
            ResolvedRelease { release, selection }
        }))
    }
}
