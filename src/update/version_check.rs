//! Semantic version comparison for release tags.
//!
//! Tags are published as `v1.4.2`, `1.4.2`, or occasionally `1.4`. A single
//! leading non-digit character is stripped and missing minor/patch components
//! are filled with zero before the string is handed to [`semver`]. Anything
//! that still fails to parse is never considered newer.

use semver::Version;

/// Parse a published tag into a [`Version`].
///
/// Returns `None` for tags that are not dotted-numeric versions.
///
/// # Examples
///
/// ```rust
/// use upkeep::update::version_check::parse_version;
///
/// assert_eq!(parse_version("v1.2.3").unwrap().to_string(), "1.2.3");
/// assert_eq!(parse_version("2.0").unwrap().to_string(), "2.0.0");
/// assert!(parse_version("latest").is_none());
/// ```
pub fn parse_version(tag: &str) -> Option<Version> {
    let trimmed = tag.trim();
    let mut chars = trimmed.chars();
    let body = match chars.next() {
        Some(c) if !c.is_ascii_digit() => chars.as_str(),
        Some(_) => trimmed,
        None => return None,
    };

    if let Ok(version) = Version::parse(body) {
        return Some(version);
    }

    // Pad "1" or "1.2" (optionally followed by -pre/+build) to three components.
    let split_at = body.find(['-', '+']).unwrap_or(body.len());
    let (core, rest) = body.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(rest);
    Version::parse(&padded).ok()
}

/// Whether `candidate` is strictly newer than `current`.
///
/// Returns `false` if either side fails to parse.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => {
            tracing::debug!("Unparsable version pair: candidate={candidate:?}, current={current:?}");
            false
        }
    }
}

/// Normalized display form of a tag (`v1.2` → `1.2.0`), or the tag itself if unparsable.
pub fn normalize_tag(tag: &str) -> String {
    parse_version(tag).map_or_else(|| tag.trim().to_string(), |v| v.to_string())
}
