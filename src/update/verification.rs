use crate::constants::{DIGEST_CHUNK_SIZE, SHA256_HEX_LEN};
use crate::core::{Result, UpdateError};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// SHA-256 digest computation and checksum sidecar handling.
///
/// Digests are lowercase hex without any `sha256:` prefix, matching what
/// `sha256sum` writes into `.sha256` sidecars.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the SHA-256 digest of a file.
    ///
    /// The file is streamed in 256 KiB chunks and never loaded whole.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use upkeep::update::verification::ChecksumVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> upkeep::core::Result<()> {
    /// let digest = ChecksumVerifier::compute_digest(Path::new("app.exe")).await?;
    /// assert_eq!(digest.len(), 64);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_digest(path: &Path) -> Result<String> {
        debug!("Computing SHA256 digest for: {}", path.display());

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; DIGEST_CHUNK_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Extract the digest for `target` from sidecar text.
    ///
    /// Accepts `sha256sum` output (`<digest>  <name>` or `<digest> *<name>`,
    /// one entry per line) where the name column ends with `target`, compared
    /// case-insensitively. An entry naming exactly `target` (or `<dir>/target`)
    /// wins over a bare suffix match such as `myapp.exe` for `app.exe`.
    /// Failing that, a sidecar holding exactly one bare 64-character hex token
    /// is accepted. Anything else, including a sidecar that only names other
    /// files, yields `None`.
    pub fn parse_sidecar(text: &str, target: &str) -> Option<String> {
        let target = target.to_ascii_lowercase();
        let mut listed_other_files = false;
        let mut suffix_match = None;

        for line in text.lines() {
            let mut columns = line.split_whitespace();
            let (Some(digest), Some(name)) = (columns.next(), columns.last()) else {
                continue;
            };

            listed_other_files = true;
            if !is_sha256_hex(digest) {
                continue;
            }
            let name = name.trim_start_matches('*').to_ascii_lowercase();
            if !name.ends_with(&target) {
                continue;
            }

            let on_boundary = name.len() == target.len()
                || name[..name.len() - target.len()].ends_with(['/', '\\']);
            if on_boundary {
                return Some(digest.to_ascii_lowercase());
            }
            suffix_match.get_or_insert_with(|| digest.to_ascii_lowercase());
        }

        if suffix_match.is_some() {
            return suffix_match;
        }

        if listed_other_files {
            warn!("Checksum sidecar has no entry for {target}");
            return None;
        }

        let mut tokens = text.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some(token), None) if is_sha256_hex(token) => Some(token.to_ascii_lowercase()),
            _ => None,
        }
    }

    /// Compare the file's digest with `expected`, ignoring case.
    ///
    /// An empty `expected` returns `Ok(false)`: no digest means the file
    /// cannot be verified, never that it is verified.
    pub async fn verify(path: &Path, expected: &str) -> Result<bool> {
        let expected = expected.trim();
        if expected.is_empty() {
            return Ok(false);
        }
        let actual = Self::compute_digest(path).await?;
        Ok(actual.eq_ignore_ascii_case(expected))
    }

    /// Like [`verify`](Self::verify) but fails with a descriptive integrity error.
    pub async fn ensure_verified(path: &Path, expected: Option<&str>) -> Result<()> {
        let file = path.display().to_string();
        let expected = match expected.map(str::trim) {
            Some(e) if !e.is_empty() => e,
            _ => return Err(UpdateError::MissingChecksum { file }),
        };

        info!("Verifying checksum for: {file}");
        let actual = Self::compute_digest(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(UpdateError::ChecksumMismatch {
                file,
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }
}

fn is_sha256_hex(token: &str) -> bool {
    token.len() == SHA256_HEX_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
}
