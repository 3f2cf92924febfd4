// orrery-net/src/validation.rs
use std::fs::File;
use std::io;
use std::path::Path;

use orrery_common::error::{OrreryError, Result};
use sha2::{Digest, Sha256};
use url::Url;

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes_copied = io::copy(&mut file, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());
    tracing::debug!(
        "Calculated SHA256: {} ({} bytes read)",
        actual,
        bytes_copied
    );
    Ok(actual)
}

pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    tracing::debug!("Verifying checksum for: {}", path.display());
    let actual = sha256_file(path)?;
    tracing::debug!("Expected SHA256:   {}", expected);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(OrreryError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

/// Validates a URL, ensuring it uses the HTTPS scheme.
pub fn validate_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str).map_err(|e| {
        OrreryError::ValidationError(format!("Failed to parse URL '{url_str}': {e}"))
    })?;
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(OrreryError::ValidationError(format!(
            "Invalid URL scheme for '{}': Must be https, but got '{}'",
            url_str,
            url.scheme()
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    // sha256("hello\n")
    const HELLO_SHA: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn checksum_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello\n").unwrap();
        verify_checksum(&path, HELLO_SHA).unwrap();
        verify_checksum(&path, &HELLO_SHA.to_uppercase()).unwrap();
    }

    #[test]
    fn checksum_mismatch_reports_both_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello\n").unwrap();
        match verify_checksum(&path, "00").unwrap_err() {
            OrreryError::ChecksumMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "00");
                assert_eq!(actual, HELLO_SHA);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn only_https_urls_are_accepted() {
        validate_url("https://download.kde.org/stable/kstars/kstars-3.7.9.tar.xz").unwrap();
        assert!(validate_url("http://example.org/a.tar.gz").is_err());
        assert!(validate_url("not a url").is_err());
    }
}
