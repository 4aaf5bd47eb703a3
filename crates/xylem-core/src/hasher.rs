//! SHA-256 content hashing, item keys, and path-set signatures.
//!
//! Everything the cache layer compares is derived here: full content hashes
//! for tracked files, short signatures over sorted path sets, and the
//! filesystem-safe item keys that cache entries are filed under. Batch
//! hashing runs in parallel with Rayon.

use anyhow::{Context, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Number of hex characters kept in short signatures (8 bytes).
const SHORT_HEX_LEN: usize = 16;

/// Maximum length of a generated item key.
const ITEM_KEY_MAX_LEN: usize = 200;

/// Full SHA-256 of a byte slice, hex-lowercase.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// First 16 hex characters of the SHA-256 of a byte slice.
pub fn short_hash(data: &[u8]) -> String {
    let mut hash = sha256_hex(data);
    hash.truncate(SHORT_HEX_LEN);
    hash
}

/// Hash a single file's contents.
pub fn hash_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content =
        fs::read(path).with_context(|| format!("failed to read {} for hashing", path.display()))?;
    Ok(sha256_hex(&content))
}

/// Hash many files in parallel, returning a path → hash map.
///
/// Unreadable files are skipped; callers that need a hard error hash the
/// file individually with [`hash_file`].
pub fn hash_files(paths: &[PathBuf]) -> HashMap<PathBuf, String> {
    paths
        .par_iter()
        .filter_map(|path| {
            let content = fs::read(path).ok()?;
            Some((path.clone(), sha256_hex(&content)))
        })
        .collect()
}

/// Modification time of a file in milliseconds since the Unix epoch.
pub fn mtime_millis(path: impl AsRef<Path>) -> std::io::Result<u64> {
    let modified = fs::metadata(path.as_ref())?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0))
}

/// Signature over a *set* of paths: short hash of the sorted paths joined
/// with `|`. Detects additions and removals even when file contents are
/// untouched.
pub fn path_set_signature<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut parts: Vec<String> = paths
        .iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .collect();
    parts.sort();
    short_hash(parts.join("|").as_bytes())
}

/// Derive a filesystem-safe cache key from one or more paths.
///
/// The key is the sanitised basename of the first path (after sorting)
/// followed by a short hash of the sorted joined paths, so it depends only
/// on the multiset of inputs, not their order.
pub fn make_item_key<P: AsRef<Path>>(paths: &[P]) -> String {
    let mut sorted: Vec<String> = paths
        .iter()
        .map(|p| p.as_ref().to_string_lossy().into_owned())
        .collect();
    sorted.sort();

    let basename = sorted
        .first()
        .map(|p| {
            Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .unwrap_or_default();

    let stem = sanitise_key_part(&basename);
    let hash = short_hash(sorted.join("|").as_bytes());

    let mut key = format!("{stem}-{hash}");
    if key.len() > ITEM_KEY_MAX_LEN {
        key = format!(
            "{}-{hash}",
            &stem[..ITEM_KEY_MAX_LEN - SHORT_HEX_LEN - 1]
        );
    }
    key
}

/// Lowercase and reduce to `[a-z0-9-]`, collapsing runs of `-`.
fn sanitise_key_part(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the single byte "2"
        assert_eq!(
            sha256_hex(b"2"),
            "d4735e3a265e16eee03f59718b9b5d03019c07d8b6c51f90da3a666eec13ab35"
        );
    }

    #[test]
    fn short_hash_is_16_chars() {
        assert_eq!(short_hash(b"anything").len(), 16);
    }

    #[test]
    fn hash_file_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.xml");
        fs::write(&path, "<page/>").unwrap();
        assert_eq!(hash_file(&path).unwrap(), sha256_hex(b"<page/>"));
    }

    #[test]
    fn hash_file_missing_errors() {
        assert!(hash_file("/nonexistent/file.xml").is_err());
    }

    #[test]
    fn hash_files_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.xml");
        fs::write(&good, "a").unwrap();
        let missing = dir.path().join("gone.xml");

        let map = hash_files(&[good.clone(), missing]);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&good));
    }

    #[test]
    fn set_signature_ignores_order() {
        let a = PathBuf::from("src/a.xml");
        let b = PathBuf::from("src/b.xml");
        assert_eq!(
            path_set_signature(&[a.clone(), b.clone()]),
            path_set_signature(&[b, a])
        );
    }

    #[test]
    fn set_signature_detects_removal() {
        let a = PathBuf::from("src/a.xml");
        let b = PathBuf::from("src/b.xml");
        assert_ne!(
            path_set_signature(&[a.clone(), b]),
            path_set_signature(&[a])
        );
    }

    #[test]
    fn item_key_is_order_independent() {
        let a = PathBuf::from("content/posts/hello.xml");
        let b = PathBuf::from("styles/page.xsl");
        assert_eq!(make_item_key(&[a.clone(), b.clone()]), make_item_key(&[b, a]));
    }

    #[test]
    fn item_key_is_filesystem_safe() {
        let key = make_item_key(&[PathBuf::from("content/Weird Name (1).XML")]);
        assert!(key.len() <= 200);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn item_key_bounded_for_long_names() {
        let long = "x".repeat(400);
        let key = make_item_key(&[PathBuf::from(format!("content/{long}.xml"))]);
        assert!(key.len() <= 200);
    }

    #[test]
    fn mtime_millis_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, "x").unwrap();
        assert!(mtime_millis(&path).unwrap() > 0);
    }
}
