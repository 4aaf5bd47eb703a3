//! On-disk cache store for per-item build results.
//!
//! One JSON file per (content signature, item key) pair:
//!
//! ```text
//! <cacheDir>/<sanitised-signature>/<sanitised-item-key>.json
//! ```
//!
//! Reads are fail-safe: a missing or unparseable entry is a miss, never an
//! error. Writes go through a temp file and rename so a crash can't leave a
//! half-written entry behind.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest sanitised directory or file stem the store will produce.
const MAX_COMPONENT_LEN: usize = 120;

/// How a tracked file ended up in a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileOrigin {
    /// The item being processed.
    Item,
    /// A file referenced from the node's processing config.
    FileRef,
    /// A dependency the node discovered while doing the work.
    Discovered,
    /// An explicitly declared dependency.
    Explicit,
}

/// Hash and timestamp of one file at the moment an entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    /// Full SHA-256 of the file's contents, hex-lowercase.
    pub hash: String,
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime_ms: u64,
    /// Why this file is tracked.
    pub origin: FileOrigin,
}

/// Signature of the path set an upstream output reference resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamSignature {
    /// Short hash over the sorted resolved paths.
    pub signature: String,
    /// The upstream output key that was resolved.
    pub output_key: String,
    /// Glob filter applied at resolution time, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub glob: Option<String>,
}

/// Persisted record of one processed item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Output key → produced file paths.
    pub outputs_by_key: BTreeMap<String, Vec<PathBuf>>,
    /// Directory the outputs were produced under, used to rebase them when
    /// a later run expects a different output directory.
    pub output_base_dir: PathBuf,
    /// Files whose hash and timestamp gate this entry's validity.
    pub tracked_files: BTreeMap<PathBuf, TrackedFile>,
    /// Upstream node name → resolved path-set signature.
    pub upstream_output_signatures: BTreeMap<String, UpstreamSignature>,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// The key this entry is stored under.
    pub item_key: String,
}

/// Disk-backed cache keyed by (content signature, item key).
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load an entry. Missing files and corrupt JSON are misses.
    pub fn get(&self, signature: &str, item_key: &str) -> Option<CacheEntry> {
        let path = self.entry_path(signature, item_key);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("discarding unreadable cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// Write an entry atomically (temp file, then rename).
    pub fn set(
        &self,
        signature: &str,
        item_key: &str,
        entry: &CacheEntry,
    ) -> Result<(), PipelineError> {
        let path = self.entry_path(signature, item_key);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(entry)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|source| PipelineError::CacheWrite {
            path: path.clone(),
            source,
        })
    }

    /// Delete every entry under `signature` whose key is not in `keep`.
    ///
    /// Prunes items that disappeared from the node's input set. Silently
    /// succeeds if the signature directory does not exist.
    pub fn clean_except(&self, signature: &str, keep: &[String]) {
        let dir = self.root.join(sanitise(signature));
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let keep: HashSet<String> = keep
            .iter()
            .map(|k| format!("{}.json", sanitise(k)))
            .collect();

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !keep.contains(&name) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    tracing::debug!("failed to prune cache entry {name}: {e}");
                }
            }
        }
    }

    /// Remove one signature subtree, or the whole cache directory.
    pub fn clear(&self, signature: Option<&str>) -> std::io::Result<()> {
        let dir = match signature {
            Some(sig) => self.root.join(sanitise(sig)),
            None => self.root.clone(),
        };
        match fs::remove_dir_all(&dir) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Copy a cached artifact to the location a consumer expects.
    pub fn copy_to_expected_path(&self, src: &Path, dst: &Path) -> std::io::Result<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
        Ok(())
    }

    /// Entry counts per signature directory.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        let Ok(dirs) = fs::read_dir(&self.root) else {
            return stats;
        };
        for dir in dirs.flatten() {
            if !dir.path().is_dir() {
                continue;
            }
            let count = fs::read_dir(dir.path())
                .map(|entries| entries.flatten().count())
                .unwrap_or(0);
            stats.insert(dir.file_name().to_string_lossy().into_owned(), count);
        }
        stats
    }

    fn entry_path(&self, signature: &str, item_key: &str) -> PathBuf {
        self.root
            .join(sanitise(signature))
            .join(format!("{}.json", sanitise(item_key)))
    }
}

/// Reduce an arbitrary string to a safe path component: lowercase, path
/// separators become `-`, dots become `_`, anything else outside
/// `[a-z0-9-_]` is dropped, runs of `-` collapse, and the result is bounded.
pub fn sanitise(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let c = c.to_ascii_lowercase();
        match c {
            '/' | '\\' => {
                if !out.ends_with('-') {
                    out.push('-');
                }
            }
            '.' => out.push('_'),
            c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' => {
                if c != '-' || !out.ends_with('-') {
                    out.push(c);
                }
            }
            _ => {}
        }
    }
    out.truncate(MAX_COMPONENT_LEN);
    out
}
