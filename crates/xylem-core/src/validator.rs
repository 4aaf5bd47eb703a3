//! Cache entry validation.
//!
//! Four checks, cheapest first, short-circuiting on the first failure:
//! upstream path-set signatures, tracked-file timestamps, tracked-file
//! content hashes, and output existence. Failures are not errors; they are
//! cache misses, logged at debug level.

use crate::cache::CacheEntry;
use crate::context::PipelineContext;
use crate::hasher;
use crate::input::{Input, NodeOutputRef};

/// Decide whether a cache entry may be reused.
pub fn is_valid(entry: &CacheEntry, ctx: &PipelineContext) -> bool {
    // 1. Upstream output sets: re-resolve each recorded reference and
    //    compare the path-set signature. An upstream that hasn't run
    //    resolves to an error, which also invalidates.
    for (node, upstream) in &entry.upstream_output_signatures {
        let r = NodeOutputRef {
            node: node.clone(),
            key: upstream.output_key.clone(),
            glob: upstream.glob.clone(),
        };
        let paths = match ctx.resolve_input(&Input::Output(r)) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::debug!("cache miss ({}): upstream '{node}' unavailable: {e}", entry.item_key);
                return false;
            }
        };
        let current = hasher::path_set_signature(&paths);
        if current != upstream.signature {
            tracing::debug!(
                "cache miss ({}): upstream '{node}' output set changed",
                entry.item_key
            );
            return false;
        }
    }

    // 2+3. Tracked files: timestamp fast path, content hash slow path.
    for (path, tracked) in &entry.tracked_files {
        let mtime = match hasher::mtime_millis(path) {
            Ok(mtime) => mtime,
            Err(_) => {
                tracing::debug!(
                    "cache miss ({}): tracked file {} missing",
                    entry.item_key,
                    path.display()
                );
                return false;
            }
        };
        if mtime == tracked.mtime_ms {
            continue;
        }
        // Touched; only a content change invalidates.
        match hasher::hash_file(path) {
            Ok(hash) if hash == tracked.hash => {}
            _ => {
                tracing::debug!(
                    "cache miss ({}): tracked file {} changed",
                    entry.item_key,
                    path.display()
                );
                return false;
            }
        }
    }

    // 4. Every recorded output must still exist.
    for (key, paths) in &entry.outputs_by_key {
        for path in paths {
            if !path.exists() {
                tracing::debug!(
                    "cache miss ({}): output {} under '{key}' missing",
                    entry.item_key,
                    path.display()
                );
                return false;
            }
        }
    }

    true
}
