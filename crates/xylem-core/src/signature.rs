//! Content signature derivation.
//!
//! A node's content signature names the cache directory all of its entries
//! live under. It covers the node's processing config and items declaration
//! only. The output config (where artifacts land) is excluded, so moving
//! outputs never invalidates the cache.

use crate::hasher::short_hash;
use crate::input::{absolutize, ConfigValue, Input, NodeConfig};
use serde_json::json;
use std::path::Path;

/// Derive a node's content signature: `<kind>-<hex16>`.
///
/// File references contribute their absolute path (a stable identity, not
/// the file's contents); content changes are caught per entry by
/// tracked-file hashes. All other config values are serialised as JSON
/// with sorted keys.
pub fn content_signature(
    kind: &str,
    config: &NodeConfig,
    items: Option<&Input>,
    project_root: &Path,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(config.len() + 1);

    for (key, value) in config {
        match value {
            ConfigValue::File(f) => {
                let abs = absolutize(project_root, &f.path);
                parts.push(format!("{key}:{}", abs.display()));
            }
            ConfigValue::Output(r) => {
                let v = json!({ "node": r.node, "key": r.key, "glob": r.glob });
                parts.push(format!("{key}={v}"));
            }
            ConfigValue::Json(v) => parts.push(format!("{key}={v}")),
        }
    }

    if let Some(items) = items {
        parts.push(format!("items={}", items_decl(items)));
    }

    format!("{kind}-{}", short_hash(parts.join("\n").as_bytes()))
}

/// Canonical text for an items declaration: the glob literal, the joined
/// members of a list, or `node#key` for an upstream reference.
fn items_decl(input: &Input) -> String {
    match input {
        Input::Glob(pattern) => pattern.clone(),
        Input::Output(r) => format!("{}#{}", r.node, r.key),
        Input::Many(inputs) => inputs
            .iter()
            .map(items_decl)
            .collect::<Vec<_>>()
            .join("|"),
    }
}
