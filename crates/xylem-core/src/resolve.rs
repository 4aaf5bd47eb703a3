//! Input resolution: expand an [`Input`] into concrete file paths.
//!
//! Resolution is read-only: it looks at the filesystem and at upstream
//! node outputs, never at the cache.

use crate::error::PipelineError;
use crate::input::{absolutize, Input, NodeOutputRef};
use crate::node::NodeOutput;
use glob::{MatchOptions, Pattern};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// `*` must not cross path separators when filtering upstream outputs,
/// otherwise the build-tree prefix handling below would be unreachable.
const MATCH_OPTS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Resolve an input to an ordered, de-duplicated list of file paths.
///
/// An empty resolution is always an error: a glob that matches nothing, an
/// upstream node that hasn't run or produced nothing under the requested
/// key, or a glob filter that discards every candidate.
pub(crate) fn resolve(
    input: &Input,
    outputs: &HashMap<String, Vec<NodeOutput>>,
    project_root: &Path,
    build_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = resolve_inner(input, outputs, project_root, build_dir)?;

    let mut seen = HashSet::new();
    paths.retain(|p| seen.insert(p.clone()));

    // Leaf resolutions error on emptiness themselves; this catches inputs
    // with no leaves at all, such as an empty list.
    if paths.is_empty() {
        return Err(PipelineError::EmptyResolution);
    }
    Ok(paths)
}

fn resolve_inner(
    input: &Input,
    outputs: &HashMap<String, Vec<NodeOutput>>,
    project_root: &Path,
    build_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    match input {
        Input::Output(r) => resolve_output_ref(r, outputs, build_dir),
        Input::Glob(pattern) => expand_glob(pattern, project_root),
        Input::Many(inputs) => {
            let mut all = Vec::new();
            for input in inputs {
                all.extend(resolve_inner(input, outputs, project_root, build_dir)?);
            }
            Ok(all)
        }
    }
}

/// Take an upstream node's paths under one output key, then apply the
/// optional glob filter.
fn resolve_output_ref(
    r: &NodeOutputRef,
    outputs: &HashMap<String, Vec<NodeOutput>>,
    build_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    let candidates: Vec<PathBuf> = outputs
        .get(&r.node)
        .map(|list| {
            list.iter()
                .filter_map(|o| o.get(&r.key))
                .flatten()
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    if candidates.is_empty() {
        return Err(PipelineError::UpstreamEmpty {
            node: r.node.clone(),
            key: r.key.clone(),
        });
    }

    let Some(glob) = &r.glob else {
        return Ok(candidates);
    };

    let pattern = Pattern::new(glob).map_err(|e| PipelineError::BadPattern {
        pattern: glob.clone(),
        reason: e.to_string(),
    })?;
    // Outputs produced into the default build tree carry a
    // `<buildDir>/<node>/` prefix the author's pattern won't mention.
    let build_pattern = Pattern::new(&format!("{}/*/{}", build_dir.display(), glob)).ok();

    let filtered: Vec<PathBuf> = candidates
        .iter()
        .filter(|p| {
            pattern.matches_path_with(p, MATCH_OPTS)
                || (p.starts_with(build_dir)
                    && build_pattern
                        .as_ref()
                        .is_some_and(|bp| bp.matches_path_with(p, MATCH_OPTS)))
        })
        .cloned()
        .collect();

    if filtered.is_empty() {
        return Err(PipelineError::FilterEmpty {
            node: r.node.clone(),
            pattern: glob.clone(),
            candidates: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        });
    }
    Ok(filtered)
}

/// Expand a glob pattern against the project root.
fn expand_glob(pattern: &str, project_root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let full = absolutize(project_root, Path::new(pattern));
    let full = full.to_string_lossy();

    let matches = glob::glob(&full).map_err(|e| PipelineError::BadPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let paths: Vec<PathBuf> = matches.filter_map(Result::ok).collect();
    if paths.is_empty() {
        return Err(PipelineError::NoMatches(pattern.to_string()));
    }
    Ok(paths)
}
