//! Error types for pipeline construction, resolution, and execution.

use std::path::PathBuf;

/// Errors surfaced by the pipeline engine.
///
/// Configuration errors (duplicate names, unknown dependencies, cycles) are
/// detected before any node runs. Resolution errors carry the pattern or
/// upstream reference that produced nothing. Node work errors wrap whatever
/// the node raised, tagged with the node name. Cache *reads* never produce
/// errors (a broken entry is a miss), but cache writes are fatal.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A node with this name is already registered.
    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    /// An explicit or inferred dependency names a node that doesn't exist.
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency {
        /// The node declaring the dependency.
        node: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    /// A glob pattern matched no files.
    #[error("No files found for pattern: {0}")]
    NoMatches(String),

    /// A glob pattern could not be parsed.
    #[error("invalid glob pattern '{pattern}': {reason}")]
    BadPattern {
        /// The offending pattern.
        pattern: String,
        /// Parse failure description.
        reason: String,
    },

    /// An upstream output reference resolved to nothing.
    #[error("node '{node}' hasn't run or produced no outputs under '{key}'")]
    UpstreamEmpty {
        /// The upstream node name.
        node: String,
        /// The requested output key.
        key: String,
    },

    /// An input resolved to no paths at all (an empty input list).
    #[error("input resolved to no files")]
    EmptyResolution,

    /// A glob filter discarded every candidate path.
    #[error("glob '{pattern}' matched none of the outputs of '{node}': {candidates:?}")]
    FilterEmpty {
        /// The upstream node name.
        node: String,
        /// The filter pattern.
        pattern: String,
        /// Every path that was considered.
        candidates: Vec<String>,
    },

    /// A cache entry could not be written to disk.
    #[error("failed to write cache entry at {path}")]
    CacheWrite {
        /// Destination path of the entry.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A node's `run` raised an error. Fatal to the pipeline.
    #[error("node '{node}' failed: {source}")]
    NodeFailed {
        /// The failing node's name.
        node: String,
        /// Whatever the node raised.
        #[source]
        source: anyhow::Error,
    },
}
