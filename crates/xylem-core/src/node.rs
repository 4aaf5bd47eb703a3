//! The node contract: the unit of work a pipeline schedules.

use crate::context::PipelineContext;
use crate::input::{Input, NodeConfig};
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One keyed output mapping, typically one per processed item.
///
/// Every path listed here must exist on disk at the moment the node reports
/// completion; downstream nodes resolve against these lists and the cache
/// validator checks them for existence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOutput {
    outputs: BTreeMap<String, Vec<PathBuf>>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// An output carrying one key.
    pub fn single(key: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        let mut out = Self::new();
        out.insert(key, paths);
        out
    }

    pub fn insert(&mut self, key: impl Into<String>, paths: Vec<PathBuf>) {
        self.outputs.insert(key.into(), paths);
    }

    pub fn get(&self, key: &str) -> Option<&Vec<PathBuf>> {
        self.outputs.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.outputs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<PathBuf>)> {
        self.outputs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl From<BTreeMap<String, Vec<PathBuf>>> for NodeOutput {
    fn from(outputs: BTreeMap<String, Vec<PathBuf>>) -> Self {
        Self { outputs }
    }
}

/// Presentation-only decisions: where artifacts land and what they're named.
///
/// Excluded from the content signature: changing any of these must not
/// invalidate cached work. On a cache hit the artifact is copied to the
/// newly expected location instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Directory outputs are written under, overriding the default
    /// `<buildDir>/<nodeName>/` convention.
    pub output_dir: Option<PathBuf>,
    /// Fixed output filename, for nodes producing a single artifact.
    pub output_filename: Option<String>,
    /// Replacement extension for derived output paths.
    pub extension: Option<String>,
    /// Prefix stripped from item paths before rebasing under the output
    /// directory.
    pub strip_path_prefix: Option<String>,
}

/// An addressable unit of work.
///
/// Implementations provide their identity, inputs, and config through the
/// accessor methods and do their work in [`Node::run`]. The per-item
/// cache-or-compute loop lives in [`crate::runner::with_cache`]; nodes call
/// it from `run` rather than reimplementing cache handling.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name within the pipeline.
    fn name(&self) -> &str;

    /// Tag identifying the node implementation class; the first half of the
    /// content signature.
    fn kind(&self) -> &str {
        "node"
    }

    /// The variable input this node iterates over, if any. A node without
    /// items processes a single synthetic item derived from its config.
    fn items(&self) -> Option<Input> {
        None
    }

    /// Processing config. Participates in the content signature.
    fn config(&self) -> NodeConfig {
        NodeConfig::new()
    }

    /// Output placement config. Never participates in the content signature.
    fn output_config(&self) -> OutputConfig {
        OutputConfig::default()
    }

    /// Names of nodes that must run before this one, beyond what is
    /// inferred from input references.
    fn explicit_dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called once when the node is registered. Composite nodes use this to
    /// register their internal sub-nodes.
    fn on_added_to_pipeline(&self, _pipeline: &mut Pipeline) {}

    /// Do the work. Any error is fatal to the pipeline and reported under
    /// this node's name; partial outputs are not cached.
    async fn run(&self, ctx: &PipelineContext) -> anyhow::Result<Vec<NodeOutput>>;
}
