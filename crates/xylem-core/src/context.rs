//! Runtime facade handed to every node.
//!
//! The context is the only surface a node sees while running: input
//! resolution, the cache store, prior nodes' outputs, and the build
//! directory path conventions.

use crate::cache::CacheStore;
use crate::error::PipelineError;
use crate::input::Input;
use crate::node::NodeOutput;
use crate::resolve;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Runtime state shared by all nodes of one pipeline run.
pub struct PipelineContext {
    project_root: PathBuf,
    build_dir: PathBuf,
    cache: CacheStore,
    node_outputs: HashMap<String, Vec<NodeOutput>>,
}

impl PipelineContext {
    pub fn new(
        project_root: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            build_dir: build_dir.into(),
            cache: CacheStore::new(cache_dir),
            node_outputs: HashMap::new(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Root under which default output paths are constructed.
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Node-visible logging.
    pub fn log(&self, message: &str) {
        tracing::info!("{message}");
    }

    /// Expand an input into concrete file paths.
    pub fn resolve_input(&self, input: &Input) -> Result<Vec<PathBuf>, PipelineError> {
        resolve::resolve(input, &self.node_outputs, &self.project_root, &self.build_dir)
    }

    /// Outputs of a node that has already run.
    pub fn get_node_outputs(&self, name: &str) -> Option<&[NodeOutput]> {
        self.node_outputs.get(name).map(Vec::as_slice)
    }

    /// All outputs recorded so far.
    pub fn node_outputs(&self) -> &HashMap<String, Vec<NodeOutput>> {
        &self.node_outputs
    }

    pub(crate) fn set_node_outputs(&mut self, name: String, outputs: Vec<NodeOutput>) {
        self.node_outputs.insert(name, outputs);
    }

    /// Canonical build-output path for `input_path` processed by `node_name`.
    ///
    /// Inputs already inside the build directory lose the `<buildDir>/<node>/`
    /// prefix of the node that produced them; other inputs are expressed
    /// relative to the project root. The result is rebased under
    /// `<buildDir>/<nodeName>/`, with the extension optionally replaced.
    pub fn get_build_path(
        &self,
        node_name: &str,
        input_path: &Path,
        new_ext: Option<&str>,
    ) -> PathBuf {
        let rel = self.strip_build_prefix(input_path);
        let mut out = self.build_dir.join(node_name).join(rel);
        if let Some(ext) = new_ext {
            out.set_extension(ext.trim_start_matches('.'));
        }
        out
    }

    /// Strip the `<buildDir>/<node>/` prefix from a build-tree path, or make
    /// a working-directory path relative to the project root.
    pub fn strip_build_prefix(&self, input_path: &Path) -> PathBuf {
        if let Ok(in_build) = input_path.strip_prefix(&self.build_dir) {
            // Drop the leading node-name segment.
            let mut components = in_build.components();
            components.next();
            let rest = components.as_path();
            if rest.components().next().is_some() {
                return rest.to_path_buf();
            }
            // A path directly under the build dir keeps its filename.
            return in_build.to_path_buf();
        }
        if let Ok(rel) = input_path.strip_prefix(&self.project_root) {
            return rel.to_path_buf();
        }
        // Already relative (or foreign); drop any leading `..`/`/`.
        input_path
            .components()
            .skip_while(|c| {
                matches!(
                    c,
                    Component::RootDir | Component::ParentDir | Component::Prefix(_)
                )
            })
            .collect()
    }
}
