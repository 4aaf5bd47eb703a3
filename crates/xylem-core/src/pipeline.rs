//! Pipeline registration and execution.
//!
//! Nodes are registered once, the dependency graph is assembled from
//! explicit dependency lists plus every upstream reference found in items
//! and config, and execution walks the topological order sequentially. A
//! node's outputs become visible to downstream resolution the moment its
//! `run` returns.

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::graph::DepGraph;
use crate::input::ConfigValue;
use crate::node::{Node, NodeOutput};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// What a finished run reports back.
#[derive(Debug)]
pub struct RunSummary {
    /// Node names in the order they were executed.
    pub order: Vec<String>,
    /// Every node's outputs at the end of the run.
    pub outputs: HashMap<String, Vec<NodeOutput>>,
}

/// A named set of nodes executed in dependency order with caching.
pub struct Pipeline {
    project_root: PathBuf,
    build_dir: PathBuf,
    cache_dir: PathBuf,
    nodes: Vec<Arc<dyn Node>>,
    index: HashMap<String, usize>,
    extra_deps: Vec<(String, String)>,
}

impl Pipeline {
    /// A pipeline rooted at `project_root`, with the default `build/` and
    /// `.xylem/cache/` directories underneath it.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            build_dir: project_root.join("build"),
            cache_dir: project_root.join(".xylem").join("cache"),
            project_root,
            nodes: Vec::new(),
            index: HashMap::new(),
            extra_deps: Vec::new(),
        }
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn build_dir(&self) -> &std::path::Path {
        &self.build_dir
    }

    /// Register a node. Names must be unique; the node's
    /// `on_added_to_pipeline` hook runs immediately, letting composites
    /// register their sub-nodes.
    pub fn add(&mut self, node: Arc<dyn Node>) -> Result<(), PipelineError> {
        let name = node.name().to_string();
        if self.index.contains_key(&name) {
            return Err(PipelineError::DuplicateNode(name));
        }
        self.index.insert(name, self.nodes.len());
        self.nodes.push(Arc::clone(&node));
        node.on_added_to_pipeline(self);
        Ok(())
    }

    /// Declare that `node` must run after `dependency`, in addition to
    /// whatever the nodes declare themselves. Validated at graph build time.
    pub fn add_explicit_dependency(
        &mut self,
        node: impl Into<String>,
        dependency: impl Into<String>,
    ) {
        self.extra_deps.push((node.into(), dependency.into()));
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name())
    }

    /// Assemble the dependency graph: explicit edges first, then edges
    /// inferred from every upstream reference in items and config.
    fn build_graph(&self) -> Result<DepGraph, PipelineError> {
        let mut graph = DepGraph::new();
        for node in &self.nodes {
            graph.add_node(node.name());
        }

        for node in &self.nodes {
            for dep in node.explicit_dependencies() {
                graph.add_edge(node.name(), &dep)?;
            }
        }
        for (node, dep) in &self.extra_deps {
            graph.add_edge(node, dep)?;
        }

        for node in &self.nodes {
            if let Some(items) = node.items() {
                for r in items.output_refs() {
                    graph.add_edge(node.name(), &r.node)?;
                }
            }
            for value in node.config().values() {
                if let ConfigValue::Output(r) = value {
                    graph.add_edge(node.name(), &r.node)?;
                }
            }
        }

        Ok(graph)
    }

    /// Run every node in a valid topological order.
    ///
    /// Dependency violations (unknown names, cycles) surface before any
    /// node runs. Execution is strictly sequential; a failing node stops
    /// the pipeline and its partial outputs are discarded.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let order = self.build_graph()?.execution_order()?;

        let mut ctx = PipelineContext::new(
            self.project_root.clone(),
            self.build_dir.clone(),
            self.cache_dir.clone(),
        );

        for name in &order {
            let node = &self.nodes[self.index[name]];
            info!("Running node: {name}");
            match node.run(&ctx).await {
                Ok(outputs) => ctx.set_node_outputs(name.clone(), outputs),
                Err(source) => {
                    return Err(PipelineError::NodeFailed {
                        node: name.clone(),
                        source,
                    })
                }
            }
        }

        Ok(RunSummary {
            order,
            outputs: ctx.node_outputs().clone(),
        })
    }
}
