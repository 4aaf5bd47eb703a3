//! Xylem Core - Incremental Pipeline Engine for Static-Site Builds
//!
//! Features:
//! - Named nodes over globs, file refs, and upstream output references
//! - Dependency graph with topological execution and cycle detection
//! - Content-addressed per-item cache (SHA-256, timestamp fast path)
//! - Presentation-only output changes reuse cached artifacts
//! - Upstream output-set signatures catch added/removed files
//! - Parallel batch hashing with Rayon

pub mod cache;
pub mod composite;
pub mod context;
pub mod error;
pub mod graph;
pub mod hasher;
pub mod input;
pub mod node;
pub mod pipeline;
mod resolve;
pub mod runner;
pub mod signature;
pub mod validator;

pub use cache::{CacheEntry, CacheStore, FileOrigin, TrackedFile, UpstreamSignature};
pub use composite::{forward_outputs, OutputMapping};
pub use context::PipelineContext;
pub use error::PipelineError;
pub use graph::DepGraph;
pub use input::{ConfigValue, FileRef, Input, NodeConfig, NodeOutputRef};
pub use node::{Node, NodeOutput, OutputConfig};
pub use pipeline::{Pipeline, RunSummary};
pub use runner::{into_node_outputs, with_cache, ItemOutcome, ItemProcessor, WorkItem, WorkReport};
pub use signature::content_signature;
