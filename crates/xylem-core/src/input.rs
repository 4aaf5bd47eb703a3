//! Input data model: file references, upstream output references, and the
//! `Input` sum type nodes declare their sources with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A stable handle to a single file on disk.
///
/// Carries only a path; the semantics are "watch this file as a dependency".
/// Placed in a node's processing config, the path participates in the node's
/// content signature and the file's content hash is tracked per cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Path to the referenced file, relative to the project root or absolute.
    pub path: PathBuf,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// A reference to one keyed output set of another node, optionally narrowed
/// by a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutputRef {
    /// Name of the upstream node.
    pub node: String,
    /// Output key to read from the upstream node's outputs.
    pub key: String,
    /// Optional glob applied to the upstream paths.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub glob: Option<String>,
}

impl NodeOutputRef {
    pub fn new(node: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            key: key.into(),
            glob: None,
        }
    }

    /// Narrow the referenced output set to paths matching `pattern`.
    pub fn with_glob(mut self, pattern: impl Into<String>) -> Self {
        self.glob = Some(pattern.into());
        self
    }
}

/// What a node consumes: a glob, a list of inputs, or another node's output.
///
/// Resolution (see [`crate::context::PipelineContext::resolve_input`])
/// produces an ordered, de-duplicated list of concrete file paths; an empty
/// resolution is a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A glob pattern expanded against the project root.
    Glob(String),
    /// A list of inputs, resolved in order and concatenated.
    Many(Vec<Input>),
    /// One keyed output set of an upstream node.
    Output(NodeOutputRef),
}

impl Input {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Input::Glob(pattern.into())
    }

    /// Shorthand for referencing `node`'s outputs under `key`.
    pub fn from_output(node: impl Into<String>, key: impl Into<String>) -> Self {
        Input::Output(NodeOutputRef::new(node, key))
    }

    /// Every upstream output reference reachable from this input.
    pub fn output_refs(&self) -> Vec<&NodeOutputRef> {
        match self {
            Input::Glob(_) => Vec::new(),
            Input::Output(r) => vec![r],
            Input::Many(inputs) => inputs.iter().flat_map(|i| i.output_refs()).collect(),
        }
    }
}

impl From<&str> for Input {
    fn from(pattern: &str) -> Self {
        Input::Glob(pattern.to_string())
    }
}

impl From<NodeOutputRef> for Input {
    fn from(r: NodeOutputRef) -> Self {
        Input::Output(r)
    }
}

/// A value in a node's processing config.
///
/// Only the processing config contributes to a node's content signature;
/// `File` values contribute their absolute path (a stable identity), and
/// `Output` references additionally pull in an upstream-set signature at
/// cache time.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// An arbitrary JSON value (strings, numbers, nested objects).
    Json(serde_json::Value),
    /// A watched file.
    File(FileRef),
    /// An upstream output reference.
    Output(NodeOutputRef),
}

impl ConfigValue {
    pub fn json(value: impl Into<serde_json::Value>) -> Self {
        ConfigValue::Json(value.into())
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        ConfigValue::File(FileRef::new(path))
    }
}

impl From<FileRef> for ConfigValue {
    fn from(f: FileRef) -> Self {
        ConfigValue::File(f)
    }
}

impl From<NodeOutputRef> for ConfigValue {
    fn from(r: NodeOutputRef) -> Self {
        ConfigValue::Output(r)
    }
}

/// A node's processing config: string keys to values, sorted for
/// deterministic signature derivation.
pub type NodeConfig = BTreeMap<String, ConfigValue>;

/// Normalise a path against the project root. Absolute paths pass through.
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
