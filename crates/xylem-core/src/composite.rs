//! Support for composite nodes.
//!
//! A composite node registers internal sub-nodes when it is added to the
//! pipeline and exposes a mapped subset of their outputs as its own. Caching
//! happens at the sub-node level; the composite's `run` only forwards.

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::node::NodeOutput;

/// Maps one of a composite's own output keys to a sub-node's output key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMapping {
    /// Key the composite exposes.
    pub key: String,
    /// Internal sub-node that produced the paths.
    pub source_node: String,
    /// Output key on the sub-node.
    pub source_key: String,
}

impl OutputMapping {
    pub fn new(
        key: impl Into<String>,
        source_node: impl Into<String>,
        source_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            source_node: source_node.into(),
            source_key: source_key.into(),
        }
    }
}

/// Source a composite's outputs from its sub-nodes' recorded outputs.
///
/// Sub-nodes are scheduled before the composite (the composite depends on
/// them), so their outputs are available by the time this runs. A mapping
/// whose sub-node produced nothing under the source key is an error.
pub fn forward_outputs(
    ctx: &PipelineContext,
    mappings: &[OutputMapping],
) -> Result<Vec<NodeOutput>, PipelineError> {
    let mut forwarded = Vec::new();
    for mapping in mappings {
        let outputs =
            ctx.get_node_outputs(&mapping.source_node)
                .ok_or_else(|| PipelineError::UpstreamEmpty {
                    node: mapping.source_node.clone(),
                    key: mapping.source_key.clone(),
                })?;

        let mut found = false;
        for output in outputs {
            if let Some(paths) = output.get(&mapping.source_key) {
                forwarded.push(NodeOutput::single(mapping.key.clone(), paths.clone()));
                found = true;
            }
        }
        if !found {
            return Err(PipelineError::UpstreamEmpty {
                node: mapping.source_node.clone(),
                key: mapping.source_key.clone(),
            });
        }
    }
    Ok(forwarded)
}
