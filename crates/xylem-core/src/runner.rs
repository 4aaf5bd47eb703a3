//! The per-item cache-or-compute loop shared by all node implementations.
//!
//! A node's `run` resolves to a list of items, and for each item either
//! reuses a validated cache entry (copying the artifact if the expected
//! output location moved) or performs the work and records a fresh entry:
//! tracked file hashes, upstream output-set signatures, and produced paths.

use crate::cache::{CacheEntry, CacheStore, FileOrigin, TrackedFile, UpstreamSignature};
use crate::context::PipelineContext;
use crate::hasher;
use crate::input::{ConfigValue, Input, NodeOutputRef};
use crate::node::{Node, NodeOutput};
use crate::signature::content_signature;
use crate::validator;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One unit of work within a node.
///
/// Nodes with an items input get one `WorkItem` per resolved path. A node
/// without items processes a single synthetic item keyed by its content
/// signature (a transform driven entirely by its config).
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// The input file, absent for the synthetic item.
    pub path: Option<PathBuf>,
    /// Default cache key for this item.
    pub key: String,
}

impl WorkItem {
    /// Human-readable identity for log lines.
    pub fn display(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => self.key.clone(),
        }
    }
}

/// What a processor reports back after working on one item.
pub struct WorkReport<T> {
    /// Produced paths per output key. `None` means the single expected
    /// output path under the processor's default key.
    pub outputs: Option<BTreeMap<String, Vec<PathBuf>>>,
    /// Files the work turned out to depend on (imported stylesheets,
    /// `document()` reads); tracked so changes to them invalidate the entry.
    pub discovered_dependencies: Vec<PathBuf>,
    /// Arbitrary carry-over for the node's own bookkeeping.
    pub result: Option<T>,
}

impl<T> Default for WorkReport<T> {
    fn default() -> Self {
        Self {
            outputs: None,
            discovered_dependencies: Vec::new(),
            result: None,
        }
    }
}

impl<T> WorkReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(result: T) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn with_discovered(mut self, deps: Vec<PathBuf>) -> Self {
        self.discovered_dependencies = deps;
        self
    }
}

/// Per-item callbacks a node supplies to [`with_cache`].
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Carry-over type returned for freshly processed items.
    type Result: Send;

    /// Output key used when a report doesn't name its outputs.
    fn output_key(&self) -> &str {
        "out"
    }

    /// Cache key for an item. The default is derived from the item path.
    /// Overrides must stay unique per item; colliding keys silently
    /// overwrite each other.
    fn cache_key(&self, item: &WorkItem) -> String {
        item.key.clone()
    }

    /// Where this item's artifact is expected to land.
    fn output_path(&self, item: &WorkItem, ctx: &PipelineContext) -> PathBuf;

    /// Do the actual work for one item, writing to `output_path`.
    async fn process(
        &self,
        item: &WorkItem,
        output_path: &Path,
        ctx: &PipelineContext,
    ) -> anyhow::Result<WorkReport<Self::Result>>;
}

/// Result of running one item through [`with_cache`].
pub struct ItemOutcome<T> {
    pub item: WorkItem,
    pub outputs: NodeOutput,
    /// Whether the item was served from cache.
    pub cached: bool,
    /// The processor's carry-over; `None` for cached items.
    pub result: Option<T>,
}

/// Collect outcome outputs into the shape `Node::run` returns.
pub fn into_node_outputs<T>(outcomes: Vec<ItemOutcome<T>>) -> Vec<NodeOutput> {
    outcomes.into_iter().map(|o| o.outputs).collect()
}

/// Run a node's items through the cache.
///
/// Derives the node's content signature, assembles its config dependencies
/// and upstream output-set signatures, prunes cache entries for items that
/// no longer exist, and then serves each item from cache or hands it to the
/// processor. Configured file references are hashed once up front, so a
/// stylesheet shared by thousands of items costs one read.
pub async fn with_cache<P: ItemProcessor>(
    node: &dyn Node,
    ctx: &PipelineContext,
    processor: &P,
) -> anyhow::Result<Vec<ItemOutcome<P::Result>>> {
    let config = node.config();
    let items_input = node.items();
    let signature = content_signature(
        node.kind(),
        &config,
        items_input.as_ref(),
        ctx.project_root(),
    );

    let mut config_paths: Vec<PathBuf> = Vec::new();
    let mut upstream_sigs: BTreeMap<String, UpstreamSignature> = BTreeMap::new();
    for value in config.values() {
        match value {
            ConfigValue::File(f) => {
                config_paths.push(crate::input::absolutize(ctx.project_root(), &f.path));
            }
            ConfigValue::Output(r) => {
                let paths = ctx.resolve_input(&Input::Output(r.clone()))?;
                record_upstream(&mut upstream_sigs, r, &paths);
                config_paths.extend(paths);
            }
            ConfigValue::Json(_) => {}
        }
    }

    let items: Vec<WorkItem> = match &items_input {
        Some(input) => {
            for r in input.output_refs() {
                let paths = ctx.resolve_input(&Input::Output(r.clone()))?;
                record_upstream(&mut upstream_sigs, r, &paths);
            }
            ctx.resolve_input(input)?
                .into_iter()
                .map(|path| WorkItem {
                    key: hasher::make_item_key(std::slice::from_ref(&path)),
                    path: Some(path),
                })
                .collect()
        }
        None => vec![WorkItem {
            path: None,
            key: signature.clone(),
        }],
    };

    let keys: Vec<String> = items.iter().map(|i| processor.cache_key(i)).collect();
    ctx.cache().clean_except(&signature, &keys);

    let config_hashes = hasher::hash_files(&config_paths);

    let mut outcomes = Vec::with_capacity(items.len());
    for (item, key) in items.into_iter().zip(keys) {
        let expected = processor.output_path(&item, ctx);

        if let Some(entry) = ctx.cache().get(&signature, &key) {
            if validator::is_valid(&entry, ctx) {
                let outputs =
                    reuse_outputs(ctx.cache(), &entry, &expected, processor.output_key())?;
                ctx.log(&format!("Skipping: {} (cached)", item.display()));
                outcomes.push(ItemOutcome {
                    item,
                    outputs,
                    cached: true,
                    result: None,
                });
                continue;
            }
        }

        let report = processor.process(&item, &expected, ctx).await?;

        let outputs_map = report.outputs.unwrap_or_else(|| {
            BTreeMap::from([(processor.output_key().to_string(), vec![expected.clone()])])
        });

        let mut tracked: BTreeMap<PathBuf, TrackedFile> = BTreeMap::new();
        if let Some(path) = &item.path {
            track(&mut tracked, path, FileOrigin::Item, None)?;
        }
        for path in &config_paths {
            track(&mut tracked, path, FileOrigin::FileRef, config_hashes.get(path))?;
        }
        for path in &report.discovered_dependencies {
            track(&mut tracked, path, FileOrigin::Discovered, None)?;
        }

        let entry = CacheEntry {
            outputs_by_key: outputs_map.clone(),
            output_base_dir: expected
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            tracked_files: tracked,
            upstream_output_signatures: upstream_sigs.clone(),
            timestamp: now_millis(),
            item_key: key.clone(),
        };
        ctx.cache().set(&signature, &key, &entry)?;

        outcomes.push(ItemOutcome {
            item,
            outputs: outputs_map.into(),
            cached: false,
            result: report.result,
        });
    }

    Ok(outcomes)
}

fn record_upstream(
    sigs: &mut BTreeMap<String, UpstreamSignature>,
    r: &NodeOutputRef,
    paths: &[PathBuf],
) {
    sigs.insert(
        r.node.clone(),
        UpstreamSignature {
            signature: hasher::path_set_signature(paths),
            output_key: r.key.clone(),
            glob: r.glob.clone(),
        },
    );
}

fn track(
    tracked: &mut BTreeMap<PathBuf, TrackedFile>,
    path: &Path,
    origin: FileOrigin,
    precomputed: Option<&String>,
) -> anyhow::Result<()> {
    let hash = match precomputed {
        Some(hash) => hash.clone(),
        None => hasher::hash_file(path)?,
    };
    tracked.insert(
        path.to_path_buf(),
        TrackedFile {
            hash,
            mtime_ms: hasher::mtime_millis(path)?,
            origin,
        },
    );
    Ok(())
}

/// Reconstruct a cached item's outputs, copying artifacts whenever the
/// currently expected output path differs from where they were produced.
///
/// The artifact under the processor's own output key follows the expected
/// path exactly, so directory, filename, and extension changes all land at
/// the new location. Auxiliary outputs under other keys are rebased
/// directory-wise.
fn reuse_outputs(
    cache: &CacheStore,
    entry: &CacheEntry,
    expected: &Path,
    primary_key: &str,
) -> anyhow::Result<NodeOutput> {
    let expected_dir = expected.parent().unwrap_or_else(|| Path::new(""));

    let mut reused_outputs = BTreeMap::new();
    for (key, paths) in &entry.outputs_by_key {
        let mut reused = Vec::with_capacity(paths.len());
        for path in paths {
            let dst = if key.as_str() == primary_key && paths.len() == 1 {
                expected.to_path_buf()
            } else {
                let rel: PathBuf = match path.strip_prefix(&entry.output_base_dir) {
                    Ok(rel) => rel.to_path_buf(),
                    Err(_) => path.file_name().map(PathBuf::from).unwrap_or_default(),
                };
                expected_dir.join(rel)
            };
            if dst != *path {
                cache.copy_to_expected_path(path, &dst)?;
            }
            reused.push(dst);
        }
        reused_outputs.insert(key.clone(), reused);
    }
    Ok(reused_outputs.into())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
