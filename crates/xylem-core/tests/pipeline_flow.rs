//! End-to-end pipeline behaviour: incremental reuse, invalidation, and
//! dependency ordering across full runs.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use xylem_core::{
    content_signature, forward_outputs, hasher, with_cache, CacheStore, ConfigValue, Input,
    ItemProcessor, Node, NodeConfig, NodeOutput, NodeOutputRef, OutputConfig, OutputMapping,
    Pipeline, PipelineContext, PipelineError, WorkItem, WorkReport,
};

/// (node name, cached) per processed item, in processing order.
type Recorder = Arc<Mutex<Vec<(String, bool)>>>;

fn recorded(recorder: &Recorder, node: &str) -> Vec<bool> {
    recorder
        .lock()
        .unwrap()
        .iter()
        .filter(|(n, _)| n == node)
        .map(|(_, cached)| *cached)
        .collect()
}

/// Copies each item into the build tree verbatim.
struct CopyNode {
    name: String,
    items: Input,
    target_dir: Option<PathBuf>,
    recorder: Recorder,
}

impl CopyNode {
    fn new(name: &str, items: Input, recorder: &Recorder) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items,
            target_dir: None,
            recorder: Arc::clone(recorder),
        })
    }

    fn with_target_dir(name: &str, items: Input, dir: PathBuf, recorder: &Recorder) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items,
            target_dir: Some(dir),
            recorder: Arc::clone(recorder),
        })
    }
}

#[async_trait]
impl ItemProcessor for CopyNode {
    type Result = ();

    fn output_path(&self, item: &WorkItem, ctx: &PipelineContext) -> PathBuf {
        let input = item.path.as_ref().unwrap();
        match self.output_config().output_dir {
            Some(dir) => dir.join(input.file_name().unwrap()),
            None => ctx.get_build_path(&self.name, input, None),
        }
    }

    async fn process(
        &self,
        item: &WorkItem,
        output_path: &Path,
        _ctx: &PipelineContext,
    ) -> anyhow::Result<WorkReport<()>> {
        fs::create_dir_all(output_path.parent().unwrap())?;
        fs::copy(item.path.as_ref().unwrap(), output_path)?;
        Ok(WorkReport::new())
    }
}

#[async_trait]
impl Node for CopyNode {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> &str {
        "Copy"
    }
    fn items(&self) -> Option<Input> {
        Some(self.items.clone())
    }
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            output_dir: self.target_dir.clone(),
            ..OutputConfig::default()
        }
    }
    async fn run(&self, ctx: &PipelineContext) -> anyhow::Result<Vec<NodeOutput>> {
        let outcomes = with_cache(self, ctx, self).await?;
        let mut recorder = self.recorder.lock().unwrap();
        for outcome in &outcomes {
            recorder.push((self.name.clone(), outcome.cached));
        }
        drop(recorder);
        Ok(xylem_core::into_node_outputs(outcomes))
    }
}

/// Prefixes each item with a configured stylesheet file's content.
struct TransformNode {
    name: String,
    items: Input,
    stylesheet: PathBuf,
    import: Option<PathBuf>,
    ext: String,
    recorder: Recorder,
}

impl TransformNode {
    fn new(
        name: &str,
        items: Input,
        stylesheet: PathBuf,
        import: Option<PathBuf>,
        recorder: &Recorder,
    ) -> Arc<Self> {
        Self::with_extension(name, items, stylesheet, import, "html", recorder)
    }

    fn with_extension(
        name: &str,
        items: Input,
        stylesheet: PathBuf,
        import: Option<PathBuf>,
        ext: &str,
        recorder: &Recorder,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            items,
            stylesheet,
            import,
            ext: ext.to_string(),
            recorder: Arc::clone(recorder),
        })
    }
}

#[async_trait]
impl ItemProcessor for TransformNode {
    type Result = ();

    fn output_path(&self, item: &WorkItem, ctx: &PipelineContext) -> PathBuf {
        let ext = self.output_config().extension;
        ctx.get_build_path(&self.name, item.path.as_ref().unwrap(), ext.as_deref())
    }

    async fn process(
        &self,
        item: &WorkItem,
        output_path: &Path,
        _ctx: &PipelineContext,
    ) -> anyhow::Result<WorkReport<()>> {
        let style = fs::read_to_string(&self.stylesheet)?;
        let content = fs::read_to_string(item.path.as_ref().unwrap())?;
        fs::create_dir_all(output_path.parent().unwrap())?;
        fs::write(output_path, format!("{style}:{content}"))?;

        let mut report = WorkReport::new();
        if let Some(import) = &self.import {
            report = report.with_discovered(vec![import.clone()]);
        }
        Ok(report)
    }
}

#[async_trait]
impl Node for TransformNode {
    fn name(&self) -> &str {
        &self.name
    }
    fn kind(&self) -> &str {
        "Transform"
    }
    fn items(&self) -> Option<Input> {
        Some(self.items.clone())
    }
    fn config(&self) -> NodeConfig {
        NodeConfig::from([(
            "stylesheet".to_string(),
            ConfigValue::file(self.stylesheet.clone()),
        )])
    }
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            extension: Some(self.ext.clone()),
            ..OutputConfig::default()
        }
    }
    async fn run(&self, ctx: &PipelineContext) -> anyhow::Result<Vec<NodeOutput>> {
        let outcomes = with_cache(self, ctx, self).await?;
        let mut recorder = self.recorder.lock().unwrap();
        for outcome in &outcomes {
            recorder.push((self.name.clone(), outcome.cached));
        }
        drop(recorder);
        Ok(xylem_core::into_node_outputs(outcomes))
    }
}

fn project() -> (tempfile::TempDir, PathBuf, Recorder) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    fs::create_dir_all(root.join("src")).unwrap();
    (dir, root, Arc::new(Mutex::new(Vec::new())))
}

/// Build a fresh two-node pipeline: `a` copies `src/*.txt`, `b` consumes
/// `a`'s outputs. Reconstructed per run to prove nothing leaks in memory.
fn two_node_pipeline(root: &Path, recorder: &Recorder) -> Pipeline {
    let mut p = Pipeline::new(root);
    p.add(CopyNode::new("a", Input::glob("src/*.txt"), recorder))
        .unwrap();
    p.add(CopyNode::new("b", Input::from_output("a", "out"), recorder))
        .unwrap();
    p
}

#[tokio::test]
async fn glob_with_no_matches_fails_the_node() {
    let (_dir, root, recorder) = project();

    let mut p = Pipeline::new(&root);
    p.add(CopyNode::new("a", Input::glob("inputs/*.xml"), &recorder))
        .unwrap();

    let err = p.run().await.unwrap_err();
    assert!(matches!(&err, PipelineError::NodeFailed { node, .. } if node.as_str() == "a"));
    assert!(err
        .to_string()
        .contains("No files found for pattern: inputs/*.xml"));
}

#[tokio::test]
async fn unchanged_pipeline_is_fully_cached_on_second_run() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "1").unwrap();

    two_node_pipeline(&root, &recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "a"), vec![false]);
    assert_eq!(recorded(&recorder, "b"), vec![false]);

    // Brand new pipeline and node instances, same directories.
    recorder.lock().unwrap().clear();
    let summary = two_node_pipeline(&root, &recorder).run().await.unwrap();

    assert_eq!(recorded(&recorder, "a"), vec![true]);
    assert_eq!(recorded(&recorder, "b"), vec![true]);
    assert_eq!(
        summary.outputs["b"][0].get("out").unwrap(),
        &vec![root.join("build/b/src/x.txt")]
    );
}

#[tokio::test]
async fn upstream_content_change_reruns_downstream() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "1").unwrap();

    two_node_pipeline(&root, &recorder).run().await.unwrap();

    fs::write(root.join("src/x.txt"), "2").unwrap();
    recorder.lock().unwrap().clear();
    two_node_pipeline(&root, &recorder).run().await.unwrap();

    assert_eq!(recorded(&recorder, "a"), vec![false]);
    assert_eq!(recorded(&recorder, "b"), vec![false]);

    // The fresh entry for b tracks the new content of a's output.
    let b_item = root.join("build/a/src/x.txt");
    let sig = content_signature(
        "Copy",
        &NodeConfig::new(),
        Some(&Input::from_output("a", "out")),
        &root,
    );
    let store = CacheStore::new(root.join(".xylem/cache"));
    let entry = store
        .get(&sig, &hasher::make_item_key(std::slice::from_ref(&b_item)))
        .unwrap();
    assert_eq!(entry.tracked_files[&b_item].hash, hasher::sha256_hex(b"2"));
}

#[tokio::test]
async fn upstream_set_change_invalidates_downstream() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/a.txt"), "a").unwrap();
    fs::write(root.join("src/b.txt"), "b").unwrap();

    two_node_pipeline(&root, &recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "b"), vec![false, false]);

    // a now produces one item fewer; b's surviving entry must notice the
    // shrunken upstream set even though its own input file is untouched.
    fs::remove_file(root.join("src/b.txt")).unwrap();
    recorder.lock().unwrap().clear();
    two_node_pipeline(&root, &recorder).run().await.unwrap();

    assert_eq!(recorded(&recorder, "b"), vec![false]);
}

#[tokio::test]
async fn touch_without_change_keeps_entry_and_timestamp() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "same").unwrap();

    let mut p = Pipeline::new(&root);
    p.add(CopyNode::new("a", Input::glob("src/*.txt"), &recorder))
        .unwrap();
    p.run().await.unwrap();

    let sig = content_signature(
        "Copy",
        &NodeConfig::new(),
        Some(&Input::glob("src/*.txt")),
        &root,
    );
    let item = root.join("src/x.txt");
    let key = hasher::make_item_key(std::slice::from_ref(&item));
    let store = CacheStore::new(root.join(".xylem/cache"));
    let before = store.get(&sig, &key).unwrap();

    // Touch: rewrite identical content.
    fs::write(&item, "same").unwrap();

    recorder.lock().unwrap().clear();
    let mut p = Pipeline::new(&root);
    p.add(CopyNode::new("a", Input::glob("src/*.txt"), &recorder))
        .unwrap();
    p.run().await.unwrap();

    assert_eq!(recorded(&recorder, "a"), vec![true]);
    let after = store.get(&sig, &key).unwrap();
    assert_eq!(after.timestamp, before.timestamp);
}

#[tokio::test]
async fn explicit_dependency_cycle_runs_nothing() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "x").unwrap();

    let mut p = Pipeline::new(&root);
    for (name, dep) in [("a", "b"), ("b", "c"), ("c", "a")] {
        p.add(CopyNode::new(name, Input::glob("src/*.txt"), &recorder))
            .unwrap();
        p.add_explicit_dependency(name, dep);
    }

    let err = p.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Cycle(_)));
    assert!(recorder.lock().unwrap().is_empty());
}

#[tokio::test]
async fn moving_the_output_dir_reuses_the_cached_artifact() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "payload").unwrap();

    let mut p = Pipeline::new(&root);
    p.add(CopyNode::new("a", Input::glob("src/*.txt"), &recorder))
        .unwrap();
    p.run().await.unwrap();

    // Same processing config, different destination: still a cache hit, and
    // the artifact shows up at the new location via copy.
    let moved = root.join("published");
    recorder.lock().unwrap().clear();
    let mut p = Pipeline::new(&root);
    p.add(CopyNode::with_target_dir(
        "a",
        Input::glob("src/*.txt"),
        moved.clone(),
        &recorder,
    ))
    .unwrap();
    let summary = p.run().await.unwrap();

    assert_eq!(recorded(&recorder, "a"), vec![true]);
    let out = moved.join("x.txt");
    assert_eq!(fs::read_to_string(&out).unwrap(), "payload");
    assert_eq!(summary.outputs["a"][0].get("out").unwrap(), &vec![out]);
}

#[tokio::test]
async fn extension_change_is_cache_transparent_to_consumers() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/a.txt"), "a").unwrap();
    let stylesheet = root.join("page.xsl");
    fs::write(&stylesheet, "v1").unwrap();

    let mut p = Pipeline::new(&root);
    p.add(TransformNode::new(
        "render",
        Input::glob("src/*.txt"),
        stylesheet.clone(),
        None,
        &recorder,
    ))
    .unwrap();
    p.run().await.unwrap();

    // Same processing config, new output extension. The consumer globs on
    // the new extension and must see the renamed artifact.
    recorder.lock().unwrap().clear();
    let mut p = Pipeline::new(&root);
    p.add(TransformNode::with_extension(
        "render",
        Input::glob("src/*.txt"),
        stylesheet.clone(),
        None,
        "htm",
        &recorder,
    ))
    .unwrap();
    p.add(CopyNode::new(
        "publish",
        Input::Output(NodeOutputRef::new("render", "out").with_glob("src/*.htm")),
        &recorder,
    ))
    .unwrap();
    let summary = p.run().await.unwrap();

    assert_eq!(recorded(&recorder, "render"), vec![true]);
    let renamed = root.join("build/render/src/a.htm");
    assert_eq!(fs::read_to_string(&renamed).unwrap(), "v1:a");
    assert_eq!(
        summary.outputs["render"][0].get("out").unwrap(),
        &vec![renamed]
    );
    assert_eq!(
        summary.outputs["publish"][0].get("out").unwrap(),
        &vec![root.join("build/publish/src/a.htm")]
    );
}

#[tokio::test]
async fn stylesheet_change_invalidates_every_item() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/a.txt"), "a").unwrap();
    fs::write(root.join("src/b.txt"), "b").unwrap();
    let stylesheet = root.join("page.xsl");
    fs::write(&stylesheet, "v1").unwrap();

    let build = |recorder: &Recorder| {
        let mut p = Pipeline::new(&root);
        p.add(TransformNode::new(
            "render",
            Input::glob("src/*.txt"),
            stylesheet.clone(),
            None,
            recorder,
        ))
        .unwrap();
        p
    };

    build(&recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "render"), vec![false, false]);

    recorder.lock().unwrap().clear();
    build(&recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "render"), vec![true, true]);

    fs::write(&stylesheet, "v2").unwrap();
    recorder.lock().unwrap().clear();
    build(&recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "render"), vec![false, false]);
    assert_eq!(
        fs::read_to_string(root.join("build/render/src/a.html")).unwrap(),
        "v2:a"
    );
}

#[tokio::test]
async fn discovered_dependency_change_invalidates() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/a.txt"), "a").unwrap();
    let stylesheet = root.join("page.xsl");
    fs::write(&stylesheet, "v1").unwrap();
    let import = root.join("shared.xsl");
    fs::write(&import, "i1").unwrap();

    let build = |recorder: &Recorder| {
        let mut p = Pipeline::new(&root);
        p.add(TransformNode::new(
            "render",
            Input::glob("src/*.txt"),
            stylesheet.clone(),
            Some(import.clone()),
            recorder,
        ))
        .unwrap();
        p
    };

    build(&recorder).run().await.unwrap();

    recorder.lock().unwrap().clear();
    build(&recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "render"), vec![true]);

    // The import was never named in the config, only discovered at work
    // time; changing it must still invalidate.
    fs::write(&import, "i2").unwrap();
    recorder.lock().unwrap().clear();
    build(&recorder).run().await.unwrap();
    assert_eq!(recorded(&recorder, "render"), vec![false]);
}

#[tokio::test]
async fn deleted_output_is_rebuilt() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "x").unwrap();

    let mut p = Pipeline::new(&root);
    p.add(CopyNode::new("a", Input::glob("src/*.txt"), &recorder))
        .unwrap();
    p.run().await.unwrap();

    fs::remove_file(root.join("build/a/src/x.txt")).unwrap();

    recorder.lock().unwrap().clear();
    let mut p = Pipeline::new(&root);
    p.add(CopyNode::new("a", Input::glob("src/*.txt"), &recorder))
        .unwrap();
    p.run().await.unwrap();

    assert_eq!(recorded(&recorder, "a"), vec![false]);
    assert!(root.join("build/a/src/x.txt").exists());
}

/// A composite that wraps an internal copy node and republishes its `out`
/// key as `pages`.
struct PageGroup {
    recorder: Recorder,
}

#[async_trait]
impl Node for PageGroup {
    fn name(&self) -> &str {
        "pages"
    }
    fn explicit_dependencies(&self) -> Vec<String> {
        vec!["pages-copy".to_string()]
    }
    fn on_added_to_pipeline(&self, pipeline: &mut Pipeline) {
        pipeline
            .add(CopyNode::new(
                "pages-copy",
                Input::glob("src/*.txt"),
                &self.recorder,
            ))
            .unwrap();
    }
    async fn run(&self, ctx: &PipelineContext) -> anyhow::Result<Vec<NodeOutput>> {
        Ok(forward_outputs(
            ctx,
            &[OutputMapping::new("pages", "pages-copy", "out")],
        )?)
    }
}

#[tokio::test]
async fn composite_registers_sub_nodes_and_forwards_outputs() {
    let (_dir, root, recorder) = project();
    fs::write(root.join("src/x.txt"), "x").unwrap();

    let mut p = Pipeline::new(&root);
    p.add(Arc::new(PageGroup {
        recorder: Arc::clone(&recorder),
    }))
    .unwrap();
    // A consumer of the composite's mapped key.
    p.add(CopyNode::new(
        "publish",
        Input::from_output("pages", "pages"),
        &recorder,
    ))
    .unwrap();

    let summary = p.run().await.unwrap();

    let pos = |n: &str| summary.order.iter().position(|x| x == n).unwrap();
    assert!(pos("pages-copy") < pos("pages"));
    assert!(pos("pages") < pos("publish"));
    assert_eq!(
        summary.outputs["publish"][0].get("out").unwrap(),
        &vec![root.join("build/publish/src/x.txt")]
    );
}
