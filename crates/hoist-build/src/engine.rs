//! ビルドオーケストレーター
//!
//! コンパイル済みのイメージグラフからビルド対象を解決し、ノードごとに
//! タスクを起動してドライバーをディスパッチャーに投入する。
//! 成功したノードはカスケードモードで子イメージのビルドを続ける。

use crate::dispatch::{Dispatcher, Job};
use crate::driver::{DRYRUN_DRIVER, Driver, DriverRegistry};
use crate::error::{BuildError, BuildResult};
use crate::options::BuildOptions;
use crate::semver::SemVer;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use hoist_core::{
    Builder, BuilderRef, Builders, Image, ImageFilter, ImagesGraph, ResolvedNode, VarMapping,
    image_row,
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// カスケードの深さ無制限
pub const UNLIMITED_DEPTH: i32 = -1;

pub struct Engine {
    graph: Arc<ImagesGraph>,
    builders: Arc<Builders>,
    drivers: Arc<DriverRegistry>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        graph: Arc<ImagesGraph>,
        builders: Arc<Builders>,
        drivers: Arc<DriverRegistry>,
        dispatcher: Dispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            graph,
            builders,
            drivers,
            dispatcher,
            cancel,
        }
    }

    pub fn graph(&self) -> &ImagesGraph {
        &self.graph
    }

    pub fn builders(&self) -> &Builders {
        &self.builders
    }

    /// ビルド全体のキャンセルトークン
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 名前とバージョンからビルド対象のノードを解決
    ///
    /// バージョン指定が無ければ名前の全ノード。指定がある場合は
    /// 完全一致、無ければワイルドカードから合成する。解決できない
    /// バージョンは読み飛ばし、結果が空のときだけエラーにする
    /// （`*` だけを1つ指定した場合は空でもエラーにしない）。
    pub fn find_nodes(&self, name: &str, versions: &[String]) -> BuildResult<Vec<ResolvedNode>> {
        if versions.is_empty() {
            let ids = self.graph.find(name, "")?;
            if ids.is_empty() {
                return Err(no_matching_images(name, versions));
            }
            return Ok(ids.into_iter().map(ResolvedNode::Indexed).collect());
        }

        let mut nodes = Vec::new();
        for version in versions {
            match self.graph.find(name, version) {
                Ok(ids) => nodes.extend(ids.into_iter().map(ResolvedNode::Indexed)),
                Err(e) => {
                    debug!(image = %name, version = %version, error = %e, "Trying wildcard version");
                    match self.graph.expand_wildcard(name, version) {
                        Ok(node) => nodes.push(ResolvedNode::Synthetic(Arc::new(node))),
                        Err(e) => {
                            debug!(image = %name, version = %version, error = %e, "Version skipped");
                        }
                    }
                }
            }
        }

        if nodes.is_empty() {
            let only_wildcard = versions.len() == 1
                && self.graph.index().is_wildcard_version(name, &versions[0]);
            if !only_wildcard {
                return Err(no_matching_images(name, versions));
            }
        }

        Ok(nodes)
    }

    /// イメージをビルド
    ///
    /// 解決した全ノードを並行してビルドし、失敗は全て集約して返す。
    /// `depth` は `-1` で無制限、`0` でカスケードしない。
    #[instrument(skip(self, versions, options), fields(image = %name))]
    pub async fn build(
        self: &Arc<Self>,
        name: &str,
        versions: &[String],
        options: BuildOptions,
        depth: i32,
    ) -> BuildResult<()> {
        self.dispatcher.start();

        let nodes = self.find_nodes(name, versions)?;
        if nodes.is_empty() {
            info!("No images to build");
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for (idx, node) in nodes.into_iter().enumerate() {
            let engine = self.clone();
            let options = options.clone();
            tasks.spawn(async move { (idx, engine.build_worker(node, options, depth).await) });
        }

        let errors = collect_errors(tasks).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Aggregate {
                context: format!("Failed to build '{}'", name),
                errors,
            })
        }
    }

    fn build_worker(
        self: Arc<Self>,
        node: ResolvedNode,
        options: BuildOptions,
        depth: i32,
    ) -> BoxFuture<'static, BuildResult<()>> {
        async move {
            let key = node.key(&self.graph)?;
            let image = node.image(&self.graph)?;
            let original_options = options.clone();

            let (label, driver) = self
                .prepare(&node, &image, options)
                .map_err(|e| node_failure(&key, e))?;

            let (job, done) = Job::new(label, driver);
            self.dispatcher
                .enqueue(job)
                .map_err(|e| node_failure(&key, e))?;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => Err(BuildError::Cancelled),
                result = done => result.unwrap_or(Err(BuildError::DispatcherClosed)),
            };
            result.map_err(|e| node_failure(&key, e))?;
            info!(image = %key, "Image built");

            if !original_options.cascade || depth == 0 {
                return Ok(());
            }
            self.cascade(&node, &key, original_options, depth - 1).await
        }
        .boxed()
    }

    /// ビルドオプションを解決し、ドライバーを作る
    fn prepare(
        &self,
        node: &ResolvedNode,
        image: &Image,
        mut options: BuildOptions,
    ) -> BuildResult<(String, Box<dyn Driver>)> {
        if options.image_name.is_empty() {
            options.image_name = image.name.clone();
        }
        options.image_version = image.version.clone();

        let mut tags = Vec::new();
        if options.enable_semver_tags {
            tags.extend(self.semver_tags(&options));
        }
        tags.append(&mut options.tags);
        tags.extend(image.tags.iter().cloned());
        let mut seen = std::collections::BTreeSet::new();
        tags.retain(|tag| seen.insert(tag.clone()));
        options.tags = tags;

        for (key, value) in &image.persistent_vars {
            options
                .persistent_vars
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in &image.vars {
            options
                .vars
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        if options.registry_host.is_empty() {
            options.registry_host = image.registry_host.clone();
        }
        if options.registry_namespace.is_empty() {
            options.registry_namespace = image.registry_namespace.clone();
        }

        let builder = self.resolve_builder(image)?;
        options.builder_options = builder.options.clone();
        let mut mappings = builder.variables_mapping.clone();
        mappings.combine(&VarMapping::with_defaults());
        options.builder_var_mappings = mappings;
        options.builder_name = builder_name(&options);

        let driver_name = if options.dry_run {
            DRYRUN_DRIVER.to_string()
        } else {
            builder.driver.clone()
        };
        let factory = self
            .drivers
            .get(&driver_name)
            .ok_or_else(|| BuildError::DriverNotFound(driver_name.clone()))?;

        match node.parent_image(&self.graph) {
            Ok(Some(parent)) => backfill_parent(&mut options, &parent),
            Ok(None) => {}
            Err(e) => warn!(image = %image.key(), error = %e, "Parent image lookup failed"),
        }

        if options.output_prefix.is_empty() {
            options.output_prefix = hoist_core::node_key(&options.image_name, &options.image_version);
        }

        debug!(image = %image.key(), driver = %driver_name, "Build options resolved");
        let label = options.output_prefix.clone();
        let driver = factory(options).map_err(|e| BuildError::DriverInstantiation {
            driver: driver_name,
            message: e.to_string(),
        })?;
        Ok((label, driver))
    }

    fn semver_tags(&self, options: &BuildOptions) -> Vec<String> {
        let version = match SemVer::parse(&options.image_version) {
            Ok(version) => version,
            Err(e) => {
                warn!(version = %options.image_version, error = %e, "Semantic version tags skipped");
                return Vec::new();
            }
        };
        match version.version_tree(&options.semver_tags_templates) {
            Ok(tags) => tags,
            Err(e) => {
                warn!(version = %options.image_version, error = %e, "Semantic version tags skipped");
                Vec::new()
            }
        }
    }

    fn resolve_builder(&self, image: &Image) -> BuildResult<Builder> {
        match &image.builder {
            Some(BuilderRef::Reference(name)) => Ok(self.builders.get(name)?.clone()),
            Some(BuilderRef::Inline(builder)) => {
                let mut builder = builder.clone();
                builder.sanitize(&image.name);
                Ok(builder)
            }
            None => Err(BuildError::BuilderUndefined(image.key())),
        }
    }

    /// 子イメージを並行してビルド
    async fn cascade(
        self: &Arc<Self>,
        node: &ResolvedNode,
        key: &str,
        options: BuildOptions,
        depth: i32,
    ) -> BuildResult<()> {
        let mut tasks = JoinSet::new();
        match node {
            // 合成ノードの子は合成済みの親を引き継ぐ
            ResolvedNode::Synthetic(synthetic) => {
                for (idx, child) in synthetic.children().iter().enumerate() {
                    let engine = self.clone();
                    let options = options.clone();
                    let child = ResolvedNode::Synthetic(Arc::new(child.clone()));
                    tasks.spawn(async move {
                        (idx, engine.build_worker(child, options, depth).await)
                    });
                }
            }
            ResolvedNode::Indexed(_) => {
                for (idx, child) in node.child_images(&self.graph)?.into_iter().enumerate() {
                    let engine = self.clone();
                    let options = options.clone();
                    tasks.spawn(async move {
                        let versions = [child.version.clone()];
                        (idx, engine.build(&child.name, &versions, options, depth).await)
                    });
                }
            }
        }

        if tasks.is_empty() {
            return Ok(());
        }
        debug!(image = %key, children = tasks.len(), "Cascading build");

        let errors = collect_errors(tasks).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BuildError::Cascade {
                image: key.to_string(),
                errors,
            })
        }
    }

    /// 全イメージの一覧 (NAME, VERSION, BUILDER, NAMESPACE, REGISTRY, PARENT)
    pub fn list_images(&self, filters: &[ImageFilter]) -> BuildResult<Vec<Vec<String>>> {
        Ok(self.graph.list_images(filters)?)
    }

    /// 解決したイメージのうち `filters` に一致するものの一覧
    pub fn find_images(
        &self,
        name: &str,
        versions: &[String],
        filters: &[ImageFilter],
    ) -> BuildResult<Vec<Vec<String>>> {
        let mut rows = Vec::new();
        for node in self.find_nodes(name, versions)? {
            let image = node.image(&self.graph)?;
            if !ImageFilter::all_match(filters, &image) {
                continue;
            }
            let parent = node
                .parent_image(&self.graph)?
                .map(|parent| parent.key())
                .unwrap_or_else(|| "-".to_string());
            rows.push(image_row(&image, parent));
        }
        Ok(rows)
    }

    /// グラフをツリー形式で描画
    pub fn draw_graph(&self) -> BuildResult<String> {
        Ok(self.graph.draw()?)
    }
}

/// `builder_<namespace>_<name>_<version>`（空の要素は省く）
fn builder_name(options: &BuildOptions) -> String {
    [
        "builder",
        options.registry_namespace.as_str(),
        options.image_name.as_str(),
        options.image_version.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join("_")
}

/// 親イメージの値で未設定の `image_from_*` を埋める
fn backfill_parent(options: &mut BuildOptions, parent: &Image) {
    let fields = [
        (&mut options.image_from_name, &parent.name),
        (&mut options.image_from_version, &parent.version),
        (
            &mut options.image_from_registry_namespace,
            &parent.registry_namespace,
        ),
        (&mut options.image_from_registry_host, &parent.registry_host),
    ];
    for (field, value) in fields {
        if field.is_empty() {
            *field = value.clone();
        }
    }
}

fn node_failure(key: &str, error: BuildError) -> BuildError {
    BuildError::ImageBuild {
        image: key.to_string(),
        source: Box::new(error),
    }
}

fn no_matching_images(name: &str, versions: &[String]) -> BuildError {
    BuildError::NoMatchingImages {
        name: name.to_string(),
        versions: if versions.is_empty() {
            "-".to_string()
        } else {
            versions.join(", ")
        },
    }
}

/// タスクの結果を起動順に並べ、エラーだけを返す
async fn collect_errors(mut tasks: JoinSet<(usize, BuildResult<()>)>) -> Vec<BuildError> {
    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => results.push((
                usize::MAX,
                Err(BuildError::BuildFailed(format!("Build task aborted: {}", e))),
            )),
        }
    }
    results.sort_by_key(|(idx, _)| *idx);
    results
        .into_iter()
        .filter_map(|(_, result)| result.err())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hoist_core::ImagesTree;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<BuildOptions>>>;

    /// 受け取ったオプションを記録するドライバー
    struct RecordingDriver {
        options: BuildOptions,
        log: Log,
        fail_version: Option<String>,
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        fn name(&self) -> &str {
            "recording"
        }

        async fn run(&self, _cancel: CancellationToken) -> BuildResult<()> {
            self.log.lock().unwrap().push(self.options.clone());
            if self.fail_version.as_deref() == Some(self.options.image_version.as_str()) {
                return Err(BuildError::DriverFailed("exit status 1".to_string()));
            }
            Ok(())
        }
    }

    fn recording_image(name: &str, version: &str) -> Image {
        Image::new(name, version).with_builder(BuilderRef::Reference("rec".to_string()))
    }

    fn engine(tree: &ImagesTree, fail_version: Option<&str>) -> (Arc<Engine>, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut drivers = DriverRegistry::with_defaults();
        let driver_log = log.clone();
        let fail_version = fail_version.map(str::to_string);
        drivers
            .register("recording", move |options| {
                Ok(Box::new(RecordingDriver {
                    options,
                    log: driver_log.clone(),
                    fail_version: fail_version.clone(),
                }) as Box<dyn Driver>)
            })
            .unwrap();

        let mut builders = Builders::new();
        builders.add(Builder::new("rec", "recording")).unwrap();

        let cancel = CancellationToken::new();
        let graph = ImagesGraph::compile(tree).unwrap();
        let engine = Engine::new(
            Arc::new(graph),
            Arc::new(builders),
            Arc::new(drivers),
            Dispatcher::new(2, cancel.clone()).unwrap(),
            cancel,
        );
        (Arc::new(engine), log)
    }

    fn built(log: &Log) -> Vec<String> {
        let mut keys: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .map(|o| hoist_core::node_key(&o.image_name, &o.image_version))
            .collect();
        keys.sort();
        keys
    }

    fn chain_tree() -> ImagesTree {
        let mut tree = ImagesTree::new();
        tree.insert("base", "1", recording_image("base", "1").with_child("app", &["1"]));
        tree.insert("app", "1", recording_image("app", "1").with_child("web", &["1"]));
        tree.insert("web", "1", recording_image("web", "1"));
        tree
    }

    fn cascade_options() -> BuildOptions {
        BuildOptions {
            cascade: true,
            ..Default::default()
        }
    }

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cascade_depth_zero() {
        let (engine, log) = engine(&chain_tree(), None);
        engine
            .build("base", &versions(&["1"]), cascade_options(), 0)
            .await
            .unwrap();
        assert_eq!(built(&log), vec!["base:1"]);
    }

    #[tokio::test]
    async fn test_cascade_depth_one() {
        let (engine, log) = engine(&chain_tree(), None);
        engine
            .build("base", &versions(&["1"]), cascade_options(), 1)
            .await
            .unwrap();
        assert_eq!(built(&log), vec!["app:1", "base:1"]);
    }

    #[tokio::test]
    async fn test_cascade_unlimited() {
        let (engine, log) = engine(&chain_tree(), None);
        engine
            .build("base", &versions(&["1"]), cascade_options(), UNLIMITED_DEPTH)
            .await
            .unwrap();
        assert_eq!(built(&log), vec!["app:1", "base:1", "web:1"]);
    }

    #[tokio::test]
    async fn test_cascade_disabled() {
        let (engine, log) = engine(&chain_tree(), None);
        engine
            .build("base", &versions(&["1"]), BuildOptions::default(), UNLIMITED_DEPTH)
            .await
            .unwrap();
        assert_eq!(built(&log), vec!["base:1"]);
    }

    #[tokio::test]
    async fn test_cascade_children_get_parent_values() {
        let (engine, log) = engine(&chain_tree(), None);
        let options = BuildOptions {
            image_name: "renamed".to_string(),
            ..cascade_options()
        };
        engine
            .build("base", &versions(&["1"]), options, 1)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        let child = log.iter().find(|o| o.image_version == "1" && o.image_from_name == "base");
        // 子は親のオプション変更を引き継がず、元のオプションを受け取る
        let child = child.unwrap();
        assert_eq!(child.image_name, "renamed");
        assert_eq!(child.image_from_version, "1");
        assert_eq!(child.builder_name, "builder_renamed_1");
    }

    #[tokio::test]
    async fn test_variable_precedence() {
        let mut tree = ImagesTree::new();
        tree.insert(
            "php",
            "7.2",
            recording_image("php", "7.2")
                .with_var("v", json!("image"))
                .with_var("w", json!("image")),
        );
        let source = tree.clone();
        let (engine, log) = engine(&tree, None);

        let mut options = BuildOptions::default();
        options.vars.insert("v".to_string(), json!("caller"));
        engine
            .build("php", &versions(&["7.2"]), options, 0)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0].vars["v"], json!("caller"));
        assert_eq!(log[0].vars["w"], json!("image"));
        assert_eq!(log[0].vars.len(), 2);
        // 元のイメージツリーは変更されない
        assert_eq!(engine.graph().source(), &source);
    }

    #[tokio::test]
    async fn test_partial_failure_aggregation() {
        let mut tree = ImagesTree::new();
        for version in ["1", "2", "3"] {
            tree.insert("svc", version, recording_image("svc", version));
        }
        let (engine, log) = engine(&tree, Some("2"));

        let error = engine
            .build("svc", &[], BuildOptions::default(), 0)
            .await
            .unwrap_err();

        assert_eq!(built(&log), vec!["svc:1", "svc:2", "svc:3"]);
        let failed: Vec<&str> = error.failures().iter().filter_map(|e| e.image()).collect();
        assert_eq!(failed, vec!["svc:2"]);
        assert!(error.to_string().contains("svc:2"));
        assert!(!error.to_string().contains("svc:1"));
    }

    #[tokio::test]
    async fn test_cascade_failure_names_parent() {
        let mut tree = ImagesTree::new();
        tree.insert("base", "1", recording_image("base", "1").with_child("app", &["2"]));
        tree.insert("app", "2", recording_image("app", "2"));
        let (engine, _log) = engine(&tree, Some("2"));

        let error = engine
            .build("base", &versions(&["1"]), cascade_options(), UNLIMITED_DEPTH)
            .await
            .unwrap_err();

        let message = error.to_string();
        assert!(message.contains("Children of 'base:1' failed to build"));
        assert!(message.contains("app:2@base:1"));
    }

    #[tokio::test]
    async fn test_wildcard_expansion_build() {
        let mut tree = ImagesTree::new();
        tree.insert("app", "*", recording_image("app", "*").with_child("base", &["*"]));
        tree.insert("base", "*", recording_image("base", "*"));
        let (engine, log) = engine(&tree, None);

        engine
            .build("app", &versions(&["9.9"]), cascade_options(), UNLIMITED_DEPTH)
            .await
            .unwrap();
        assert_eq!(built(&log), vec!["app:9.9", "base:9.9"]);

        let log = log.lock().unwrap();
        let base = log.iter().find(|o| o.image_name == "base").unwrap();
        assert_eq!(base.image_from_name, "app");
        assert_eq!(base.image_from_version, "9.9");
        // 合成ノードはインデックスに登録されない
        assert!(engine.graph().find("app", "9.9").is_err());
    }

    #[tokio::test]
    async fn test_wildcard_key_is_not_an_error() {
        let mut tree = ImagesTree::new();
        tree.insert("app", "*", recording_image("app", "*"));
        let (engine, log) = engine(&tree, None);

        // `*` だけを指定した場合は空の結果でもエラーにならない
        assert!(engine.find_nodes("app", &versions(&["*"])).unwrap().is_empty());
        engine
            .build("app", &versions(&["*"]), BuildOptions::default(), 0)
            .await
            .unwrap();
        assert!(built(&log).is_empty());
    }

    #[test]
    fn test_find_nodes_errors() {
        let (engine, _log) = engine(&chain_tree(), None);

        assert!(matches!(
            engine.find_nodes("missing", &versions(&["1"])),
            Err(BuildError::NoMatchingImages { .. })
        ));
        assert!(matches!(
            engine.find_nodes("base", &versions(&["1", "2"])).map(|n| n.len()),
            Ok(1)
        ));
        assert!(matches!(
            engine.find_nodes("base", &versions(&["7", "8"])),
            Err(BuildError::NoMatchingImages { .. })
        ));
        assert!(matches!(
            engine.find_nodes("missing", &[]),
            Err(BuildError::Resolve(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_uses_default_driver() {
        let (engine, log) = engine(&chain_tree(), None);
        let options = BuildOptions {
            dry_run: true,
            ..Default::default()
        };
        engine
            .build("base", &versions(&["1"]), options, 0)
            .await
            .unwrap();
        assert!(built(&log).is_empty());
    }

    #[tokio::test]
    async fn test_undefined_builder() {
        let mut tree = ImagesTree::new();
        tree.insert("bare", "1", Image::new("bare", "1"));
        let (engine, _log) = engine(&tree, None);

        let error = engine
            .build("bare", &versions(&["1"]), BuildOptions::default(), 0)
            .await
            .unwrap_err();
        let failures = error.failures();
        assert!(matches!(
            failures[0],
            BuildError::ImageBuild { source, .. } if matches!(**source, BuildError::BuilderUndefined(_))
        ));
    }

    #[tokio::test]
    async fn test_caller_persistent_vars_win() {
        let mut tree = ImagesTree::new();
        tree.insert(
            "php",
            "7.2",
            recording_image("php", "7.2")
                .with_persistent_var("p", json!("image"))
                .with_persistent_var("q", json!("image")),
        );
        let (engine, log) = engine(&tree, None);

        let mut options = BuildOptions::default();
        options
            .persistent_vars
            .insert("p".to_string(), json!("caller"));
        engine
            .build("php", &versions(&["7.2"]), options, 0)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0].persistent_vars["p"], json!("caller"));
        assert_eq!(log[0].persistent_vars["q"], json!("image"));
    }

    #[tokio::test]
    async fn test_parent_backfill_keeps_caller_values() {
        let (engine, log) = engine(&chain_tree(), None);
        let options = BuildOptions {
            image_from_name: "custom-base".to_string(),
            image_from_registry_host: "registry.example.com".to_string(),
            ..Default::default()
        };
        engine
            .build("app", &versions(&["1"]), options, 0)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        // 呼び出し側で指定した値は親の値で上書きされない
        assert_eq!(log[0].image_from_name, "custom-base");
        assert_eq!(log[0].image_from_registry_host, "registry.example.com");
        // 未指定の値だけ親から埋める
        assert_eq!(log[0].image_from_version, "1");
    }

    #[tokio::test]
    async fn test_semver_tags_expanded() {
        let mut tree = ImagesTree::new();
        let mut tagged = recording_image("app", "1.2.3");
        tagged.tags = vec!["from-image".to_string()];
        tree.insert("app", "1.2.3", tagged);
        tree.insert("app", "stable", recording_image("app", "stable"));
        let (engine, log) = engine(&tree, None);

        let options = BuildOptions {
            enable_semver_tags: true,
            semver_tags_templates: vec![
                "{{ .Major }}".to_string(),
                "{{ .Major }}.{{ .Minor }}".to_string(),
            ],
            tags: vec!["latest".to_string(), "1".to_string()],
            ..Default::default()
        };
        engine
            .build("app", &versions(&["1.2.3", "stable"]), options, 0)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        let semver = log.iter().find(|o| o.image_version == "1.2.3").unwrap();
        assert_eq!(semver.tags, vec!["1", "1.2", "latest", "from-image"]);

        // セマンティックバージョンでなくてもビルドは続行する
        let stable = log.iter().find(|o| o.image_version == "stable").unwrap();
        assert_eq!(stable.tags, vec!["latest", "1"]);
    }

    /// 起動を通知したあと終わらないドライバー
    struct StalledDriver {
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl Driver for StalledDriver {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn run(&self, _cancel: CancellationToken) -> BuildResult<()> {
            self.started.notify_one();
            std::future::pending::<BuildResult<()>>().await
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_running_build() {
        let started = Arc::new(tokio::sync::Notify::new());
        let mut drivers = DriverRegistry::with_defaults();
        let notify = started.clone();
        drivers
            .register("stalled", move |_options| {
                Ok(Box::new(StalledDriver {
                    started: notify.clone(),
                }) as Box<dyn Driver>)
            })
            .unwrap();
        let mut builders = Builders::new();
        builders.add(Builder::new("slow", "stalled")).unwrap();

        let mut tree = ImagesTree::new();
        tree.insert(
            "app",
            "1",
            Image::new("app", "1").with_builder(BuilderRef::Reference("slow".to_string())),
        );

        let cancel = CancellationToken::new();
        let engine = Arc::new(Engine::new(
            Arc::new(ImagesGraph::compile(&tree).unwrap()),
            Arc::new(builders),
            Arc::new(drivers),
            Dispatcher::new(1, cancel.clone()).unwrap(),
            cancel.clone(),
        ));

        let build = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .build("app", &versions(&["1"]), BuildOptions::default(), 0)
                    .await
            })
        };

        started.notified().await;
        cancel.cancel();

        let error = tokio::time::timeout(std::time::Duration::from_secs(5), build)
            .await
            .expect("build did not stop after cancellation")
            .unwrap()
            .unwrap_err();
        assert!(error.is_cancelled());
        assert_eq!(error.failures()[0].image(), Some("app:1"));
    }

    #[test]
    fn test_find_images_rows() {
        let (engine, _log) = engine(&chain_tree(), None);
        let rows = engine.find_images("app", &versions(&["1"]), &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec!["app", "1", "rec", "", "", "base:1"]);
    }

    #[test]
    fn test_find_images_with_filters() {
        let (engine, _log) = engine(&chain_tree(), None);

        let filters: Vec<ImageFilter> = vec!["version=1".parse().unwrap()];
        let rows = engine.find_images("app", &versions(&["1"]), &filters).unwrap();
        assert_eq!(rows.len(), 1);

        // 一致しなければ空（エラーにはしない）
        let filters: Vec<ImageFilter> = vec!["namespace=stable".parse().unwrap()];
        let rows = engine.find_images("app", &versions(&["1"]), &filters).unwrap();
        assert!(rows.is_empty());

        let filters: Vec<ImageFilter> = vec!["name=base".parse().unwrap()];
        let rows = engine.list_images(&filters).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "base");
    }
}
