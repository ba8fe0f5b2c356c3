//! イメージ依存グラフ
//!
//! イメージツリーを2段階でコンパイルする:
//! 1. 展開前の構造グラフを作り循環を検出する
//! 2. ルートから深さ優先で各ノードを親の値で展開し、インデックスに登録する

mod node;
pub(crate) mod render;
mod template_graph;

pub use node::{ImageNode, NodeId};

use crate::error::{CoreError, Result};
use crate::filter::ImageFilter;
use crate::index::ImageIndex;
use crate::model::{Image, ImagesTree, WILDCARD_VERSION};
pub use render::RenderDates;

use chrono::{DateTime, FixedOffset};
use render::{inherit_persistent_vars, render_image};
use std::collections::HashSet;
use std::sync::Arc;
use template_graph::TemplateGraph;
use tracing::{debug, info, instrument, warn};

/// ツリー表示のプレフィックス
const DRAW_PREFIX: &str = "├───";
/// ツリー表示の階層ごとのインデント
const DRAW_INDENT: &str = "│  ";

/// コンパイル済みのイメージグラフ
///
/// 全ノードをアリーナで保持し、親子関係はインデックスで参照する。
#[derive(Debug, Clone, Default)]
pub struct ImagesGraph {
    nodes: Vec<ImageNode>,
    roots: Vec<NodeId>,
    index: ImageIndex,
    source: ImagesTree,
    dates: RenderDates,
}

impl ImagesGraph {
    /// イメージツリーをコンパイル
    pub fn compile(tree: &ImagesTree) -> Result<Self> {
        Self::compile_with_dates(tree, RenderDates::now())
    }

    /// 指定した日時でイメージツリーをコンパイル
    pub fn compile_at(tree: &ImagesTree, now: &DateTime<FixedOffset>) -> Result<Self> {
        Self::compile_with_dates(tree, RenderDates::at(now))
    }

    #[instrument(skip(tree, dates), fields(images = tree.len()))]
    fn compile_with_dates(tree: &ImagesTree, dates: RenderDates) -> Result<Self> {
        let template = TemplateGraph::build(tree)?;

        let mut graph = Self {
            source: tree.clone(),
            dates,
            ..Default::default()
        };
        // 同じ親の下で同じキーになったノードだけを重複とみなす
        let mut rendered_keys = HashSet::new();

        let roots: Vec<String> = template.roots().map(str::to_string).collect();
        for root in &roots {
            graph.render_node(&template, root, None, &mut rendered_keys)?;
        }

        info!(nodes = graph.nodes.len(), "Compiled images graph");
        Ok(graph)
    }

    fn render_node(
        &mut self,
        template: &TemplateGraph,
        key: &str,
        parent: Option<NodeId>,
        rendered_keys: &mut HashSet<(Option<NodeId>, String)>,
    ) -> Result<()> {
        let template_node = template
            .node(key)
            .ok_or_else(|| CoreError::InvalidNode(key.to_string()))?;

        let parent_image = match parent {
            Some(id) => Some(self.node(id)?.image.clone()),
            None => None,
        };
        let empty = Image::default();
        let parent_context = parent_image.as_deref().unwrap_or(&empty);

        let mut image = render_image(
            &template_node.image,
            &template_node.name,
            &template_node.version,
            parent_context,
            &self.dates,
        )?;
        inherit_persistent_vars(&mut image, parent_context);

        let mut rendered_key = image.key();
        if let Some(parent_image) = &parent_image {
            rendered_key = format!("{}@{}", rendered_key, parent_image.key());
        }

        if !rendered_keys.insert((parent, rendered_key.clone())) {
            warn!(node = %rendered_key, "Image node already rendered under this parent, skipping duplicate");
            return Ok(());
        }

        let id = NodeId(self.nodes.len());
        debug!(node = %rendered_key, template = %key, "Rendered image node");

        let identity_changed =
            image.name != template_node.name || image.version != template_node.version;
        self.index
            .add_node(&template_node.name, &template_node.version, id);
        if identity_changed {
            self.index.add_alternative(&image.name, &image.version, id);
        }
        if template_node.version == WILDCARD_VERSION {
            self.index
                .add_wildcard(&template_node.name, &template_node.version);
            self.index.add_wildcard(&template_node.name, &image.version);
        }

        self.nodes.push(ImageNode {
            key: rendered_key,
            template_name: template_node.name.clone(),
            template_version: template_node.version.clone(),
            image: Arc::new(image),
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(parent_id) => self.node_mut(parent_id)?.children.push(id),
            None => self.roots.push(id),
        }

        for child in &template_node.children {
            self.render_node(template, child, Some(id), rendered_keys)?;
        }

        Ok(())
    }

    /// ノードを取得
    pub fn node(&self, id: NodeId) -> Result<&ImageNode> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| CoreError::InvalidNode(id.to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut ImageNode> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| CoreError::InvalidNode(id.to_string()))
    }

    /// 親ノードのイメージ
    pub fn parent_image(&self, id: NodeId) -> Result<Option<Arc<Image>>> {
        match self.node(id)?.parent {
            Some(parent) => Ok(Some(self.node(parent)?.image.clone())),
            None => Ok(None),
        }
    }

    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    /// インデックスで検索
    pub fn find(&self, name: &str, version: &str) -> Result<Vec<NodeId>> {
        self.index.find(name, version)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// テンプレートに渡した日時
    pub fn dates(&self) -> &RenderDates {
        &self.dates
    }

    /// コンパイル元のイメージツリー
    pub fn source(&self) -> &ImagesTree {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 一覧表示用の行 (NAME, VERSION, BUILDER, NAMESPACE, REGISTRY, PARENT)
    pub fn image_row(&self, id: NodeId) -> Result<Vec<String>> {
        let node = self.node(id)?;
        let image = &node.image;
        let parent = match self.parent_image(id)? {
            Some(parent) => parent.key(),
            None => "-".to_string(),
        };
        Ok(image_row(image, parent))
    }

    /// ルートから深さ優先で全イメージを一覧化
    ///
    /// `filters` のすべてに一致するイメージだけを残す。
    pub fn list_images(&self, filters: &[ImageFilter]) -> Result<Vec<Vec<String>>> {
        let mut rows = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            self.list_rec(*root, filters, &mut rows)?;
        }
        Ok(rows)
    }

    fn list_rec(
        &self,
        id: NodeId,
        filters: &[ImageFilter],
        rows: &mut Vec<Vec<String>>,
    ) -> Result<()> {
        let node = self.node(id)?;
        if ImageFilter::all_match(filters, &node.image) {
            rows.push(self.image_row(id)?);
        }
        for child in &node.children {
            self.list_rec(*child, filters, rows)?;
        }
        Ok(())
    }

    /// グラフをツリー形式で描画
    pub fn draw(&self) -> Result<String> {
        let mut out = String::new();
        for root in &self.roots {
            self.draw_rec(*root, DRAW_PREFIX.to_string(), &mut out)?;
        }
        Ok(out)
    }

    fn draw_rec(&self, id: NodeId, prefix: String, out: &mut String) -> Result<()> {
        let node = self.node(id)?;
        out.push_str(&format!(" {} {}\n", prefix, node.image.key()));

        let prefix = format!("{}{}", DRAW_INDENT, prefix);
        for child in &node.children {
            self.draw_rec(*child, prefix.clone(), out)?;
        }
        Ok(())
    }
}

/// 一覧表示用の行を作る
pub fn image_row(image: &Image, parent: String) -> Vec<String> {
    vec![
        image.name.clone(),
        image.version.clone(),
        image.builder_label(),
        image.registry_namespace.clone(),
        image.registry_host.clone(),
        parent,
    ]
}
