//! ワイルドカードバージョンの展開
//!
//! `name:*` として定義されたイメージから、要求されたバージョンの
//! ノードをその場で合成する。合成ノードはインデックスに登録されない。

use crate::error::{CoreError, Result};
use crate::graph::render::{inherit_persistent_vars, render_image};
use crate::graph::{ImageNode, ImagesGraph, NodeId};
use crate::model::{Image, WILDCARD_VERSION, node_key};
use std::sync::Arc;
use tracing::debug;

/// ワイルドカードから合成されたノード
#[derive(Debug, Clone)]
pub struct SyntheticNode {
    key: String,
    image: Arc<Image>,
    parent: Option<NodeId>,
    parent_image: Option<Arc<Image>>,
    children: Vec<SyntheticNode>,
}

impl SyntheticNode {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    /// 元のワイルドカードノードの親（合成された子の場合は None）
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn parent_image(&self) -> Option<&Arc<Image>> {
        self.parent_image.as_ref()
    }

    pub fn children(&self) -> &[SyntheticNode] {
        &self.children
    }
}

impl ImagesGraph {
    /// `name` のワイルドカード定義から `version` のノードを合成
    pub fn expand_wildcard(&self, name: &str, version: &str) -> Result<SyntheticNode> {
        let wildcard_id = self.index().find_wildcard_version(name)?;
        let wildcard = self.node(wildcard_id)?;
        let parent_image = self.parent_image(wildcard_id)?;

        debug!(image = %name, version = %version, "Expanding wildcard version");
        self.synthesize(name, version, wildcard, wildcard.parent(), parent_image)
    }

    fn synthesize(
        &self,
        name: &str,
        version: &str,
        wildcard: &ImageNode,
        parent: Option<NodeId>,
        parent_image: Option<Arc<Image>>,
    ) -> Result<SyntheticNode> {
        let source = self
            .source()
            .get(name, WILDCARD_VERSION)
            .ok_or_else(|| CoreError::WildcardNotFound(name.to_string()))?;

        let mut image = source.clone();
        if image.name.is_empty() {
            image.name = name.to_string();
        }
        image.version = version.to_string();

        let empty = Image::default();
        let parent_context = parent_image.as_deref().unwrap_or(&empty);
        let mut rendered = render_image(&image, name, version, parent_context, self.dates())?;
        inherit_persistent_vars(&mut rendered, parent_context);

        let mut key = rendered.key();
        if let Some(parent_image) = &parent_image {
            key = format!("{}@{}", key, parent_image.key());
        }
        let image = Arc::new(rendered);

        let mut children = Vec::new();
        for child_id in wildcard.children() {
            let child = self.node(*child_id)?;
            let child_name = child.template_name();
            if self.source().get(child_name, WILDCARD_VERSION).is_none() {
                debug!(
                    child = %node_key(child_name, child.template_version()),
                    "Child has no wildcard definition, dropping from synthetic subtree"
                );
                continue;
            }
            children.push(self.synthesize(child_name, version, child, None, Some(image.clone()))?);
        }

        Ok(SyntheticNode {
            key,
            image,
            parent,
            parent_image,
            children,
        })
    }
}

/// 解決済みノード（インデックス上のノードまたは合成ノード）
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    Indexed(NodeId),
    Synthetic(Arc<SyntheticNode>),
}

impl ResolvedNode {
    pub fn key(&self, graph: &ImagesGraph) -> Result<String> {
        match self {
            ResolvedNode::Indexed(id) => Ok(graph.node(*id)?.key().to_string()),
            ResolvedNode::Synthetic(node) => Ok(node.key().to_string()),
        }
    }

    pub fn image(&self, graph: &ImagesGraph) -> Result<Arc<Image>> {
        match self {
            ResolvedNode::Indexed(id) => Ok(graph.node(*id)?.image().clone()),
            ResolvedNode::Synthetic(node) => Ok(node.image().clone()),
        }
    }

    pub fn parent_image(&self, graph: &ImagesGraph) -> Result<Option<Arc<Image>>> {
        match self {
            ResolvedNode::Indexed(id) => graph.parent_image(*id),
            ResolvedNode::Synthetic(node) => Ok(node.parent_image().cloned()),
        }
    }

    /// 子ノードのイメージ
    pub fn child_images(&self, graph: &ImagesGraph) -> Result<Vec<Arc<Image>>> {
        match self {
            ResolvedNode::Indexed(id) => graph
                .node(*id)?
                .children()
                .iter()
                .map(|child| Ok(graph.node(*child)?.image().clone()))
                .collect(),
            ResolvedNode::Synthetic(node) => Ok(node
                .children()
                .iter()
                .map(|child| child.image().clone())
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImagesTree;
    use serde_json::json;

    fn wildcard_tree() -> ImagesTree {
        let mut tree = ImagesTree::new();
        tree.insert(
            "app",
            "*",
            Image {
                tags: vec!["app-{{ .Version }}".to_string()],
                ..Default::default()
            }
            .with_child("base", &["*"])
            .with_child("tools", &["1.0"]),
        );
        tree.insert(
            "base",
            "*",
            Image::default().with_var("from", json!("{{ .Parent.Name }}:{{ .Parent.Version }}")),
        );
        tree.insert("tools", "1.0", Image::default());
        tree
    }

    #[test]
    fn test_expand_wildcard_subtree() {
        let graph = ImagesGraph::compile(&wildcard_tree()).unwrap();
        let node = graph.expand_wildcard("app", "9.9").unwrap();

        assert_eq!(node.key(), "app:9.9");
        assert_eq!(node.image().version, "9.9");
        assert_eq!(node.image().tags, vec!["app-9.9".to_string()]);
        assert!(node.parent().is_none());

        // 子もワイルドカード定義から同じバージョンで合成される
        assert_eq!(node.children().len(), 1);
        let child = &node.children()[0];
        assert_eq!(child.image().name, "base");
        assert_eq!(child.image().version, "9.9");
        assert_eq!(child.image().vars.get("from"), Some(&json!("app:9.9")));
        assert_eq!(child.key(), "base:9.9@app:9.9");
    }

    #[test]
    fn test_synthetic_node_not_indexed() {
        let graph = ImagesGraph::compile(&wildcard_tree()).unwrap();
        let before = graph.index().node_count();

        let _node = graph.expand_wildcard("app", "9.9").unwrap();

        assert_eq!(graph.index().node_count(), before);
        assert!(graph.find("app", "9.9").is_err());
    }

    #[test]
    fn test_expand_without_wildcard_definition() {
        let graph = ImagesGraph::compile(&wildcard_tree()).unwrap();
        assert!(matches!(
            graph.expand_wildcard("tools", "2.0"),
            Err(CoreError::WildcardNotFound(_))
        ));
    }

    #[test]
    fn test_resolved_node_views() {
        let graph = ImagesGraph::compile(&wildcard_tree()).unwrap();

        let synthetic = ResolvedNode::Synthetic(Arc::new(graph.expand_wildcard("app", "2.0").unwrap()));
        assert_eq!(synthetic.key(&graph).unwrap(), "app:2.0");
        assert_eq!(synthetic.child_images(&graph).unwrap()[0].version, "2.0");
        assert!(synthetic.parent_image(&graph).unwrap().is_none());

        let ids = graph.find("tools", "1.0").unwrap();
        let indexed = ResolvedNode::Indexed(ids[0]);
        assert_eq!(indexed.image(&graph).unwrap().name, "tools");
        assert_eq!(indexed.parent_image(&graph).unwrap().unwrap().key(), "app:*");
    }
}
