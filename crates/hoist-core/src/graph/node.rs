use crate::model::Image;
use std::fmt;
use std::sync::Arc;

/// グラフ内ノードの識別子（アリーナのインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 展開済みグラフのノード
#[derive(Debug, Clone)]
pub struct ImageNode {
    /// `name:version[@parentName:parentVersion]`
    pub(crate) key: String,
    pub(crate) template_name: String,
    pub(crate) template_version: String,
    pub(crate) image: Arc<Image>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl ImageNode {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 展開前の名前
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// 展開前のバージョン
    pub fn template_version(&self) -> &str {
        &self.template_version
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}
