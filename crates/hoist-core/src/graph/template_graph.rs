//! 展開前の構造グラフ
//!
//! `name:version` をキーとするノードの親子関係を組み立て、
//! 関係を追加するたびにグラフ全体の循環を検査する。

use crate::error::{CoreError, Result};
use crate::model::{Image, ImagesTree, node_key};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct TemplateNode {
    pub name: String,
    pub version: String,
    pub image: Image,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    expanded: bool,
}

#[derive(Debug, Default)]
pub(crate) struct TemplateGraph {
    nodes: BTreeMap<String, TemplateNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

impl TemplateGraph {
    /// イメージツリーから構造グラフを作成
    pub fn build(tree: &ImagesTree) -> Result<Self> {
        let mut graph = Self::default();
        for (name, version, image) in tree.iter() {
            graph.visit(tree, name, version, image)?;
        }
        Ok(graph)
    }

    fn visit(&mut self, tree: &ImagesTree, name: &str, version: &str, image: &Image) -> Result<()> {
        let key = self.ensure_node(name, version, image);
        let Some(node) = self.nodes.get_mut(&key) else {
            return Err(CoreError::InvalidNode(key));
        };
        if node.expanded {
            return Ok(());
        }
        node.expanded = true;

        for (child_name, child_versions) in &image.children {
            for child_version in child_versions {
                let Some(child_image) = tree.get(child_name, child_version) else {
                    debug!(
                        parent = %key,
                        child = %node_key(child_name, child_version),
                        "Child image is not defined, skipping"
                    );
                    continue;
                };

                let child_key = self.ensure_node(child_name, child_version, child_image);
                self.add_relationship(&key, &child_key)?;
                self.visit(tree, child_name, child_version, child_image)?;
            }
        }

        Ok(())
    }

    /// ノードを作成（既存なら再利用）し、キーを返す
    fn ensure_node(&mut self, name: &str, version: &str, image: &Image) -> String {
        let key = node_key(name, version);
        self.nodes.entry(key.clone()).or_insert_with(|| {
            let mut image = image.clone();
            if image.name.is_empty() {
                image.name = name.to_string();
            }
            if image.version.is_empty() {
                image.version = version.to_string();
            }
            TemplateNode {
                name: name.to_string(),
                version: version.to_string(),
                image,
                parents: Vec::new(),
                children: Vec::new(),
                expanded: false,
            }
        });
        key
    }

    fn add_relationship(&mut self, parent: &str, child: &str) -> Result<()> {
        if let Some(node) = self.nodes.get_mut(parent)
            && !node.children.iter().any(|c| c == child)
        {
            node.children.push(child.to_string());
        }
        if let Some(node) = self.nodes.get_mut(child)
            && !node.parents.iter().any(|p| p == parent)
        {
            node.parents.push(parent.to_string());
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(CoreError::CycleDetected(cycle.join(" -> ")));
        }
        Ok(())
    }

    /// グラフ全体から循環を探す（見つかった場合はその経路）
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut colors: BTreeMap<&str, Color> =
            self.nodes.keys().map(|k| (k.as_str(), Color::White)).collect();
        let mut path = Vec::new();

        for key in self.nodes.keys() {
            if colors.get(key.as_str()) == Some(&Color::White)
                && let Some(cycle) = self.dfs(key, &mut colors, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs<'a>(
        &'a self,
        key: &'a str,
        colors: &mut BTreeMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        colors.insert(key, Color::Grey);
        path.push(key);

        if let Some(node) = self.nodes.get(key) {
            for child in &node.children {
                match colors.get(child.as_str()).copied().unwrap_or(Color::White) {
                    Color::Grey => {
                        let start = path.iter().position(|k| *k == child.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|k| k.to_string()).collect();
                        cycle.push(child.clone());
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = self.dfs(child, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        path.pop();
        colors.insert(key, Color::Black);
        None
    }

    pub fn node(&self, key: &str) -> Option<&TemplateNode> {
        self.nodes.get(key)
    }

    /// 親を持たないノード（キー順）
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parents.is_empty())
            .map(|(key, _)| key.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}
