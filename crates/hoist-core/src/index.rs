//! イメージインデックス
//!
//! グラフ展開時に構築される4つの検索テーブル。構築後は読み取り専用で、
//! 複数のビルドタスクから `Arc` 経由で共有される。

use crate::error::{CoreError, Result};
use crate::graph::NodeId;
use crate::model::{WILDCARD_VERSION, node_key};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    /// name → 展開前の `name:version` キー（登録順）
    name_index: BTreeMap<String, Vec<String>>,
    /// 展開前キー → ノード
    name_version_index: BTreeMap<String, Vec<NodeId>>,
    /// 展開後キー → ノード（展開で識別子が変わった場合のみ）
    name_version_alternative_index: BTreeMap<String, Vec<NodeId>>,
    /// バージョンがワイルドカードのキー
    wildcard_index: BTreeSet<String>,
}

impl ImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// ノードを登録
    pub fn add_node(&mut self, name: &str, version: &str, id: NodeId) {
        let key = node_key(name, version);
        let keys = self.name_index.entry(name.to_string()).or_default();
        if !keys.contains(&key) {
            keys.push(key.clone());
        }
        self.name_version_index.entry(key).or_default().push(id);
    }

    /// 展開後の識別子でノードを登録
    pub fn add_alternative(&mut self, name: &str, version: &str, id: NodeId) {
        self.name_version_alternative_index
            .entry(node_key(name, version))
            .or_default()
            .push(id);
    }

    /// ワイルドカードキーを登録
    pub fn add_wildcard(&mut self, name: &str, version: &str) {
        self.wildcard_index.insert(node_key(name, version));
    }

    /// ノードを検索
    ///
    /// ワイルドカードとして登録されたキーは空の結果を返す。
    /// ワイルドカードは明示的な展開でのみ解決される。
    pub fn find(&self, name: &str, version: &str) -> Result<Vec<NodeId>> {
        if self.is_wildcard_version(name, version) {
            return Ok(Vec::new());
        }

        if version.is_empty() {
            return self.find_by_name(name);
        }

        let key = node_key(name, version);
        if let Some(ids) = self.name_version_index.get(&key) {
            return Ok(ids.clone());
        }
        if let Some(ids) = self.name_version_alternative_index.get(&key) {
            return Ok(ids.clone());
        }

        Err(CoreError::ImageVersionNotFound {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// 名前で全ノードを検索（ワイルドカードバージョンは除外）
    fn find_by_name(&self, name: &str) -> Result<Vec<NodeId>> {
        let keys = self
            .name_index
            .get(name)
            .ok_or_else(|| CoreError::ImageNotFound(name.to_string()))?;

        let mut ids = Vec::new();
        for key in keys {
            if self.wildcard_index.contains(key) {
                continue;
            }
            let nodes = self
                .name_version_index
                .get(key)
                .ok_or_else(|| CoreError::InvalidNode(key.clone()))?;
            ids.extend(nodes.iter().copied());
        }

        Ok(ids)
    }

    /// `name:*` に登録された最初のノード
    pub fn find_wildcard_version(&self, name: &str) -> Result<NodeId> {
        self.name_version_index
            .get(&node_key(name, WILDCARD_VERSION))
            .and_then(|ids| ids.first().copied())
            .ok_or_else(|| CoreError::WildcardNotFound(name.to_string()))
    }

    pub fn is_wildcard_version(&self, name: &str, version: &str) -> bool {
        self.wildcard_index.contains(&node_key(name, version))
    }

    /// 展開前キーに登録されたノード
    pub fn nodes_for_key(&self, key: &str) -> &[NodeId] {
        self.name_version_index
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 展開後キーに登録されたノード
    pub fn alternative_nodes_for_key(&self, key: &str) -> &[NodeId] {
        self.name_version_alternative_index
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 登録された全ノード数
    pub fn node_count(&self) -> usize {
        self.name_version_index.values().map(Vec::len).sum()
    }
}
