//! イメージ定義

use super::builder::Builder;
use super::scalar::{children_map, scalar_to_string, string_or_number};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// ワイルドカードバージョンを表すトークン
pub const WILDCARD_VERSION: &str = "*";

/// ノードキーの区切り文字 (`name:version`)
pub const NODE_KEY_SEPARATOR: &str = ":";

/// 変数マップ
pub type Variables = BTreeMap<String, serde_json::Value>;

/// `name:version` 形式のキーを作る
pub fn node_key(name: &str, version: &str) -> String {
    format!("{}{}{}", name, NODE_KEY_SEPARATOR, version)
}

/// イメージが参照するビルダー
///
/// YAML の文字列は登録済みビルダーへの参照、マッピングはインライン定義になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuilderRef {
    Reference(String),
    Inline(Builder),
}

/// ビルド対象イメージの1バージョン
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    pub version: String,

    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub builder: Option<BuilderRef>,

    #[serde(default, rename = "registry", skip_serializing_if = "String::is_empty")]
    pub registry_host: String,

    #[serde(default, rename = "namespace", skip_serializing_if = "String::is_empty")]
    pub registry_namespace: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub persistent_vars: Variables,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: Variables,

    #[serde(
        default,
        deserialize_with = "children_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub children: BTreeMap<String, Vec<String>>,
}

impl Image {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// `name:version`
    pub fn key(&self) -> String {
        node_key(&self.name, &self.version)
    }

    /// 子イメージを追加
    pub fn with_child(mut self, name: impl Into<String>, versions: &[&str]) -> Self {
        self.children
            .entry(name.into())
            .or_default()
            .extend(versions.iter().map(|v| v.to_string()));
        self
    }

    pub fn with_builder(mut self, builder: BuilderRef) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn with_persistent_var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.persistent_vars.insert(key.into(), value);
        self
    }

    /// ビルダーの表示名（インライン定義は `<inline>`）
    pub fn builder_label(&self) -> String {
        match &self.builder {
            Some(BuilderRef::Reference(name)) => name.clone(),
            Some(BuilderRef::Inline(builder)) if !builder.name.is_empty() => builder.name.clone(),
            Some(BuilderRef::Inline(_)) => "<inline>".to_string(),
            None => "-".to_string(),
        }
    }
}

/// イメージツリー（name → version → Image）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ImagesTree(BTreeMap<String, BTreeMap<String, Image>>);

impl ImagesTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>, image: Image) {
        self.0
            .entry(name.into())
            .or_default()
            .insert(version.into(), image);
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&Image> {
        self.0.get(name).and_then(|versions| versions.get(version))
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.get(name, version).is_some()
    }

    /// 名前・バージョン順に走査
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Image)> {
        self.0.iter().flat_map(|(name, versions)| {
            versions
                .iter()
                .map(move |(version, image)| (name.as_str(), version.as_str(), image))
        })
    }

    /// 別ツリーを取り込む（同じキーは後勝ち）
    pub fn merge(&mut self, other: ImagesTree) {
        for (name, versions) in other.0 {
            self.0.entry(name).or_default().extend(versions);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 定義されているイメージバージョンの総数
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }
}

impl<'de> Deserialize<'de> for ImagesTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_yaml::Mapping::deserialize(deserializer)?;
        let mut tree = ImagesTree::new();

        for (name, versions) in raw {
            let name = scalar_to_string(&name)
                .ok_or_else(|| D::Error::custom("image name must be a scalar"))?;
            let versions = match versions {
                serde_yaml::Value::Mapping(mapping) => mapping,
                serde_yaml::Value::Null => continue,
                _ => {
                    return Err(D::Error::custom(format!(
                        "image '{}' must map versions to definitions",
                        name
                    )));
                }
            };

            for (version, definition) in versions {
                let version = scalar_to_string(&version).ok_or_else(|| {
                    D::Error::custom(format!("image '{}' has a non scalar version", name))
                })?;
                let image = match definition {
                    serde_yaml::Value::Null => Image::default(),
                    value => serde_yaml::from_value::<Image>(value).map_err(|e| {
                        D::Error::custom(format!("image '{}:{}': {}", name, version, e))
                    })?,
                };
                tree.insert(name.clone(), version, image);
            }
        }

        Ok(tree)
    }
}
