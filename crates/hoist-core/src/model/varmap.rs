//! ビルダー変数マッピング
//!
//! ドライバーへ渡す論理キー（`image_name_key` など）を、
//! 実際に出力する変数名へ対応付ける。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const IMAGE_BUILDER_NAME_KEY: &str = "image_builder_name_key";
pub const IMAGE_BUILDER_TAG_KEY: &str = "image_builder_tag_key";
pub const IMAGE_BUILDER_REGISTRY_NAMESPACE_KEY: &str = "image_builder_registry_namespace_key";
pub const IMAGE_BUILDER_REGISTRY_HOST_KEY: &str = "image_builder_registry_host_key";
pub const IMAGE_BUILDER_LABEL_KEY: &str = "image_builder_label_key";
pub const IMAGE_FROM_NAME_KEY: &str = "image_from_name_key";
pub const IMAGE_FROM_TAG_KEY: &str = "image_from_tag_key";
pub const IMAGE_FROM_REGISTRY_NAMESPACE_KEY: &str = "image_from_registry_namespace_key";
pub const IMAGE_FROM_REGISTRY_HOST_KEY: &str = "image_from_registry_host_key";
pub const IMAGE_NAME_KEY: &str = "image_name_key";
pub const IMAGE_TAG_KEY: &str = "image_tag_key";
pub const IMAGE_EXTRA_TAGS_KEY: &str = "image_extra_tags_key";
pub const IMAGE_REGISTRY_NAMESPACE_KEY: &str = "image_registry_namespace_key";
pub const IMAGE_REGISTRY_HOST_KEY: &str = "image_registry_host_key";
pub const PUSH_IMAGE_KEY: &str = "push_image_key";

const ALL_KEYS: &[&str] = &[
    IMAGE_BUILDER_NAME_KEY,
    IMAGE_BUILDER_TAG_KEY,
    IMAGE_BUILDER_REGISTRY_NAMESPACE_KEY,
    IMAGE_BUILDER_REGISTRY_HOST_KEY,
    IMAGE_BUILDER_LABEL_KEY,
    IMAGE_FROM_NAME_KEY,
    IMAGE_FROM_TAG_KEY,
    IMAGE_FROM_REGISTRY_NAMESPACE_KEY,
    IMAGE_FROM_REGISTRY_HOST_KEY,
    IMAGE_NAME_KEY,
    IMAGE_TAG_KEY,
    IMAGE_EXTRA_TAGS_KEY,
    IMAGE_REGISTRY_NAMESPACE_KEY,
    IMAGE_REGISTRY_HOST_KEY,
    PUSH_IMAGE_KEY,
];

/// 論理キー → 変数名
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarMapping(BTreeMap<String, String>);

impl VarMapping {
    /// 空のマッピング
    pub fn new() -> Self {
        Self::default()
    }

    /// 既定値で埋めたマッピング（キーから `_key` を除いた名前）
    pub fn with_defaults() -> Self {
        let map = ALL_KEYS
            .iter()
            .map(|key| {
                let value = key.strip_suffix("_key").unwrap_or(key);
                (key.to_string(), value.to_string())
            })
            .collect();
        Self(map)
    }

    /// 論理キーに対応する変数名
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// `other` の値を取り込む。既存のキーは上書きしない
    pub fn combine(&mut self, other: &VarMapping) {
        for (key, value) in &other.0 {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
