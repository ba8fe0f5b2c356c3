//! ビルダー定義とビルダーレジストリ

use super::varmap::VarMapping;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ドライバー未指定時に使う no-op ドライバー名
pub const DEFAULT_DRIVER: &str = "default";

/// ビルダー定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Builder {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub driver: String,

    /// ドライバー固有のオプション（`context`, `dockerfile`, `playbook` など）
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub variables_mapping: VarMapping,
}

impl Builder {
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// 空の名前とドライバーを補完し、変数マッピングを既定値で埋める
    pub fn sanitize(&mut self, name: &str) {
        if self.name.is_empty() {
            self.name = name.to_string();
        }
        if self.driver.is_empty() {
            self.driver = DEFAULT_DRIVER.to_string();
        }
        self.variables_mapping.combine(&VarMapping::with_defaults());
    }

    /// オプションの文字列値
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// 一覧表示用の `key=value` 表現（キー順）
    pub fn options_list(&self) -> Vec<String> {
        // BTreeMap なのでキー順に並ぶ
        self.options
            .iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect()
    }

    /// 一覧表示用の行 (BUILDER, DRIVER, OPTIONS)
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.driver.clone(),
            self.options_list().join(", "),
        ]
    }
}

/// ビルダーレジストリ（名前 → ビルダー）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Builders {
    builders: BTreeMap<String, Builder>,
}

impl Builders {
    pub fn new() -> Self {
        Self::default()
    }

    /// YAML の `builders` マッピングから作成し、全エントリを sanitize する
    ///
    /// 値が空のエントリは既定のビルダーとして扱う。
    pub fn from_definitions(definitions: BTreeMap<String, Option<Builder>>) -> Self {
        let builders = definitions
            .into_iter()
            .map(|(name, builder)| {
                let mut builder = builder.unwrap_or_default();
                builder.sanitize(&name);
                (name, builder)
            })
            .collect();
        Self { builders }
    }

    /// ビルダーを登録
    pub fn add(&mut self, mut builder: Builder) -> Result<()> {
        let name = builder.name.clone();
        if self.builders.contains_key(&name) {
            return Err(CoreError::BuilderAlreadyExists(name));
        }
        builder.sanitize(&name);
        self.builders.insert(name, builder);
        Ok(())
    }

    /// 名前でビルダーを取得
    pub fn get(&self, name: &str) -> Result<&Builder> {
        self.builders
            .get(name)
            .ok_or_else(|| CoreError::BuilderNotFound(name.to_string()))
    }

    /// 一覧表示用の行（名前順）
    pub fn list(&self) -> Vec<Vec<String>> {
        self.builders.values().map(Builder::to_row).collect()
    }

    /// 他のレジストリを取り込む
    pub fn merge(&mut self, other: Builders) -> Result<()> {
        for (_, builder) in other.builders {
            self.add(builder)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
