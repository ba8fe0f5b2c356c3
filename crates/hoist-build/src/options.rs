//! ビルドオプション
//!
//! ドライバーが必要とする全ての入力。並行タスクごとに `Clone` して渡す。

use crate::image_url::ImageUrl;
use bollard::auth::DockerCredentials;
use hoist_core::{VarMapping, Variables};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// レジストリ認証情報
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// ユーザー名とパスワードの両方が指定された場合のみ作成
    pub fn from_pair(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) => Some(Self { username, password }),
            _ => None,
        }
    }

    /// Bollard の認証情報に変換
    pub fn to_docker_credentials(&self, server: &str) -> DockerCredentials {
        DockerCredentials {
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            serveraddress: (!server.is_empty()).then(|| server.to_string()),
            ..Default::default()
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildOptions {
    pub image_name: String,
    pub image_version: String,
    pub registry_host: String,
    pub registry_namespace: String,
    pub tags: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub vars: Variables,
    pub persistent_vars: Variables,

    pub image_from_name: String,
    pub image_from_version: String,
    pub image_from_registry_host: String,
    pub image_from_registry_namespace: String,

    pub builder_name: String,
    pub builder_options: BTreeMap<String, serde_json::Value>,
    pub builder_var_mappings: VarMapping,

    /// 出力行の先頭に付ける文字列
    pub output_prefix: String,
    pub cascade: bool,
    pub dry_run: bool,
    pub connection_local: bool,
    pub push_images: bool,
    pub pull_parent_image: bool,
    pub remove_image_after_build: bool,
    pub enable_semver_tags: bool,
    pub semver_tags_templates: Vec<String>,

    #[serde(skip)]
    pub pull_auth: Option<Credentials>,
    #[serde(skip)]
    pub push_auth: Option<Credentials>,
}

impl BuildOptions {
    /// ビルドするイメージの参照
    pub fn image_url(&self) -> ImageUrl {
        ImageUrl::new(
            &self.registry_host,
            &self.registry_namespace,
            &self.image_name,
            &self.image_version,
        )
    }

    /// 親イメージの参照（親が無い場合は None）
    pub fn image_from_url(&self) -> Option<ImageUrl> {
        if self.image_from_name.is_empty() {
            return None;
        }
        Some(ImageUrl::new(
            &self.image_from_registry_host,
            &self.image_from_registry_namespace,
            &self.image_from_name,
            &self.image_from_version,
        ))
    }

    /// 変数マッピングで論理キーを変数名に変換
    pub fn mapped_key(&self, key: &str) -> Option<&str> {
        self.builder_var_mappings.get(key)
    }

    pub fn builder_option_str(&self, key: &str) -> Option<&str> {
        self.builder_options.get(key).and_then(|v| v.as_str())
    }
}
