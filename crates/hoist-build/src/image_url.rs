//! イメージ参照 (`registry/namespace/name:tag`)

use crate::error::{BuildError, BuildResult};
use std::fmt;

/// レジストリ上のイメージの位置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageUrl {
    pub registry_host: String,
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

impl ImageUrl {
    pub fn new(
        registry_host: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry_host: registry_host.into(),
            namespace: namespace.into(),
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// イメージ参照を分解
    ///
    /// # Examples
    /// - `registry.example.com/stable/ubuntu:18.04` → (registry.example.com, stable, ubuntu, 18.04)
    /// - `library/nginx` → ("", library, nginx, latest)
    /// - `localhost:5000/app:dev` → (localhost:5000, "", app, dev)
    pub fn parse(reference: &str) -> BuildResult<Self> {
        let (path, tag) = split_image_tag(reference);
        if path.is_empty() {
            return Err(BuildError::InvalidConfig(format!(
                "Invalid image reference: '{}'",
                reference
            )));
        }

        let mut parts: Vec<&str> = path.split('/').collect();
        let registry_host = if parts.len() > 1 && is_registry_host(parts[0]) {
            parts.remove(0).to_string()
        } else {
            String::new()
        };

        let name = parts.pop().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(BuildError::InvalidConfig(format!(
                "Image reference has no name: '{}'",
                reference
            )));
        }

        Ok(Self {
            registry_host,
            namespace: parts.join("/"),
            name,
            tag,
        })
    }

    /// タグを除いたリポジトリ名
    pub fn repository(&self) -> String {
        [
            self.registry_host.as_str(),
            self.namespace.as_str(),
            self.name.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
    }

    /// 完全なイメージ参照
    pub fn url(&self) -> String {
        if self.tag.is_empty() {
            self.repository()
        } else {
            format!("{}:{}", self.repository(), sanitize_tag(&self.tag))
        }
    }

    /// 同じリポジトリの別タグ
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// タグに使えない `/` と `:` を `_` に置き換える
pub fn sanitize_tag(tag: &str) -> String {
    tag.replace(['/', ':'], "_")
}

fn is_registry_host(part: &str) -> bool {
    part.contains('.') || part.contains(':') || part == "localhost"
}

/// イメージ名とタグを分離
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // ポート番号は / を含まない純粋な数字
        if !potential_tag.contains('/') && !potential_tag.chars().all(|c| c.is_ascii_digit()) {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}
