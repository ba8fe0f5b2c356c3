//! セマンティックバージョンによる追加タグ
//!
//! `1.2.3` から `1`, `1.2`, `1.2.3` のようなタグをテンプレートで生成する。

use crate::error::{BuildError, BuildResult};
use hoist_core::TemplateProcessor;
use serde_json::Value;
use std::fmt;

/// 既定のタグテンプレート
pub const DEFAULT_SEMVER_TEMPLATE: &str = "{{ .Major }}.{{ .Minor }}.{{ .Patch }}";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SemVer {
    pub major: String,
    pub minor: String,
    pub patch: String,
    pub pre_release: String,
    pub build: String,
}

impl SemVer {
    /// バージョン文字列を解析
    ///
    /// 先頭の `v` と、省略されたマイナー・パッチ（`1.2` → `1.2.0`）を受け付ける。
    pub fn parse(version: &str) -> BuildResult<Self> {
        let invalid = |message: String| BuildError::SemVer {
            version: version.to_string(),
            message,
        };

        let trimmed = version.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(split_at);
        let parts = core.split('.').count();
        if core.is_empty() || parts > 3 {
            return Err(invalid("expected MAJOR[.MINOR[.PATCH]]".to_string()));
        }

        let mut normalized = core.to_string();
        for _ in parts..3 {
            normalized.push_str(".0");
        }
        normalized.push_str(suffix);

        let parsed =
            ::semver::Version::parse(&normalized).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            major: parsed.major.to_string(),
            minor: parsed.minor.to_string(),
            patch: parsed.patch.to_string(),
            pre_release: parsed.pre.to_string(),
            build: parsed.build.to_string(),
        })
    }

    /// テンプレートごとにタグを生成
    pub fn version_tree(&self, templates: &[String]) -> BuildResult<Vec<String>> {
        let mut processor = TemplateProcessor::new();
        for (key, value) in [
            ("Major", &self.major),
            ("Minor", &self.minor),
            ("Patch", &self.patch),
            ("PreRelease", &self.pre_release),
            ("Build", &self.build),
        ] {
            processor.add_variable(key, Value::from(value.as_str()));
        }

        templates
            .iter()
            .map(|template| {
                processor.render_str(template).map_err(|e| {
                    BuildError::Template(format!("Failed to render '{}': {}", template, e))
                })
            })
            .collect()
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre_release.is_empty() {
            write!(f, "-{}", self.pre_release)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}
