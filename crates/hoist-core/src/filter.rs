//! イメージ一覧の絞り込み
//!
//! `attribute=value` 形式の条件を解釈し、完全一致でイメージを選ぶ。

use crate::error::{CoreError, Result};
use crate::model::Image;
use std::fmt;
use std::str::FromStr;

const EQ: char = '=';

/// 絞り込みに使える属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAttribute {
    Name,
    Version,
    Registry,
    Namespace,
}

impl FilterAttribute {
    pub const ALL: [FilterAttribute; 4] = [
        FilterAttribute::Name,
        FilterAttribute::Version,
        FilterAttribute::Registry,
        FilterAttribute::Namespace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterAttribute::Name => "name",
            FilterAttribute::Version => "version",
            FilterAttribute::Registry => "registry",
            FilterAttribute::Namespace => "namespace",
        }
    }

    fn value<'a>(&self, image: &'a Image) -> &'a str {
        match self {
            FilterAttribute::Name => &image.name,
            FilterAttribute::Version => &image.version,
            FilterAttribute::Registry => &image.registry_host,
            FilterAttribute::Namespace => &image.registry_namespace,
        }
    }
}

impl FromStr for FilterAttribute {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        FilterAttribute::ALL
            .into_iter()
            .find(|attribute| attribute.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = FilterAttribute::ALL.iter().map(|a| a.as_str()).collect();
                CoreError::InvalidFilter(format!(
                    "未対応の属性 '{}' (使用可能: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// `attribute=value` の絞り込み条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFilter {
    pub attribute: FilterAttribute,
    pub value: String,
}

impl ImageFilter {
    pub fn new(attribute: FilterAttribute, value: impl Into<String>) -> Self {
        Self {
            attribute,
            value: value.into(),
        }
    }

    pub fn matches(&self, image: &Image) -> bool {
        self.attribute.value(image) == self.value
    }

    /// すべての条件に一致するか（条件が空なら常に一致）
    pub fn all_match(filters: &[ImageFilter], image: &Image) -> bool {
        filters.iter().all(|filter| filter.matches(image))
    }
}

impl FromStr for ImageFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut tokens = s.split(EQ);
        match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(attribute), Some(value), None) if !attribute.is_empty() => {
                Ok(Self::new(attribute.trim().parse()?, value.trim()))
            }
            _ => Err(CoreError::InvalidFilter(format!(
                "'{}' は <attribute>=<value> の形式ではありません",
                s
            ))),
        }
    }
}

impl fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.attribute.as_str(), EQ, self.value)
    }
}
