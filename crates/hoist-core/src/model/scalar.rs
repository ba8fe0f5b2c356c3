//! YAMLスカラー値の文字列化
//!
//! バージョンは `18.04` や `3` のように数値として書かれることが多いため、
//! 文字列・数値・真偽値のいずれも文字列として受け付ける。

use serde::de::{Deserialize, Deserializer, Error};
use std::collections::BTreeMap;

/// YAMLスカラーを文字列に変換（マッピングとシーケンスは None）
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        _ => None,
    }
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    scalar_to_string(&value)
        .ok_or_else(|| D::Error::custom(format!("expected a scalar value, found {:?}", value)))
}

/// `children` を読み込む
///
/// 子バージョンはリストでも単一のスカラーでも書ける。
pub(crate) fn children_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    let mapping = match value {
        serde_yaml::Value::Null => return Ok(BTreeMap::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        other => {
            return Err(D::Error::custom(format!(
                "children must be a mapping, found {:?}",
                other
            )));
        }
    };

    let mut children = BTreeMap::new();
    for (name, versions) in mapping {
        let name = scalar_to_string(&name)
            .ok_or_else(|| D::Error::custom("child name must be a scalar"))?;
        let versions = match versions {
            serde_yaml::Value::Sequence(seq) => seq
                .iter()
                .map(|v| {
                    scalar_to_string(v).ok_or_else(|| {
                        D::Error::custom(format!("child '{}' version must be a scalar", name))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            serde_yaml::Value::Null => Vec::new(),
            scalar => vec![scalar_to_string(&scalar).ok_or_else(|| {
                D::Error::custom(format!("child '{}' versions must be a list", name))
            })?],
        };
        children.insert(name, versions);
    }

    Ok(children)
}
