//! イメージ定義のフィールド単位の展開
//!
//! 文字列フィールドごとに `{Name, Version, Parent, Image, DateRFC3339, DateRFC3339Nano}` を
//! コンテキストとしてテンプレートを評価する。

use crate::error::{CoreError, Result};
use crate::model::{Builder, BuilderRef, Image, Variables};
use crate::template::TemplateProcessor;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// テンプレートから参照できるイメージの表現
pub(crate) fn template_view(image: &Image) -> Value {
    json!({
        "Name": image.name,
        "Version": image.version,
        "RegistryHost": image.registry_host,
        "Registry": image.registry_host,
        "RegistryNamespace": image.registry_namespace,
        "Namespace": image.registry_namespace,
        "Tags": image.tags,
        "Vars": image.vars,
        "PersistentVars": image.persistent_vars,
    })
}

/// テンプレートから参照できる日時
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderDates {
    pub rfc3339: String,
    pub rfc3339_nano: String,
}

impl RenderDates {
    pub fn at(now: &DateTime<FixedOffset>) -> Self {
        Self {
            rfc3339: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            rfc3339_nano: trim_fraction(&now.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        }
    }

    pub fn now() -> Self {
        Self::at(&Local::now().fixed_offset())
    }
}

/// 小数秒の末尾の0を落とす（全て0なら小数点ごと）
fn trim_fraction(timestamp: &str) -> String {
    let Some(dot) = timestamp.find('.') else {
        return timestamp.to_string();
    };
    let rest = &timestamp[dot + 1..];
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = rest[..digits_end].trim_end_matches('0');
    let suffix = &rest[digits_end..];

    if digits.is_empty() {
        format!("{}{}", &timestamp[..dot], suffix)
    } else {
        format!("{}.{}{}", &timestamp[..dot], digits, suffix)
    }
}

struct Renderer {
    processor: TemplateProcessor,
    node: String,
}

impl Renderer {
    fn field(&mut self, field: &str, value: &str) -> Result<String> {
        self.processor
            .render_str(value)
            .map_err(|e| CoreError::Render {
                node: self.node.clone(),
                field: field.to_string(),
                message: match e {
                    CoreError::Template(message) => message,
                    other => other.to_string(),
                },
            })
    }

    fn value(&mut self, field: &str, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.field(field, s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.value(field, item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut rendered = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    rendered.insert(key.clone(), self.value(&format!("{}.{}", field, key), item)?);
                }
                Value::Object(rendered)
            }
            other => other.clone(),
        })
    }

    fn variables(&mut self, field: &str, vars: &Variables) -> Result<Variables> {
        vars.iter()
            .map(|(key, value)| {
                let rendered = self.value(&format!("{}.{}", field, key), value)?;
                Ok((key.clone(), rendered))
            })
            .collect()
    }

    fn builder(&mut self, builder: &BuilderRef) -> Result<BuilderRef> {
        Ok(match builder {
            BuilderRef::Reference(name) => BuilderRef::Reference(self.field("builder", name)?),
            BuilderRef::Inline(inline) => {
                let mut options = BTreeMap::new();
                for (key, value) in &inline.options {
                    options.insert(
                        key.clone(),
                        self.value(&format!("builder.options.{}", key), value)?,
                    );
                }
                BuilderRef::Inline(Builder {
                    name: self.field("builder.name", &inline.name)?,
                    driver: self.field("builder.driver", &inline.driver)?,
                    options,
                    variables_mapping: inline.variables_mapping.clone(),
                })
            }
        })
    }
}

/// イメージのコピーを展開して返す（元のイメージは変更しない）
///
/// * `name` / `version` - テンプレート上の名前とバージョン
/// * `parent` - 展開済みの親イメージ（ルートの場合は空のイメージ）
pub(crate) fn render_image(
    image: &Image,
    name: &str,
    version: &str,
    parent: &Image,
    dates: &RenderDates,
) -> Result<Image> {
    let mut processor = TemplateProcessor::new();
    processor.add_variable("Name", json!(name));
    processor.add_variable("Version", json!(version));
    processor.add_variable("Parent", template_view(parent));
    processor.add_variable("Image", template_view(image));
    processor.add_variable("DateRFC3339", json!(dates.rfc3339));
    processor.add_variable("DateRFC3339Nano", json!(dates.rfc3339_nano));

    let mut renderer = Renderer {
        processor,
        node: image.key(),
    };

    let mut children = BTreeMap::new();
    for (child_name, versions) in &image.children {
        let rendered_name = renderer.field("children", child_name)?;
        let rendered_versions = versions
            .iter()
            .map(|v| renderer.field(&format!("children.{}", child_name), v))
            .collect::<Result<Vec<_>>>()?;
        children.insert(rendered_name, rendered_versions);
    }

    Ok(Image {
        name: renderer.field("name", &image.name)?,
        version: renderer.field("version", &image.version)?,
        builder: image
            .builder
            .as_ref()
            .map(|b| renderer.builder(b))
            .transpose()?,
        registry_host: renderer.field("registry", &image.registry_host)?,
        registry_namespace: renderer.field("namespace", &image.registry_namespace)?,
        tags: image
            .tags
            .iter()
            .map(|tag| renderer.field("tags", tag))
            .collect::<Result<Vec<_>>>()?,
        persistent_vars: renderer.variables("persistent_vars", &image.persistent_vars)?,
        vars: renderer.variables("vars", &image.vars)?,
        children,
    })
}

/// 親の永続変数で不足分を補う（子の値が優先）
pub(crate) fn inherit_persistent_vars(image: &mut Image, parent: &Image) {
    for (key, value) in &parent.persistent_vars {
        image
            .persistent_vars
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_parent_version() {
        let parent = Image::new("ubuntu", "18.04");
        let image = Image {
            name: "php-fpm".to_string(),
            version: "7.2-ubuntu{{ .Parent.Version }}".to_string(),
            tags: vec!["{{ .Parent.Name }}".to_string()],
            ..Default::default()
        }
        .with_var("base", json!("{{ .Parent.Name }}:{{ .Parent.Version }}"))
        .with_var("retries", json!(3));

        let rendered = render_image(&image, "php-fpm", "7.2", &parent, &RenderDates::default()).unwrap();
        assert_eq!(rendered.version, "7.2-ubuntu18.04");
        assert_eq!(rendered.tags, vec!["ubuntu".to_string()]);
        assert_eq!(rendered.vars.get("base"), Some(&json!("ubuntu:18.04")));
        assert_eq!(rendered.vars.get("retries"), Some(&json!(3)));

        // 元のイメージは変更されない
        assert_eq!(image.version, "7.2-ubuntu{{ .Parent.Version }}");
    }

    #[test]
    fn test_render_nested_builder_options() {
        let parent = Image::new("base", "1.0");
        let image = Image::new("app", "2.0").with_builder(BuilderRef::Inline(
            Builder::new("", "docker")
                .with_option("context", json!([{"path": "./{{ .Name }}"}])),
        ));

        let rendered = render_image(&image, "app", "2.0", &parent, &RenderDates::default()).unwrap();
        match rendered.builder {
            Some(BuilderRef::Inline(builder)) => {
                assert_eq!(builder.options.get("context"), Some(&json!([{"path": "./app"}])));
            }
            other => panic!("Expected inline builder, got {:?}", other),
        }
    }

    #[test]
    fn test_render_error_names_node_and_field() {
        let image = Image::new("app", "{{ .Parent.Missing }}");
        let result = render_image(&image, "app", "1", &Image::default(), &RenderDates::default());

        match result {
            Err(CoreError::Render { node, field, .. }) => {
                assert_eq!(node, "app:{{ .Parent.Missing }}");
                assert_eq!(field, "version");
            }
            other => panic!("Expected render error, got {:?}", other),
        }
    }

    #[test]
    fn test_render_dates() {
        let now = DateTime::parse_from_rfc3339("2024-03-01T09:30:15.120+09:00").unwrap();
        let dates = RenderDates::at(&now);
        assert_eq!(dates.rfc3339, "2024-03-01T09:30:15+09:00");
        assert_eq!(dates.rfc3339_nano, "2024-03-01T09:30:15.12+09:00");

        let image = Image::new("app", "1")
            .with_var("built_at", json!("{{ .DateRFC3339 }}"))
            .with_var("built_at_nano", json!("{{ .DateRFC3339Nano }}"));
        let rendered = render_image(&image, "app", "1", &Image::default(), &dates).unwrap();
        assert_eq!(rendered.vars.get("built_at"), Some(&json!("2024-03-01T09:30:15+09:00")));
        assert_eq!(
            rendered.vars.get("built_at_nano"),
            Some(&json!("2024-03-01T09:30:15.12+09:00"))
        );
    }

    #[test]
    fn test_trim_fraction() {
        assert_eq!(trim_fraction("2024-03-01T00:00:00.000000000Z"), "2024-03-01T00:00:00Z");
        assert_eq!(trim_fraction("2024-03-01T00:00:00.500000000Z"), "2024-03-01T00:00:00.5Z");
        assert_eq!(trim_fraction("2024-03-01T00:00:00Z"), "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_inherit_persistent_vars_child_wins() {
        let parent = Image::new("base", "1")
            .with_persistent_var("os", json!("ubuntu"))
            .with_persistent_var("arch", json!("amd64"));
        let mut child = Image::new("app", "1").with_persistent_var("os", json!("debian"));

        inherit_persistent_vars(&mut child, &parent);

        assert_eq!(child.persistent_vars.get("os"), Some(&json!("debian")));
        assert_eq!(child.persistent_vars.get("arch"), Some(&json!("amd64")));
    }
}
