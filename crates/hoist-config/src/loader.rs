//! イメージツリーとビルダー定義のローダー
//!
//! パスにはファイルまたはディレクトリを指定できる。ディレクトリの場合は
//! 直下の `*.yaml` / `*.yml` をファイル名順に読み込んでマージする。

use crate::error::{ConfigError, Result};
use hoist_core::{Builder, Builders, ImagesTree};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Default, Deserialize)]
struct ImagesDocument {
    images: Option<ImagesTree>,
    /// `images` の旧名
    images_tree: Option<ImagesTree>,
}

impl ImagesDocument {
    /// 両方のキーをまとめる（同じ name:version は `images` が優先）
    fn into_tree(self, file: &Path) -> Option<ImagesTree> {
        if self.images_tree.is_some() {
            warn!(
                file = %file.display(),
                "'images_tree' is deprecated, use 'images' instead"
            );
        }
        match (self.images_tree, self.images) {
            (None, None) => None,
            (Some(tree), None) | (None, Some(tree)) => Some(tree),
            (Some(mut tree), Some(images)) => {
                tree.merge(images);
                Some(tree)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BuildersDocument {
    #[serde(default)]
    builders: Option<BTreeMap<String, Option<Builder>>>,
}

/// イメージツリーを読み込む
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_images_tree(path: &Path) -> Result<ImagesTree> {
    let mut tree: Option<ImagesTree> = None;

    for file in yaml_files(path)? {
        let document: ImagesDocument = read_document(&file)?;
        if let Some(images) = document.into_tree(&file) {
            debug!(file = %file.display(), images = images.len(), "Loaded images tree");
            tree.get_or_insert_with(ImagesTree::new).merge(images);
        }
    }

    let tree = tree.ok_or_else(|| ConfigError::ImagesNotDefined(path.to_path_buf()))?;
    info!(images = tree.len(), "Images tree loaded");
    Ok(tree)
}

/// ビルダー定義を読み込む（`builders` が無ければ空）
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_builders(path: &Path) -> Result<Builders> {
    let mut builders = Builders::new();

    for file in yaml_files(path)? {
        let document: BuildersDocument = read_document(&file)?;
        if let Some(definitions) = document.builders {
            debug!(file = %file.display(), builders = definitions.len(), "Loaded builders");
            builders.merge(Builders::from_definitions(definitions))?;
        }
    }

    info!(builders = builders.len(), "Builders loaded");
    Ok(builders)
}

/// 読み込み対象のYAMLファイル一覧
fn yaml_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(ConfigError::PathNotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        let is_yaml = file
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if file.is_file() && is_yaml {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::BuilderRef;
    use std::fs;

    const IMAGES: &str = r#"
images_tree:
  ubuntu:
    "18.04":
      builder: infrastructure
      children:
        php-fpm:
          - "7.2"
  php-fpm:
    "7.2":
      version: "7.2-ubuntu{{ .Parent.Version }}"
      builder: infrastructure
"#;

    const BUILDERS: &str = r#"
builders:
  infrastructure:
    driver: docker
    options:
      context:
        path: ./images
"#;

    #[test]
    fn test_load_images_tree_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("images.yaml");
        fs::write(&path, IMAGES).unwrap();

        let tree = load_images_tree(&path).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.contains("ubuntu", "18.04"));
    }

    #[test]
    fn test_load_images_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("images.yaml");
        fs::write(&path, IMAGES.replace("images_tree:", "images:")).unwrap();

        let tree = load_images_tree(&path).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(tree.contains("php-fpm", "7.2"));
    }

    #[test]
    fn test_images_key_wins_over_images_tree() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("images.yaml");
        fs::write(
            &path,
            r#"
images_tree:
  ubuntu:
    "18.04":
      builder: legacy
  alpine:
    "3.19":
      builder: legacy
images:
  ubuntu:
    "18.04":
      builder: infrastructure
"#,
        )
        .unwrap();

        let tree = load_images_tree(&path).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(
            tree.get("ubuntu", "18.04").unwrap().builder,
            Some(BuilderRef::Reference("infrastructure".to_string()))
        );
        assert!(tree.contains("alpine", "3.19"));
    }

    #[test]
    fn test_load_images_tree_missing_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("images.yaml");
        fs::write(&path, BUILDERS).unwrap();

        assert!(matches!(
            load_images_tree(&path),
            Err(ConfigError::ImagesNotDefined(_))
        ));
    }

    #[test]
    fn test_load_from_single_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("hoist.yaml");
        fs::write(&path, format!("{}\n{}", IMAGES, BUILDERS)).unwrap();

        let tree = load_images_tree(&path).unwrap();
        let builders = load_builders(&path).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(builders.get("infrastructure").unwrap().driver, "docker");
    }

    #[test]
    fn test_load_builders_missing_key() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("images.yaml");
        fs::write(&path, IMAGES).unwrap();

        let builders = load_builders(&path).unwrap();
        assert!(builders.is_empty());
    }

    #[test]
    fn test_load_images_tree_from_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("01-ubuntu.yaml"), IMAGES).unwrap();
        fs::write(
            temp_dir.path().join("02-alpine.yml"),
            "images_tree:\n  alpine:\n    \"3.19\":\n      builder: infrastructure\n",
        )
        .unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let tree = load_images_tree(temp_dir.path()).unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.contains("alpine", "3.19"));
    }

    #[test]
    fn test_duplicate_builders_across_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("a.yaml"), BUILDERS).unwrap();
        fs::write(temp_dir.path().join("b.yaml"), BUILDERS).unwrap();

        assert!(matches!(
            load_builders(temp_dir.path()),
            Err(ConfigError::Core(_))
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("images.yaml");
        fs::write(&path, "images_tree: [unclosed").unwrap();

        assert!(matches!(
            load_images_tree(&path),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
