pub mod error;
pub mod loader;

pub use error::*;
pub use loader::{load_builders, load_images_tree};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// 設定ファイルを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "HOIST_CONFIG_PATH";

/// 設定ファイルの候補（優先順）
const CONFIG_CANDIDATES: [&str; 2] = ["hoist.yaml", ".hoist.yaml"];

/// 既定のセマンティックバージョンタグテンプレート
pub const DEFAULT_SEMVER_TEMPLATE: &str = "{{ .Major }}.{{ .Minor }}.{{ .Patch }}";

/// Hoist の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// イメージツリーの定義（ファイルまたはディレクトリ）
    pub images_path: PathBuf,
    /// ビルダーの定義（ファイルまたはディレクトリ）
    pub builders_path: PathBuf,
    /// 同時に実行するビルド数
    pub concurrency: usize,
    pub push_images: bool,
    pub semantic_version_tags_enabled: bool,
    pub semantic_version_tags_templates: Vec<String>,
    /// ログの出力先（未指定時は標準エラー）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images_path: PathBuf::from(CONFIG_CANDIDATES[0]),
            builders_path: PathBuf::from(CONFIG_CANDIDATES[0]),
            concurrency: default_concurrency(),
            push_images: true,
            semantic_version_tags_enabled: false,
            semantic_version_tags_templates: vec![DEFAULT_SEMVER_TEMPLATE.to_string()],
            log_path_file: None,
        }
    }
}

/// CPU数の1/4（最低1）
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 4)
        .unwrap_or(1)
        .max(1)
}

impl Config {
    /// 設定を読み込む
    ///
    /// `path` が指定されていればそのファイルを使い、なければ [`find_config_file`]
    /// で探索する。設定ファイルが見つからない場合は既定値を返す。
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if path.exists() => path.to_path_buf(),
            Some(path) => return Err(ConfigError::PathNotFound(path.to_path_buf())),
            None => match find_config_file() {
                Ok(path) => path,
                Err(ConfigError::ConfigFileNotFound) => {
                    info!("No configuration file found, using defaults");
                    return Ok(Self::default());
                }
                Err(e) => return Err(e),
            },
        };

        Self::from_file(&path)
    }

    /// 設定ファイルを読み込む
    ///
    /// 相対パスは設定ファイルのディレクトリを基準に解決する。
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = std::fs::read_to_string(path)?;

        let mut config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.images_path = resolve_path(base_dir, &config.images_path);
        config.builders_path = resolve_path(base_dir, &config.builders_path);
        config.log_path_file = config
            .log_path_file
            .map(|log_path| resolve_path(base_dir, &log_path));

        config.validate()?;
        Ok(config)
    }

    /// 設定値の検証
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency は 1 以上を指定してください".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// プロジェクトの hoist.yaml を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 HOIST_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: hoist.yaml, .hoist.yaml
/// 3. ./.hoist/ ディレクトリ内: 同様の順序
/// 4. ~/.config/hoist/hoist.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CONFIG_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.hoist/ ディレクトリで検索
    let hoist_dir = current_dir.join(".hoist");
    if hoist_dir.is_dir() {
        for filename in &CONFIG_CANDIDATES {
            let path = hoist_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("hoist").join(CONFIG_CANDIDATES[0]);
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}
