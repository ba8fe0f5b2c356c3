use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: hoist.yaml, .hoist.yaml\n\
        - ./.hoist/ ディレクトリ\n\
        - ~/.config/hoist/hoist.yaml\n\
        または HOIST_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("指定されたファイルが存在しません: {0}")]
    PathNotFound(PathBuf),

    #[error("images (または images_tree) が定義されていません: {0}")]
    ImagesNotDefined(PathBuf),

    #[error("YAMLパースエラー: {path}\n理由: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("無効な設定: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] hoist_core::CoreError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
