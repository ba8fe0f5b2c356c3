use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("循環依存が検出されました: {0}")]
    CycleDetected(String),

    #[error("テンプレート展開エラー: {node} ({field})\n理由: {message}")]
    Render {
        node: String,
        field: String,
        message: String,
    },

    #[error("イメージが見つかりません: {0}")]
    ImageNotFound(String),

    #[error("イメージが見つかりません: {name}:{version}")]
    ImageVersionNotFound { name: String, version: String },

    #[error("イメージ '{0}' にワイルドカードバージョンが定義されていません")]
    WildcardNotFound(String),

    #[error("ビルダーが見つかりません: {0}")]
    BuilderNotFound(String),

    #[error("ビルダーは既に登録されています: {0}")]
    BuilderAlreadyExists(String),

    #[error("テンプレート展開エラー: {0}")]
    Template(String),

    #[error("無効な絞り込み条件: {0}")]
    InvalidFilter(String),

    #[error("無効なノード: {0}")]
    InvalidNode(String),

    #[error("YAMLパースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
