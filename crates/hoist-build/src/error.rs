use hoist_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error("No matching images found for '{name}' (versions: {versions})")]
    NoMatchingImages { name: String, versions: String },

    #[error(transparent)]
    Resolve(#[from] CoreError),

    #[error("Builder is not defined for image '{0}'")]
    BuilderUndefined(String),

    #[error("Driver '{0}' is not registered")]
    DriverNotFound(String),

    #[error("Driver '{driver}' could not be created: {message}")]
    DriverInstantiation { driver: String, message: String },

    #[error("Driver already registered: {0}")]
    DriverAlreadyRegistered(String),

    #[error("Driver failed: {0}")]
    DriverFailed(String),

    #[error("Building '{image}' failed: {source}")]
    ImageBuild {
        image: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("Children of '{image}' failed to build:\n{}", format_errors(.errors))]
    Cascade {
        image: String,
        errors: Vec<BuildError>,
    },

    #[error("{context}:\n{}", format_errors(.errors))]
    Aggregate {
        context: String,
        errors: Vec<BuildError>,
    },

    #[error("Build cancelled")]
    Cancelled,

    #[error("Dispatcher is closed")]
    DispatcherClosed,

    #[error("Invalid semantic version '{version}': {message}")]
    SemVer { version: String, message: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Promote failed: {0}")]
    Promote(String),
}

/// 子エラーをインデントした箇条書きにする
fn format_errors(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(|error| {
            let text = error.to_string();
            let mut lines = text.lines();
            let mut out = format!("  - {}", lines.next().unwrap_or_default());
            for line in lines {
                out.push_str("\n    ");
                out.push_str(line);
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl BuildError {
    /// 集約エラーを展開し、末端の失敗を列挙する
    pub fn failures(&self) -> Vec<&BuildError> {
        match self {
            BuildError::Aggregate { errors, .. } | BuildError::Cascade { errors, .. } => {
                errors.iter().flat_map(BuildError::failures).collect()
            }
            other => vec![other],
        }
    }

    /// 失敗したイメージ名（ImageBuild の場合）
    pub fn image(&self) -> Option<&str> {
        match self {
            BuildError::ImageBuild { image, .. } | BuildError::Cascade { image, .. } => {
                Some(image)
            }
            _ => None,
        }
    }

    /// キャンセルによる失敗か
    pub fn is_cancelled(&self) -> bool {
        match self {
            BuildError::Cancelled => true,
            BuildError::ImageBuild { source, .. } => source.is_cancelled(),
            BuildError::Aggregate { errors, .. } | BuildError::Cascade { errors, .. } => {
                !errors.is_empty() && errors.iter().all(BuildError::is_cancelled)
            }
            _ => false,
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::ContextNotFound(path) => {
                format!(
                    "ビルドコンテキストが見つかりません: {}\n\
                     \n\
                     ビルダーの options.context を確認してください。",
                    path.display()
                )
            }
            BuildError::DockerfileNotFound(path) => {
                format!(
                    "Dockerfileが見つかりません: {}\n\
                     \n\
                     ビルダーの options.dockerfile でパスを指定してください。",
                    path.display()
                )
            }
            BuildError::DriverNotFound(driver) => {
                format!(
                    "ドライバー '{}' は登録されていません\n\
                     \n\
                     利用可能なドライバー: default, docker, ansible-playbook",
                    driver
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
