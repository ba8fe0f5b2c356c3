//! Docker ビルドコンテキスト
//!
//! コンテキストディレクトリと Dockerfile を gzip 圧縮した tar にまとめる。
//! Dockerfile はコンテキスト外にあっても `Dockerfile` としてアーカイブに入る。

use crate::error::{BuildError, BuildResult};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 警告を出すコンテキストサイズ（500MB）
const CONTEXT_SIZE_WARNING: usize = 500 * 1024 * 1024;

/// アーカイブ内の Dockerfile 名
pub const ARCHIVE_DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    context_dir: PathBuf,
    dockerfile: PathBuf,
}

impl BuildContext {
    /// コンテキストと Dockerfile を指定して作成
    ///
    /// `dockerfile` が相対パスの場合はコンテキストからの相対、
    /// 省略時は `<context>/Dockerfile`。
    pub fn new(context_dir: impl Into<PathBuf>, dockerfile: Option<&Path>) -> Self {
        let context_dir = context_dir.into();
        let dockerfile = match dockerfile {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => context_dir.join(path),
            None => context_dir.join(ARCHIVE_DOCKERFILE),
        };
        Self {
            context_dir,
            dockerfile,
        }
    }

    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    pub fn dockerfile(&self) -> &Path {
        &self.dockerfile
    }

    /// ディレクトリと Dockerfile の存在を確認
    pub fn validate(&self) -> BuildResult<()> {
        if !self.context_dir.is_dir() {
            return Err(BuildError::ContextNotFound(self.context_dir.clone()));
        }
        if !self.dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(self.dockerfile.clone()));
        }
        Ok(())
    }

    /// tar.gz アーカイブを作成
    pub fn archive(&self) -> BuildResult<Vec<u8>> {
        self.validate()?;
        debug!(context = %self.context_dir.display(), "Creating build context");

        let dockerfile = std::fs::read(&self.dockerfile)?;

        let mut data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut data, Compression::default());
            let mut tar = tar::Builder::new(encoder);
            tar.follow_symlinks(false);
            tar.append_dir_all(".", &self.context_dir)?;

            let mut header = tar::Header::new_gnu();
            header.set_size(dockerfile.len() as u64);
            header.set_mode(0o644);
            tar.append_data(&mut header, ARCHIVE_DOCKERFILE, dockerfile.as_slice())?;

            tar.into_inner()?.finish()?;
        }

        debug!(bytes = data.len(), "Build context created");
        if data.len() > CONTEXT_SIZE_WARNING {
            warn!(
                "ビルドコンテキストが大きすぎます（{}MB）。.dockerignore で不要なファイルを除外してください",
                data.len() / 1024 / 1024
            );
        }

        Ok(data)
    }
}
