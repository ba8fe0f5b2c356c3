//! Docker デーモン上のイメージ操作
//!
//! pull / tag / push / remove をまとめたクライアント。
//! 進捗は出力プレフィックス付きで標準出力に表示する。

use crate::auth::RegistryAuth;
use crate::error::{BuildError, BuildResult};
use crate::image_url::ImageUrl;
use crate::options::Credentials;
use bollard::Docker;
use colored::Colorize;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Docker タグの最大長
const MAX_TAG_LEN: usize = 128;

pub struct RegistryClient {
    docker: Docker,
    auth: RegistryAuth,
    prefix: String,
}

impl RegistryClient {
    pub fn new(docker: Docker, prefix: impl Into<String>) -> Self {
        Self {
            docker,
            auth: RegistryAuth::new(),
            prefix: prefix.into(),
        }
    }

    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    fn print(&self, message: impl std::fmt::Display) {
        println!("{} {}", format!("[{}]", self.prefix).cyan(), message);
    }

    /// イメージを pull
    pub async fn pull(
        &self,
        image: &ImageUrl,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> BuildResult<()> {
        let credentials = self.auth.resolve(image, credentials)?;
        let url = image.url();
        info!(image = %url, "Pulling image");
        self.print(format!("{} {}", "pull".yellow(), url));

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image: image.repository(),
            tag: image.tag.clone(),
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, credentials);
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = item else { break };

            let info = item?;
            if let Some(error) = info.error {
                return Err(BuildError::BuildFailed(format!(
                    "Failed to pull {}: {}",
                    url, error
                )));
            }
            if let Some(status) = info.status {
                debug!(image = %url, status = %status, "Pull progress");
            }
        }
        Ok(())
    }

    /// `source` に `target` のタグを付ける
    pub async fn tag(&self, source: &ImageUrl, target: &ImageUrl) -> BuildResult<()> {
        validate_tag(&target.tag)?;
        debug!(source = %source, target = %target, "Tagging image");

        let options = bollard::query_parameters::TagImageOptionsBuilder::default()
            .repo(&target.repository())
            .tag(&crate::image_url::sanitize_tag(&target.tag))
            .build();
        self.docker.tag_image(&source.url(), Some(options)).await?;
        Ok(())
    }

    /// イメージを push
    pub async fn push(
        &self,
        image: &ImageUrl,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> BuildResult<()> {
        let tag = crate::image_url::sanitize_tag(&image.tag);
        validate_tag(&tag)?;
        let credentials = self.auth.resolve(image, credentials)?;
        let url = image.url();
        info!(image = %url, "Pushing image");
        self.print(format!("{} {}", "push".yellow(), url));

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> { tag };

        #[allow(deprecated)]
        let mut stream = self
            .docker
            .push_image(&image.repository(), Some(options), credentials);

        let mut last_status = String::new();
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = item else { break };

            let info = item.map_err(|e| BuildError::PushFailed {
                message: e.to_string(),
            })?;
            if let Some(error) = info.error {
                return Err(BuildError::PushFailed {
                    message: format!("{}: {}", url, error),
                });
            }
            if let Some(status) = info.status
                && status != last_status
                && !matches!(status.as_str(), "Preparing" | "Waiting" | "Pushing")
            {
                self.print(&status);
                last_status = status;
            }
        }

        self.print(format!("{} {}", "✓".green(), url));
        Ok(())
    }

    /// ローカルのイメージを削除
    pub async fn remove(&self, image: &ImageUrl) -> BuildResult<()> {
        let url = image.url();
        debug!(image = %url, "Removing image");

        let options = bollard::query_parameters::RemoveImageOptionsBuilder::default()
            .force(true)
            .build();
        self.docker.remove_image(&url, Some(options), None).await?;
        Ok(())
    }
}

/// Docker タグとして有効か検証
///
/// 128文字以下、英数字と `.` `-` `_` のみ、先頭は `.` `-` 以外。
pub fn validate_tag(tag: &str) -> BuildResult<()> {
    let invalid = |reason: String| BuildError::InvalidTag { tag: reason };

    if tag.is_empty() {
        return Err(invalid("(empty)".to_string()));
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(invalid(format!(
            "{} ({} characters, max {})",
            tag,
            tag.len(),
            MAX_TAG_LEN
        )));
    }
    if tag.starts_with(['.', '-']) {
        return Err(invalid(tag.to_string()));
    }
    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return Err(invalid(format!("{} (invalid character '{}')", tag, c)));
    }
    Ok(())
}
