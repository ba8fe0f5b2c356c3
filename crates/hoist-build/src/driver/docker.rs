//! Docker ドライバー
//!
//! ビルダーの `context` / `dockerfile` オプションからビルドコンテキストを作り、
//! Docker デーモンでイメージをビルドする。必要に応じて親イメージの pull、
//! 追加タグの付与、push、ローカルイメージの削除まで行う。

use super::Driver;
use crate::context::{ARCHIVE_DOCKERFILE, BuildContext};
use crate::error::{BuildError, BuildResult};
use crate::image_url::ImageUrl;
use crate::options::{BuildOptions, Credentials};
use crate::registry::RegistryClient;
use async_trait::async_trait;
use bollard::Docker;
use bytes::Bytes;
use colored::Colorize;
use futures_util::StreamExt;
use hoist_core::model::varmap::{
    IMAGE_FROM_NAME_KEY, IMAGE_FROM_REGISTRY_HOST_KEY, IMAGE_FROM_REGISTRY_NAMESPACE_KEY,
    IMAGE_FROM_TAG_KEY,
};
use http_body_util::{Either, Full};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const DOCKER_DRIVER: &str = "docker";

/// Docker ビルドの実行計画
#[derive(Debug, Clone, PartialEq)]
pub struct DockerBuildPlan {
    pub image: ImageUrl,
    pub extra_tags: Vec<ImageUrl>,
    pub context: BuildContext,
    /// 先に追加したものが優先される
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub parent: Option<ImageUrl>,
    pub pull_parent: bool,
    pub push: bool,
    pub remove_after: bool,
    pub output_prefix: String,
    pub pull_auth: Option<Credentials>,
    pub push_auth: Option<Credentials>,
}

impl DockerBuildPlan {
    pub fn from_options(options: &BuildOptions) -> BuildResult<Self> {
        if options.image_name.is_empty() {
            return Err(BuildError::InvalidConfig(
                "Docker driver requires an image name".to_string(),
            ));
        }

        let context_dir = context_path(options)?;
        let dockerfile = options.builder_option_str("dockerfile").map(PathBuf::from);
        let context = BuildContext::new(context_dir, dockerfile.as_deref());

        let image = options.image_url();
        let mut build_args = BTreeMap::new();
        let mut add_arg = |name: &str, value: String| {
            if name.is_empty() {
                return;
            }
            build_args.entry(name.to_string()).or_insert(value);
        };

        for (name, value) in options.persistent_vars.iter().chain(options.vars.iter()) {
            add_arg(name, value_to_arg(value));
        }

        let parent = options.image_from_url();
        let from_args = [
            (IMAGE_FROM_NAME_KEY, &options.image_from_name),
            (IMAGE_FROM_TAG_KEY, &options.image_from_version),
            (
                IMAGE_FROM_REGISTRY_NAMESPACE_KEY,
                &options.image_from_registry_namespace,
            ),
            (IMAGE_FROM_REGISTRY_HOST_KEY, &options.image_from_registry_host),
        ];
        for (key, value) in from_args {
            if value.is_empty() {
                continue;
            }
            if let Some(name) = options.mapped_key(key) {
                add_arg(name, value.clone());
            }
        }

        let extra_tags = options
            .tags
            .iter()
            .filter(|tag| **tag != image.tag)
            .map(|tag| image.with_tag(tag.as_str()))
            .collect();

        let output_prefix = if options.output_prefix.is_empty() {
            image.url()
        } else {
            options.output_prefix.clone()
        };

        Ok(Self {
            extra_tags,
            context,
            build_args,
            labels: options.labels.clone(),
            pull_parent: options.pull_parent_image && parent.is_some(),
            parent,
            push: options.push_images && !options.dry_run,
            remove_after: options.remove_image_after_build,
            output_prefix,
            pull_auth: options.pull_auth.clone(),
            push_auth: options.push_auth.clone(),
            image,
        })
    }

    /// ビルド後に付与される全ての参照（メインタグを含む）
    pub fn all_images(&self) -> Vec<&ImageUrl> {
        std::iter::once(&self.image)
            .chain(self.extra_tags.iter())
            .collect()
    }
}

/// `context` オプションからディレクトリを取り出す
///
/// 文字列、`{path: ...}`、またはそれらのリスト（先頭を使用）を受け付ける。
fn context_path(options: &BuildOptions) -> BuildResult<PathBuf> {
    let missing = || {
        BuildError::InvalidConfig(format!(
            "Builder '{}' has no docker build context defined",
            options.builder_name
        ))
    };

    let value = options.builder_options.get("context").ok_or_else(missing)?;
    let first = match value {
        serde_json::Value::Array(items) => items.first().ok_or_else(missing)?,
        other => other,
    };

    let path = match first {
        serde_json::Value::String(path) => Some(path.as_str()),
        serde_json::Value::Object(map) => map.get("path").and_then(|p| p.as_str()),
        _ => None,
    };

    match path {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(BuildError::InvalidConfig(format!(
            "Only local path build contexts are supported (builder '{}')",
            options.builder_name
        ))),
    }
}

fn value_to_arg(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct DockerDriver {
    plan: DockerBuildPlan,
}

impl DockerDriver {
    pub fn new(options: BuildOptions) -> BuildResult<Self> {
        let plan = DockerBuildPlan::from_options(&options)?;
        Ok(Self { plan })
    }

    pub fn plan(&self) -> &DockerBuildPlan {
        &self.plan
    }

    fn print(&self, message: impl std::fmt::Display) {
        println!(
            "{} {}",
            format!("[{}]", self.plan.output_prefix).cyan(),
            message
        );
    }

    async fn build(&self, docker: &Docker, cancel: &CancellationToken) -> BuildResult<()> {
        let archive = self.plan.context.archive()?;
        let tag = self.plan.image.url();

        let build_args: HashMap<&str, &str> = self
            .plan
            .build_args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let labels: HashMap<&str, &str> = self
            .plan
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: ARCHIVE_DOCKERFILE,
            t: tag.as_str(),
            buildargs: build_args,
            labels,
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let body = Full::new(Bytes::from(archive));
        let mut stream = docker.build_image(options, None, Some(Either::Left(body)));

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(BuildError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = item else { break };

            let info = item?;
            if let Some(detail) = info.error_detail {
                return Err(BuildError::BuildFailed(
                    detail
                        .message
                        .unwrap_or_else(|| "Unknown build error".to_string()),
                ));
            }
            if let Some(error) = info.error {
                return Err(BuildError::BuildFailed(error));
            }
            if let Some(output) = info.stream {
                for line in output.lines().filter(|l| !l.trim().is_empty()) {
                    self.print(line);
                }
            }
            if let Some(status) = info.status {
                debug!(image = %tag, status = %status, "Build status");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Driver for DockerDriver {
    fn name(&self) -> &str {
        DOCKER_DRIVER
    }

    #[instrument(skip(self, cancel), fields(image = %self.plan.image))]
    async fn run(&self, cancel: CancellationToken) -> BuildResult<()> {
        let docker = Docker::connect_with_local_defaults()?;
        let client = RegistryClient::new(docker.clone(), &self.plan.output_prefix);

        if self.plan.pull_parent
            && let Some(parent) = &self.plan.parent
        {
            client
                .pull(parent, self.plan.pull_auth.as_ref(), &cancel)
                .await?;
        }

        info!("Building image");
        self.print(format!("{} {}", "build".yellow(), self.plan.image));
        self.build(&docker, &cancel).await?;

        for extra in &self.plan.extra_tags {
            client.tag(&self.plan.image, extra).await?;
        }

        if self.plan.push {
            for image in self.plan.all_images() {
                client
                    .push(image, self.plan.push_auth.as_ref(), &cancel)
                    .await?;
            }
        }

        if self.plan.remove_after {
            for image in self.plan.all_images() {
                if let Err(e) = client.remove(image).await {
                    warn!(image = %image, error = %e, "Failed to remove local image");
                }
            }
        }

        self.print(format!("{} {}", "✓".green(), self.plan.image));
        Ok(())
    }
}
