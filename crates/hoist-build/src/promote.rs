//! イメージのプロモート
//!
//! ビルド済みのイメージを別のレジストリ・名前空間・名前に付け替えて push する。

use crate::error::{BuildError, BuildResult};
use crate::image_url::ImageUrl;
use crate::options::Credentials;
use crate::registry::RegistryClient;
use crate::semver::SemVer;
use async_trait::async_trait;
use bollard::Docker;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromoteOptions {
    /// `registry/namespace/name:tag`
    pub source_image: String,
    pub target_registry_host: Option<String>,
    pub target_registry_namespace: Option<String>,
    pub target_name: Option<String>,
    pub target_tags: Vec<String>,
    pub remove_after_push: bool,
    pub pull_source: bool,
    pub dry_run: bool,
    pub enable_semver_tags: bool,
    pub semver_tags_templates: Vec<String>,
    pub pull_auth: Option<Credentials>,
    pub push_auth: Option<Credentials>,
}

/// プロモートの実行計画
#[derive(Debug, Clone, PartialEq)]
pub struct PromotePlan {
    pub source: ImageUrl,
    /// 先頭がメインのターゲット
    pub targets: Vec<ImageUrl>,
    pub pull_source: bool,
    pub remove_after_push: bool,
    pub pull_auth: Option<Credentials>,
    pub push_auth: Option<Credentials>,
}

impl PromotePlan {
    pub fn from_options(options: &PromoteOptions) -> BuildResult<Self> {
        if options.source_image.trim().is_empty() {
            return Err(BuildError::Promote(
                "Source image must be defined".to_string(),
            ));
        }

        let source = ImageUrl::parse(&options.source_image)?;
        let mut target = source.clone();
        if let Some(host) = &options.target_registry_host {
            target.registry_host = host.clone();
        }
        if let Some(namespace) = &options.target_registry_namespace {
            target.namespace = namespace.clone();
        }
        if let Some(name) = options.target_name.as_ref().filter(|n| !n.is_empty()) {
            target.name = name.clone();
        }

        let mut tags = options.target_tags.clone();
        if options.enable_semver_tags {
            match SemVer::parse(&source.tag).and_then(|v| v.version_tree(&options.semver_tags_templates)) {
                Ok(semver_tags) => tags.extend(semver_tags),
                Err(e) => warn!(tag = %source.tag, error = %e, "Semantic version tags skipped"),
            }
        }

        let mut targets = vec![target.clone()];
        for tag in tags {
            let extra = target.with_tag(tag);
            if !targets.contains(&extra) {
                targets.push(extra);
            }
        }

        Ok(Self {
            source,
            targets,
            pull_source: options.pull_source,
            remove_after_push: options.remove_after_push,
            pull_auth: options.pull_auth.clone(),
            push_auth: options.push_auth.clone(),
        })
    }
}

#[async_trait]
pub trait Promoter: Send + Sync {
    async fn promote(&self, plan: &PromotePlan, cancel: CancellationToken) -> BuildResult<()>;
}

/// Docker デーモン経由でプロモートする
pub struct DockerPromoter {
    docker: Docker,
}

impl DockerPromoter {
    pub fn new() -> BuildResult<Self> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
        })
    }
}

#[async_trait]
impl Promoter for DockerPromoter {
    #[instrument(skip(self, plan, cancel), fields(source = %plan.source))]
    async fn promote(&self, plan: &PromotePlan, cancel: CancellationToken) -> BuildResult<()> {
        let client = RegistryClient::new(self.docker.clone(), plan.source.url());

        if plan.pull_source {
            client
                .pull(&plan.source, plan.pull_auth.as_ref(), &cancel)
                .await?;
        }

        for target in &plan.targets {
            if cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            if target.url() != plan.source.url() {
                client.tag(&plan.source, target).await?;
            }
            client
                .push(target, plan.push_auth.as_ref(), &cancel)
                .await?;
        }

        if plan.remove_after_push {
            for target in plan.targets.iter().filter(|t| t.url() != plan.source.url()) {
                if let Err(e) = client.remove(target).await {
                    warn!(image = %target, error = %e, "Failed to remove promoted image");
                }
            }
        }

        info!(targets = plan.targets.len(), "Image promoted");
        Ok(())
    }
}

/// 計画を表示するだけのプロモーター
pub struct DryRunPromoter;

impl DryRunPromoter {
    pub fn describe(plan: &PromotePlan) -> Vec<String> {
        let mut lines = Vec::new();
        if plan.pull_source {
            lines.push(format!("pull {}", plan.source));
        }
        for target in &plan.targets {
            lines.push(format!("tag {} {}", plan.source, target));
            lines.push(format!("push {}", target));
        }
        if plan.remove_after_push {
            for target in &plan.targets {
                lines.push(format!("remove {}", target));
            }
        }
        lines
    }
}

#[async_trait]
impl Promoter for DryRunPromoter {
    async fn promote(&self, plan: &PromotePlan, cancel: CancellationToken) -> BuildResult<()> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        info!(source = %plan.source, "Dry run promote");
        let prefix = format!("[{}]", plan.source).cyan();
        for line in Self::describe(plan) {
            println!("{} {} {}", prefix, "dry-run".yellow(), line);
        }
        Ok(())
    }
}

/// オプションに従ってプロモートを実行
pub async fn promote(options: PromoteOptions, cancel: CancellationToken) -> BuildResult<()> {
    let plan = PromotePlan::from_options(&options)?;
    let promoter: Box<dyn Promoter> = if options.dry_run {
        Box::new(DryRunPromoter)
    } else {
        Box::new(DockerPromoter::new()?)
    };

    promoter
        .promote(&plan, cancel)
        .await
        .map_err(|e| match e {
            BuildError::Cancelled => BuildError::Cancelled,
            other => BuildError::Promote(format!("'{}': {}", plan.source, other)),
        })
}
