//! ansible-playbook ドライバー
//!
//! ビルダーの `playbook` と `inventory` を使って `ansible-playbook` を実行する。
//! イメージ情報は変数マッピングに従って `--extra-vars` の JSON で渡す。

use super::Driver;
use crate::error::{BuildError, BuildResult};
use crate::options::BuildOptions;
use async_trait::async_trait;
use colored::Colorize;
use hoist_core::model::varmap::{
    IMAGE_BUILDER_LABEL_KEY, IMAGE_EXTRA_TAGS_KEY, IMAGE_FROM_NAME_KEY,
    IMAGE_FROM_REGISTRY_HOST_KEY, IMAGE_FROM_REGISTRY_NAMESPACE_KEY, IMAGE_FROM_TAG_KEY,
    IMAGE_NAME_KEY, IMAGE_REGISTRY_HOST_KEY, IMAGE_REGISTRY_NAMESPACE_KEY, IMAGE_TAG_KEY,
    PUSH_IMAGE_KEY,
};
use serde_json::{Map, Value};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub const ANSIBLE_DRIVER: &str = "ansible-playbook";

const ANSIBLE_PROGRAM: &str = "ansible-playbook";

/// ansible-playbook の実行計画
#[derive(Debug, Clone, PartialEq)]
pub struct AnsiblePlan {
    pub playbook: String,
    pub inventory: String,
    pub connection_local: bool,
    /// 先に追加したものが優先される
    pub extra_vars: Map<String, Value>,
    pub output_prefix: String,
}

impl AnsiblePlan {
    pub fn from_options(options: &BuildOptions) -> BuildResult<Self> {
        let required = |key: &str| {
            options
                .builder_option_str(key)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    BuildError::InvalidConfig(format!(
                        "Builder '{}' requires the '{}' option",
                        options.builder_name, key
                    ))
                })
        };
        let playbook = required("playbook")?;
        let inventory = required("inventory")?;

        if options.image_name.is_empty() {
            return Err(BuildError::InvalidConfig(
                "ansible-playbook driver requires an image name".to_string(),
            ));
        }

        let mut extra_vars = Map::new();
        let mut add = |key: &str, value: Value| {
            if let Some(name) = options.mapped_key(key).filter(|name| !name.is_empty()) {
                extra_vars.entry(name.to_string()).or_insert(value);
            }
        };

        add(IMAGE_NAME_KEY, Value::from(options.image_name.as_str()));
        if !options.image_version.is_empty() {
            add(IMAGE_TAG_KEY, Value::from(options.image_version.as_str()));
        }
        if !options.registry_namespace.is_empty() {
            add(
                IMAGE_REGISTRY_NAMESPACE_KEY,
                Value::from(options.registry_namespace.as_str()),
            );
        }
        if !options.registry_host.is_empty() {
            add(
                IMAGE_REGISTRY_HOST_KEY,
                Value::from(options.registry_host.as_str()),
            );
        }
        if !options.builder_name.is_empty() {
            add(
                IMAGE_BUILDER_LABEL_KEY,
                Value::from(options.builder_name.as_str()),
            );
        }
        if !options.tags.is_empty() {
            add(IMAGE_EXTRA_TAGS_KEY, Value::from(options.tags.clone()));
        }

        let from = [
            (IMAGE_FROM_NAME_KEY, &options.image_from_name),
            (IMAGE_FROM_TAG_KEY, &options.image_from_version),
            (
                IMAGE_FROM_REGISTRY_NAMESPACE_KEY,
                &options.image_from_registry_namespace,
            ),
            (IMAGE_FROM_REGISTRY_HOST_KEY, &options.image_from_registry_host),
        ];
        for (key, value) in from {
            if !value.is_empty() {
                add(key, Value::from(value.as_str()));
            }
        }

        if !options.push_images || options.dry_run {
            add(PUSH_IMAGE_KEY, Value::Bool(false));
        }

        for (name, value) in options.persistent_vars.iter().chain(options.vars.iter()) {
            extra_vars
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        let output_prefix = if options.output_prefix.is_empty() {
            hoist_core::node_key(&options.image_name, &options.image_version)
        } else {
            options.output_prefix.clone()
        };

        Ok(Self {
            playbook,
            inventory,
            connection_local: options.connection_local,
            extra_vars,
            output_prefix,
        })
    }

    /// コマンドライン引数
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["--inventory".to_string(), self.inventory.clone()];
        if self.connection_local {
            args.push("--connection".to_string());
            args.push("local".to_string());
        }
        if !self.extra_vars.is_empty() {
            args.push("--extra-vars".to_string());
            args.push(Value::Object(self.extra_vars.clone()).to_string());
        }
        args.push(self.playbook.clone());
        args
    }
}

pub struct AnsibleDriver {
    plan: AnsiblePlan,
}

impl AnsibleDriver {
    pub fn new(options: BuildOptions) -> BuildResult<Self> {
        let plan = AnsiblePlan::from_options(&options)?;
        Ok(Self { plan })
    }

    pub fn plan(&self) -> &AnsiblePlan {
        &self.plan
    }
}

#[async_trait]
impl Driver for AnsibleDriver {
    fn name(&self) -> &str {
        ANSIBLE_DRIVER
    }

    #[instrument(skip(self, cancel), fields(playbook = %self.plan.playbook))]
    async fn run(&self, cancel: CancellationToken) -> BuildResult<()> {
        let args = self.plan.args();
        info!(prefix = %self.plan.output_prefix, "Running ansible-playbook");
        debug!(?args, "ansible-playbook arguments");

        let mut child = Command::new(ANSIBLE_PROGRAM)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BuildError::DriverFailed(format!("Failed to start {}: {}", ANSIBLE_PROGRAM, e))
            })?;

        let prefix = format!("[{}]", self.plan.output_prefix).cyan().to_string();
        let stdout = child.stdout.take();
        let printer = async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    println!("{} {}", prefix, line);
                }
            }
        };

        let finished = tokio::select! {
            _ = cancel.cancelled() => None,
            (status, _) = async { tokio::join!(child.wait(), printer) } => Some(status),
        };
        let Some(status) = finished else {
            child.kill().await.ok();
            return Err(BuildError::Cancelled);
        };
        let status = status?;

        if !status.success() {
            return Err(BuildError::DriverFailed(format!(
                "{} exited with {}",
                ANSIBLE_PROGRAM, status
            )));
        }
        Ok(())
    }
}
