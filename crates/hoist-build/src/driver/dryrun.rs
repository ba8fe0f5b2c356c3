//! ドライラン用ドライバー
//!
//! 解決済みのビルドオプションを表示するだけで何もビルドしない。

use super::Driver;
use crate::error::{BuildError, BuildResult};
use crate::options::BuildOptions;
use async_trait::async_trait;
use colored::Colorize;
use tokio_util::sync::CancellationToken;

pub const DRYRUN_DRIVER: &str = hoist_core::DEFAULT_DRIVER;

pub struct DryRunDriver {
    options: BuildOptions,
}

impl DryRunDriver {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// 表示用のYAML
    pub fn render(&self) -> BuildResult<String> {
        serde_yaml::to_string(&self.options)
            .map_err(|e| BuildError::DriverFailed(format!("Failed to serialize options: {}", e)))
    }
}

#[async_trait]
impl Driver for DryRunDriver {
    fn name(&self) -> &str {
        DRYRUN_DRIVER
    }

    async fn run(&self, cancel: CancellationToken) -> BuildResult<()> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let url = self.options.image_url().url();
        tracing::info!(image = %url, "Dry run build");

        let rendered = self.render()?;
        let prefix = format!("[{}]", self.options.output_prefix);
        println!("{} {} {}", prefix.cyan(), "dry-run".yellow(), url.bold());
        for line in rendered.lines() {
            println!("{}   {}", prefix.cyan(), line);
        }

        Ok(())
    }
}
