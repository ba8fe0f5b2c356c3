use clap::Args;
use colored::Colorize;
use hoist_build::{Credentials, PromoteOptions};
use hoist_config::Config;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// プロモートするイメージ (registry/namespace/name:tag)
    pub image: String,
    /// 実際には実行せず、手順を表示する
    #[arg(long)]
    pub dry_run: bool,
    /// プロモート先のレジストリ
    #[arg(long)]
    pub registry: Option<String>,
    /// プロモート先の名前空間
    #[arg(long)]
    pub namespace: Option<String>,
    /// プロモート先のイメージ名
    #[arg(long)]
    pub name: Option<String>,
    /// 追加のタグ
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
    /// push 後にローカルイメージを削除する
    #[arg(long)]
    pub remove_local: bool,
    /// 元のイメージを先に pull する
    #[arg(long)]
    pub pull: bool,
    /// セマンティックバージョンのタグを追加する
    #[arg(long)]
    pub enable_semver_tags: bool,
    /// セマンティックバージョンタグのテンプレート
    #[arg(long = "semver-tags-template")]
    pub semver_tags_templates: Vec<String>,
    /// push 用のユーザー名
    #[arg(long, env = "HOIST_PUSH_USERNAME")]
    pub push_username: Option<String>,
    /// push 用のパスワード
    #[arg(long, env = "HOIST_PUSH_PASSWORD", hide_env_values = true)]
    pub push_password: Option<String>,
    /// pull 用のユーザー名
    #[arg(long, env = "HOIST_PULL_USERNAME")]
    pub pull_username: Option<String>,
    /// pull 用のパスワード
    #[arg(long, env = "HOIST_PULL_PASSWORD", hide_env_values = true)]
    pub pull_password: Option<String>,
}

impl PromoteArgs {
    pub fn to_options(&self, config: &Config) -> PromoteOptions {
        let semver_tags_templates = if self.semver_tags_templates.is_empty() {
            config.semantic_version_tags_templates.clone()
        } else {
            self.semver_tags_templates.clone()
        };

        PromoteOptions {
            source_image: self.image.clone(),
            target_registry_host: self.registry.clone(),
            target_registry_namespace: self.namespace.clone(),
            target_name: self.name.clone(),
            target_tags: self.tags.clone(),
            remove_after_push: self.remove_local,
            pull_source: self.pull,
            dry_run: self.dry_run,
            enable_semver_tags: self.enable_semver_tags || config.semantic_version_tags_enabled,
            semver_tags_templates,
            pull_auth: Credentials::from_pair(self.pull_username.clone(), self.pull_password.clone()),
            push_auth: Credentials::from_pair(self.push_username.clone(), self.push_password.clone()),
        }
    }
}

pub async fn handle(
    config: &Config,
    args: PromoteArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    println!("{} {}", "プロモート:".blue(), args.image.cyan());
    hoist_build::promote(args.to_options(config), cancel).await?;
    println!("{}", "✓ プロモートが完了しました".green());
    Ok(())
}
