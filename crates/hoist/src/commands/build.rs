use crate::utils;
use clap::Args;
use colored::Colorize;
use hoist_build::{BuildOptions, Credentials, UNLIMITED_DEPTH};
use hoist_config::Config;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// ビルドするイメージ名
    pub image: String,
    /// ビルドするバージョン（複数指定可、省略時は全バージョン）
    #[arg(short = 'v', long = "image-version")]
    pub versions: Vec<String>,
    /// 子イメージも続けてビルドする
    #[arg(long)]
    pub cascade: bool,
    /// 子イメージをたどる深さ（-1 で無制限）
    #[arg(long, allow_negative_numbers = true)]
    pub cascade_depth: Option<i32>,
    /// 実際にはビルドせず、解決したオプションを表示する
    #[arg(long)]
    pub dry_run: bool,
    /// 名前空間を上書き
    #[arg(long)]
    pub namespace: Option<String>,
    /// レジストリを上書き
    #[arg(long)]
    pub registry: Option<String>,
    /// 生成するイメージ名を上書き
    #[arg(long)]
    pub image_name: Option<String>,
    /// 親イメージ名
    #[arg(long)]
    pub image_from: Option<String>,
    /// 親イメージのバージョン
    #[arg(long)]
    pub image_from_version: Option<String>,
    /// 親イメージの名前空間
    #[arg(long)]
    pub image_from_namespace: Option<String>,
    /// 親イメージのレジストリ
    #[arg(long)]
    pub image_from_registry: Option<String>,
    /// 追加のタグ
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
    /// ビルド変数 (key=value)
    #[arg(long = "var")]
    pub vars: Vec<String>,
    /// 子イメージにも引き継ぐ変数 (key=value)
    #[arg(long = "persistent-var")]
    pub persistent_vars: Vec<String>,
    /// イメージラベル (key=value)
    #[arg(long = "label")]
    pub labels: Vec<String>,
    /// 同時に実行するビルド数
    #[arg(long, allow_negative_numbers = true)]
    pub concurrency: Option<i64>,
    /// ビルド後にイメージを push する
    #[arg(long, conflicts_with = "no_push")]
    pub push: bool,
    /// イメージを push しない
    #[arg(long)]
    pub no_push: bool,
    /// ビルド前に親イメージを pull する
    #[arg(long)]
    pub pull_parent_image: bool,
    /// ビルド後にローカルイメージを削除する
    #[arg(long)]
    pub remove_local_images: bool,
    /// セマンティックバージョンのタグを追加する
    #[arg(long)]
    pub enable_semver_tags: bool,
    /// セマンティックバージョンタグのテンプレート
    #[arg(long = "semver-tags-template")]
    pub semver_tags_templates: Vec<String>,
    /// ansible-playbook をローカル接続で実行する
    #[arg(long)]
    pub connection_local: bool,
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

impl BuildArgs {
    /// 同時ビルド数（未指定時は設定値）
    pub fn concurrency(&self, config: &Config) -> anyhow::Result<usize> {
        match self.concurrency {
            None => Ok(config.concurrency),
            Some(n) if n > 0 => Ok(usize::try_from(n)?),
            Some(n) => anyhow::bail!("--concurrency は 1 以上を指定してください (指定値: {})", n),
        }
    }

    /// カスケードの深さ
    pub fn depth(&self) -> i32 {
        self.cascade_depth.unwrap_or(UNLIMITED_DEPTH)
    }

    /// 引数と設定からビルドオプションを作る
    pub fn to_options(&self, config: &Config) -> anyhow::Result<BuildOptions> {
        let push_images = if self.push {
            true
        } else if self.no_push {
            false
        } else {
            config.push_images
        };

        let semver_tags_templates = if self.semver_tags_templates.is_empty() {
            config.semantic_version_tags_templates.clone()
        } else {
            self.semver_tags_templates.clone()
        };

        Ok(BuildOptions {
            image_name: self.image_name.clone().unwrap_or_default(),
            registry_host: self.registry.clone().unwrap_or_default(),
            registry_namespace: self.namespace.clone().unwrap_or_default(),
            tags: self.tags.clone(),
            labels: utils::parse_labels(&self.labels)?,
            vars: utils::parse_variables(&self.vars)?,
            persistent_vars: utils::parse_variables(&self.persistent_vars)?,
            image_from_name: self.image_from.clone().unwrap_or_default(),
            image_from_version: self.image_from_version.clone().unwrap_or_default(),
            image_from_registry_host: self.image_from_registry.clone().unwrap_or_default(),
            image_from_registry_namespace: self.image_from_namespace.clone().unwrap_or_default(),
            cascade: self.cascade || self.cascade_depth.is_some(),
            dry_run: self.dry_run,
            connection_local: self.connection_local,
            push_images,
            pull_parent_image: self.pull_parent_image,
            remove_image_after_build: self.remove_local_images,
            enable_semver_tags: self.enable_semver_tags || config.semantic_version_tags_enabled,
            semver_tags_templates,
            pull_auth: Credentials::from_pair(self.pull_username.clone(), self.pull_password.clone()),
            push_auth: Credentials::from_pair(self.push_username.clone(), self.push_password.clone()),
            ..Default::default()
        })
    }
}

pub async fn handle(
    config: &Config,
    args: BuildArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let concurrency = args.concurrency(config)?;
    let options = args.to_options(config)?;
    let engine = utils::load_engine(config, concurrency, cancel)?;

    let versions = if args.versions.is_empty() {
        "all".to_string()
    } else {
        args.versions.join(", ")
    };
    println!(
        "{} {} ({})",
        "ビルド開始:".blue(),
        args.image.cyan(),
        versions
    );

    engine
        .build(&args.image, &args.versions, options, args.depth())
        .await?;

    println!("{}", "✓ ビルドが完了しました".green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: BuildArgs,
    }

    fn parse(args: &[&str]) -> BuildArgs {
        let mut argv = vec!["hoist"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_options_from_args() {
        let args = parse(&[
            "app",
            "-v",
            "1.0",
            "--namespace",
            "team",
            "--tag",
            "latest",
            "--var",
            "A=1",
            "--persistent-var",
            "P=x",
            "--label",
            "maintainer=ops",
            "--image-from",
            "base",
            "--image-from-version",
            "3",
        ]);
        let options = args.to_options(&Config::default()).unwrap();

        assert_eq!(args.versions, vec!["1.0"]);
        assert_eq!(options.registry_namespace, "team");
        assert_eq!(options.tags, vec!["latest"]);
        assert_eq!(options.vars.get("A"), Some(&serde_json::json!("1")));
        assert_eq!(options.persistent_vars.get("P"), Some(&serde_json::json!("x")));
        assert_eq!(options.labels.get("maintainer"), Some(&"ops".to_string()));
        assert_eq!(options.image_from_name, "base");
        assert_eq!(options.image_from_version, "3");
        assert!(!options.cascade);
        assert_eq!(args.depth(), UNLIMITED_DEPTH);
    }

    #[test]
    fn test_cascade_depth_enables_cascade() {
        let args = parse(&["app", "--cascade-depth", "1"]);
        let options = args.to_options(&Config::default()).unwrap();
        assert!(options.cascade);
        assert_eq!(args.depth(), 1);
    }

    #[test]
    fn test_push_flags_override_config() {
        let mut config = Config::default();
        config.push_images = true;

        let options = parse(&["app", "--no-push"]).to_options(&config).unwrap();
        assert!(!options.push_images);

        config.push_images = false;
        let options = parse(&["app", "--push"]).to_options(&config).unwrap();
        assert!(options.push_images);

        let options = parse(&["app"]).to_options(&config).unwrap();
        assert!(!options.push_images);
    }

    #[test]
    fn test_semver_settings_from_config() {
        let mut config = Config::default();
        config.semantic_version_tags_enabled = true;
        config.semantic_version_tags_templates = vec!["{{ .Major }}".to_string()];

        let options = parse(&["app"]).to_options(&config).unwrap();
        assert!(options.enable_semver_tags);
        assert_eq!(options.semver_tags_templates, vec!["{{ .Major }}"]);

        let options = parse(&["app", "--semver-tags-template", "{{ .Minor }}"])
            .to_options(&config)
            .unwrap();
        assert_eq!(options.semver_tags_templates, vec!["{{ .Minor }}"]);
    }

    #[test]
    fn test_concurrency_validation() {
        let config = Config::default();
        assert_eq!(
            parse(&["app", "--concurrency", "3"]).concurrency(&config).unwrap(),
            3
        );
        assert_eq!(
            parse(&["app"]).concurrency(&config).unwrap(),
            config.concurrency
        );
        assert!(parse(&["app", "--concurrency", "0"]).concurrency(&config).is_err());
        assert!(parse(&["app", "--concurrency", "-2"]).concurrency(&config).is_err());
    }

    #[test]
    fn test_credentials_require_both_parts() {
        let args = parse(&["app", "--push-username", "ci", "--push-password", "secret"]);
        let options = args.to_options(&Config::default()).unwrap();
        assert_eq!(options.push_auth, Some(Credentials::new("ci", "secret")));
        assert_eq!(options.pull_auth, None);
    }

    #[test]
    fn test_invalid_var_is_rejected() {
        let args = parse(&["app", "--var", "broken"]);
        assert!(args.to_options(&Config::default()).is_err());
    }
}
