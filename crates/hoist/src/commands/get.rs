use crate::utils;
use clap::Subcommand;
use colored::Colorize;
use hoist_config::Config;
use hoist_core::ImageFilter;
use tokio_util::sync::CancellationToken;

pub const IMAGE_HEADERS: [&str; 6] = ["NAME", "VERSION", "BUILDER", "NAMESPACE", "REGISTRY", "PARENT"];
pub const BUILDER_HEADERS: [&str; 3] = ["NAME", "DRIVER", "OPTIONS"];

#[derive(Subcommand, Debug)]
pub enum GetCommands {
    /// イメージの一覧を表示
    Images {
        /// 絞り込むイメージ名
        image: Option<String>,
        /// 絞り込むバージョン（複数指定可）
        #[arg(short = 'v', long = "image-version")]
        versions: Vec<String>,
        /// 絞り込み条件 `<attribute>=<value>`（name, version, registry, namespace。複数指定可）
        #[arg(short = 'f', long = "filter", value_name = "ATTRIBUTE=VALUE")]
        filters: Vec<ImageFilter>,
        /// 依存関係をツリー形式で表示
        #[arg(long)]
        tree: bool,
    },
    /// ビルダーの一覧を表示
    Builders,
}

pub fn handle(config: &Config, command: GetCommands, cancel: CancellationToken) -> anyhow::Result<()> {
    match command {
        GetCommands::Images {
            image,
            versions,
            filters,
            tree,
        } => {
            if tree {
                return handle_tree(config, cancel);
            }
            let engine = utils::load_engine(config, config.concurrency, cancel)?;
            let rows = match image {
                Some(name) => engine.find_images(&name, &versions, &filters)?,
                None => engine.list_images(&filters)?,
            };
            if rows.is_empty() {
                let message = if filters.is_empty() {
                    "イメージが定義されていません"
                } else {
                    "条件に一致するイメージはありません"
                };
                println!("{}", message.dimmed());
                return Ok(());
            }
            utils::print_table(&IMAGE_HEADERS, &rows);
        }
        GetCommands::Builders => {
            let builders = hoist_config::load_builders(&config.builders_path)?;
            let rows = builders.list();
            if rows.is_empty() {
                println!("{}", "ビルダーが定義されていません".dimmed());
                return Ok(());
            }
            utils::print_table(&BUILDER_HEADERS, &rows);
        }
    }
    Ok(())
}

/// 依存関係ツリーを表示
pub fn handle_tree(config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let engine = utils::load_engine(config, config.concurrency, cancel)?;
    print!("{}", engine.draw_graph()?);
    Ok(())
}
