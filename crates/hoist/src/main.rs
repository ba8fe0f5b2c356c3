mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::build::BuildArgs;
use commands::get::GetCommands;
use commands::promote::PromoteArgs;
use hoist_config::Config;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "hoist")]
#[command(about = "イメージの系譜を、まとめて組み上げる。", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は hoist.yaml を探索）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルド
    Build(BuildArgs),
    /// 定義済みのリソースを表示
    #[command(subcommand)]
    Get(GetCommands),
    /// イメージの依存関係をツリー表示
    Tree,
    /// ビルド済みイメージを別の名前・レジストリへ昇格
    Promote(PromoteArgs),
    /// バージョン情報を表示
    Version,
}

/// ログ出力を初期化する
///
/// `log_path_file` が設定されていればファイルへ、なければ標準エラーへ出力する。
fn init_tracing(config: &Config) {
    use tracing_subscriber::EnvFilter;

    if let Some(path) = &config.log_path_file {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path);

        match log_file {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_writer(file)
                    .with_env_filter(
                        EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
                    )
                    .with_ansi(false)
                    .init();
                return;
            }
            Err(e) => eprintln!(
                "{} ログファイルを開けません ({}): {}",
                "Warning:".yellow().bold(),
                path.display(),
                e
            ),
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// Ctrl-C でビルドを中断する
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "中断しています...".yellow());
            tracing::warn!("Interrupted, cancelling running builds");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Versionコマンドは設定ファイル不要
    let command = match cli.command {
        Commands::Version => {
            println!("hoist {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        command => command,
    };

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match command {
        Commands::Build(args) => commands::build::handle(&config, args, cancel).await,
        Commands::Get(command) => commands::get::handle(&config, command, cancel),
        Commands::Tree => commands::get::handle_tree(&config, cancel),
        Commands::Promote(args) => commands::promote::handle(&config, args, cancel).await,
        Commands::Version => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), format!("{:#}", e).red());
        std::process::exit(1);
    }
}
