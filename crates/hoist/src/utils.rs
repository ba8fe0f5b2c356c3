use anyhow::Context;
use colored::Colorize;
use hoist_build::{Dispatcher, DriverRegistry, Engine};
use hoist_config::Config;
use hoist_core::{ImagesGraph, Variables};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 設定からイメージツリーとビルダーを読み込み、エンジンを組み立てる
pub fn load_engine(
    config: &Config,
    concurrency: usize,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<Engine>> {
    let tree = hoist_config::load_images_tree(&config.images_path).with_context(|| {
        format!(
            "イメージツリーを読み込めません: {}",
            config.images_path.display()
        )
    })?;
    let builders = hoist_config::load_builders(&config.builders_path).with_context(|| {
        format!(
            "ビルダー定義を読み込めません: {}",
            config.builders_path.display()
        )
    })?;
    let graph = ImagesGraph::compile(&tree)?;
    let dispatcher = Dispatcher::new(concurrency, cancel.clone())?;

    Ok(Arc::new(Engine::new(
        Arc::new(graph),
        Arc::new(builders),
        Arc::new(DriverRegistry::with_defaults()),
        dispatcher,
        cancel,
    )))
}

/// `key=value` 形式の引数を分解する
pub fn parse_key_value(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("'{}' は key=value 形式ではありません", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("'{}' のキーが空です", raw);
    }
    Ok((key.to_string(), value.to_string()))
}

/// `key=value` の一覧を文字列変数に変換する
pub fn parse_variables(pairs: &[String]) -> anyhow::Result<Variables> {
    let mut vars = Variables::new();
    for pair in pairs {
        let (key, value) = parse_key_value(pair)?;
        vars.insert(key, serde_json::Value::String(value));
    }
    Ok(vars)
}

/// `key=value` の一覧をラベルに変換する
pub fn parse_labels(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    pairs.iter().map(|pair| parse_key_value(pair)).collect()
}

/// 列幅を揃えて表を出力する
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows, true));
}

fn render_table(headers: &[&str], rows: &[Vec<String>], colored: bool) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(i) {
                Some(width) => *width = (*width).max(len),
                None => widths.push(len),
            }
        }
    }

    let format_row = |cells: Vec<String>| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let header = format_row(headers.iter().map(|h| h.to_string()).collect());
    let mut out = if colored {
        format!("{}\n", header.bold())
    } else {
        format!("{}\n", header)
    };
    for row in rows {
        out.push_str(&format_row(row.clone()));
        out.push('\n');
    }
    out
}
