//! テンプレート展開機能
//!
//! Teraを使用してイメージ定義の文字列フィールドを展開します。
//! `{{ .Parent.Version }}` のような Go 形式の参照も受け付け、
//! 先頭のドットを取り除いてから Tera で評価します。
//! 展開の対象は `{{ ... }}` だけで、`{%` や `{#` は文字列として残します。

use crate::error::{CoreError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tera::{Context, Tera};

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサを作成
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 文字列をテンプレートとして展開
    ///
    /// テンプレート構文を含まない文字列はそのまま返す。
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        if !is_template(template) {
            return Ok(template.to_string());
        }

        let normalized = escape_literals(&normalize_go_syntax(template)?)?;
        self.tera
            .render_str(&normalized, &self.context)
            .map_err(|e| CoreError::Template(extract_tera_error_detail(&e)))
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// テンプレート構文を含むか
pub fn is_template(value: &str) -> bool {
    value.contains("{{")
}

fn expression_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"(?s)\{\{.*?\}\}")
        .map_err(|e| CoreError::Template(format!("正規表現のコンパイルエラー: {}", e)))?;
    Ok(PATTERN.get_or_init(|| pattern))
}

/// `{{ ... }}` 以外の部分にある `{%` `{#` を raw ブロックで囲む
fn escape_literals(template: &str) -> Result<String> {
    let pattern = expression_pattern()?;
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for expression in pattern.find_iter(template) {
        push_literal(&mut out, &template[last..expression.start()]);
        out.push_str(expression.as_str());
        last = expression.end();
    }
    push_literal(&mut out, &template[last..]);
    Ok(out)
}

fn push_literal(out: &mut String, literal: &str) {
    if literal.contains("{%") || literal.contains("{#") {
        out.push_str("{% raw %}");
        out.push_str(literal);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(literal);
    }
}

fn go_reference_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"\{\{(-?)\s*\.")
        .map_err(|e| CoreError::Template(format!("正規表現のコンパイルエラー: {}", e)))?;
    Ok(PATTERN.get_or_init(|| pattern))
}

/// `{{ .Name }}` → `{{ Name }}`
fn normalize_go_syntax(template: &str) -> Result<String> {
    let pattern = go_reference_pattern()?;
    Ok(pattern.replace_all(template, "{{$1 ").into_owned())
}

/// Teraエラーから詳細情報を抽出
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }

    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!("未定義の変数: `{}`", var_name);
    }

    full_error
}
