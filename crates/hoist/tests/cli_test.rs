#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

const CONFIG: &str = r#"
concurrency: 2
push_images: false

builders:
  infrastructure:
    driver: docker
    options:
      context: .

images_tree:
  ubuntu:
    "18.04":
      builder: infrastructure
      children:
        php-fpm:
          - "7.2"
  php-fpm:
    "7.2":
      version: "7.2-ubuntu{{ .Parent.Version }}"
      builder: infrastructure
"#;

/// 一時ディレクトリに hoist.yaml を作成
fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("hoist.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

fn hoist() -> Command {
    let mut cmd = Command::cargo_bin("hoist").unwrap();
    cmd.env_remove("HOIST_CONFIG_PATH");
    cmd
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    hoist()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("tree"))
        .stdout(predicate::str::contains("promote"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    hoist()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("hoist"));
}

/// 無効なコマンドでエラーになることを確認
#[test]
fn test_invalid_command() {
    hoist().arg("invalid-command").assert().failure();
}

/// buildコマンドのヘルプに主要なオプションが含まれることを確認
#[test]
fn test_build_help() {
    hoist()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--cascade"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--concurrency"));
}

#[test]
fn test_get_images() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images"])
        .assert()
        .success()
        .stdout(predicate::str::contains("NAME"))
        .stdout(predicate::str::contains("ubuntu"))
        .stdout(predicate::str::contains("7.2-ubuntu18.04"))
        .stdout(predicate::str::contains("ubuntu:18.04"));
}

#[test]
fn test_get_images_filtered() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images", "php-fpm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("php-fpm"))
        .stdout(predicate::str::contains("\nubuntu").not());
}

#[test]
fn test_get_images_with_filter() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images", "--filter", "version=18.04"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ubuntu"))
        .stdout(predicate::str::contains("7.2-ubuntu18.04").not());

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images", "-f", "name=php-fpm", "-f", "namespace=stable"])
        .assert()
        .success()
        .stdout(predicate::str::contains("条件に一致するイメージはありません"));
}

#[test]
fn test_get_images_rejects_malformed_filter() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images", "--filter", "builder=docker"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("builder"));
}

/// 新しい `images` キーでも読み込める
#[test]
fn test_get_images_with_images_key() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(
        temp_dir.path(),
        &CONFIG.replace("images_tree:", "images:"),
    );

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images"])
        .assert()
        .success()
        .stdout(predicate::str::contains("7.2-ubuntu18.04"));
}

#[test]
fn test_get_images_unknown() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images", "nginx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_get_builders() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "builders"])
        .assert()
        .success()
        .stdout(predicate::str::contains("infrastructure"))
        .stdout(predicate::str::contains("docker"))
        .stdout(predicate::str::contains("context=."));
}

/// 環境変数で設定ファイルを指定してツリーを表示
#[test]
fn test_tree_with_env_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .env("HOIST_CONFIG_PATH", &config)
        .current_dir(temp_dir.path())
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("├─── ubuntu:18.04"))
        .stdout(predicate::str::contains("│  ├─── php-fpm:7.2-ubuntu18.04"));
}

#[test]
fn test_build_dry_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["build", "ubuntu", "--dry-run", "--cascade", "--var", "FOO=bar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dry-run"))
        .stdout(predicate::str::contains("ubuntu:18.04"))
        .stdout(predicate::str::contains("php-fpm:7.2-ubuntu18.04"))
        .stdout(predicate::str::contains("FOO: bar"));
}

#[test]
fn test_build_unknown_image_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["build", "nginx", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nginx"));
}

#[test]
fn test_build_rejects_zero_concurrency() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["build", "ubuntu", "--dry-run", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--concurrency"));
}

#[test]
fn test_cycle_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(
        temp_dir.path(),
        r#"
images_tree:
  a:
    "1":
      children:
        b: ["1"]
  b:
    "1":
      children:
        a: ["1"]
"#,
    );

    hoist()
        .arg("--config")
        .arg(&config)
        .args(["get", "images"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("循環依存"));
}

#[test]
fn test_promote_dry_run() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = write_config(temp_dir.path(), CONFIG);

    hoist()
        .arg("--config")
        .arg(&config)
        .args([
            "promote",
            "staging/app:1.2.3",
            "--dry-run",
            "--namespace",
            "stable",
            "--tag",
            "latest",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("push stable/app:1.2.3"))
        .stdout(predicate::str::contains("push stable/app:latest"));
}
