//! レジストリ認証
//!
//! 明示的に渡された認証情報を優先し、無ければ Docker の config.json
//! （`auths` と credential helper）から探す。

use crate::error::{BuildError, BuildResult};
use crate::image_url::ImageUrl;
use crate::options::Credentials;
use base64::Engine;
use bollard::auth::DockerCredentials;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Docker Hub のレジストリ名
pub const DOCKER_HUB: &str = "docker.io";

/// config.json 上の Docker Hub のキー
const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    creds_store: Option<String>,
    #[serde(default)]
    cred_helpers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

#[derive(Debug, Clone)]
pub struct RegistryAuth {
    config_path: PathBuf,
}

impl Default for RegistryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuth {
    /// `$DOCKER_CONFIG/config.json` または `~/.docker/config.json` を使用
    pub fn new() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::with_config_path(dir.join("config.json"))
    }

    pub fn with_config_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// イメージ参照に対する認証情報を決定
    ///
    /// `explicit` があればそれを使い、無ければ config.json を参照する。
    pub fn resolve(
        &self,
        image: &ImageUrl,
        explicit: Option<&Credentials>,
    ) -> BuildResult<Option<DockerCredentials>> {
        let registry = registry_of(image);
        if let Some(credentials) = explicit {
            return Ok(Some(credentials.to_docker_credentials(&registry)));
        }
        self.lookup(&registry)
    }

    /// config.json からレジストリの認証情報を探す
    pub fn lookup(&self, registry: &str) -> BuildResult<Option<DockerCredentials>> {
        if !self.config_path.exists() {
            debug!(path = %self.config_path.display(), "Docker config not found");
            return Ok(None);
        }

        let config = self.load()?;
        let keys: Vec<&str> = if registry == DOCKER_HUB {
            vec![DOCKER_HUB, DOCKER_HUB_INDEX]
        } else {
            vec![registry]
        };

        for key in &keys {
            if let Some(entry) = config.auths.get(*key)
                && let Some(encoded) = &entry.auth
                && let Some(credentials) = decode_auth(encoded, registry)?
            {
                debug!(registry, "Using credentials from config.json");
                return Ok(Some(credentials));
            }
        }

        let helper = config
            .cred_helpers
            .get(registry)
            .or(config.creds_store.as_ref());
        if let Some(helper) = helper {
            for key in &keys {
                match run_helper(helper, key) {
                    Ok(Some(credentials)) => return Ok(Some(credentials)),
                    Ok(None) => {}
                    Err(e) => debug!(registry, error = %e, "Credential helper failed"),
                }
            }
        }

        debug!(registry, "No credentials found");
        Ok(None)
    }

    fn load(&self) -> BuildResult<DockerConfigFile> {
        let failed = |message: String| BuildError::AuthFailed {
            registry: self.config_path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| failed(format!("Failed to read config.json: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| failed(format!("Failed to parse config.json: {}", e)))
    }
}

/// イメージ参照のレジストリ（未指定なら Docker Hub）
pub fn registry_of(image: &ImageUrl) -> String {
    if image.registry_host.is_empty() {
        DOCKER_HUB.to_string()
    } else {
        image.registry_host.clone()
    }
}

fn decode_auth(encoded: &str, registry: &str) -> BuildResult<Option<DockerCredentials>> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| BuildError::AuthFailed {
            registry: registry.to_string(),
            message: format!("Failed to decode auth: {}", e),
        })?;
    let decoded = String::from_utf8_lossy(&decoded);

    Ok(decoded
        .split_once(':')
        .map(|(username, password)| Credentials::new(username, password))
        .map(|credentials| credentials.to_docker_credentials(registry)))
}

fn run_helper(helper: &str, server: &str) -> BuildResult<Option<DockerCredentials>> {
    let program = format!("docker-credential-{}", helper);
    let failed = |message: String| BuildError::AuthFailed {
        registry: server.to_string(),
        message,
    };

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| failed(format!("Failed to run {}: {}", program, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(server.as_bytes())
            .map_err(|e| failed(format!("Failed to write to {}: {}", program, e)))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| failed(format!("{} failed: {}", program, e)))?;
    if !output.status.success() {
        return Ok(None);
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)
        .map_err(|e| failed(format!("Invalid response from {}: {}", program, e)))?;
    Ok(Some(
        Credentials::new(response.username, response.secret).to_docker_credentials(server),
    ))
}
