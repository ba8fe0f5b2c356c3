//! ビルドドライバー
//!
//! ドライバーは解決済みの [`BuildOptions`] を受け取り、実際のビルドを行う。
//! ドライバー名からファクトリを引く [`DriverRegistry`] はエンジンごとに構築する。

pub mod ansible;
pub mod docker;
pub mod dryrun;

use crate::error::{BuildError, BuildResult};
use crate::options::BuildOptions;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use ansible::{ANSIBLE_DRIVER, AnsibleDriver, AnsiblePlan};
pub use docker::{DOCKER_DRIVER, DockerBuildPlan, DockerDriver};
pub use dryrun::{DRYRUN_DRIVER, DryRunDriver};

/// ビルドを実行するドライバー
#[async_trait]
pub trait Driver: Send + Sync {
    /// ドライバー名
    fn name(&self) -> &str;

    /// ビルドを実行（キャンセルされたら中断する）
    async fn run(&self, cancel: CancellationToken) -> BuildResult<()>;
}

/// 解決済みオプションからドライバーを作るファクトリ
pub type DriverFactory = Arc<dyn Fn(BuildOptions) -> BuildResult<Box<dyn Driver>> + Send + Sync>;

/// ドライバー名 → ファクトリ
#[derive(Clone, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みドライバー（default, docker, ansible-playbook）を登録したレジストリ
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(
            DRYRUN_DRIVER.to_string(),
            factory(|options| Ok(Box::new(DryRunDriver::new(options)) as Box<dyn Driver>)),
        );
        registry.factories.insert(
            DOCKER_DRIVER.to_string(),
            factory(|options| Ok(Box::new(DockerDriver::new(options)?) as Box<dyn Driver>)),
        );
        registry.factories.insert(
            ANSIBLE_DRIVER.to_string(),
            factory(|options| Ok(Box::new(AnsibleDriver::new(options)?) as Box<dyn Driver>)),
        );
        registry
    }

    /// ファクトリを登録
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> BuildResult<()>
    where
        F: Fn(BuildOptions) -> BuildResult<Box<dyn Driver>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(BuildError::DriverAlreadyRegistered(name));
        }
        self.factories.insert(name, self::factory(factory));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DriverFactory> {
        self.factories.get(name)
    }

    /// 登録済みのドライバー名
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

fn factory<F>(f: F) -> DriverFactory
where
    F: Fn(BuildOptions) -> BuildResult<Box<dyn Driver>> + Send + Sync + 'static,
{
    Arc::new(f)
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopDriver;

    #[async_trait]
    impl Driver for NoopDriver {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(&self, _cancel: CancellationToken) -> BuildResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_with_defaults() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![ANSIBLE_DRIVER, DRYRUN_DRIVER, DOCKER_DRIVER]
        );
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = DriverRegistry::new();
        registry
            .register("noop", |_| Ok(Box::new(NoopDriver) as Box<dyn Driver>))
            .unwrap();

        let result = registry.register("noop", |_| Ok(Box::new(NoopDriver) as Box<dyn Driver>));
        assert!(matches!(result, Err(BuildError::DriverAlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn test_factory_creates_driver() {
        let registry = DriverRegistry::with_defaults();
        let factory = registry.get(DRYRUN_DRIVER).unwrap();

        let driver = factory(BuildOptions::default()).unwrap();
        assert_eq!(driver.name(), DRYRUN_DRIVER);
        assert!(driver.run(CancellationToken::new()).await.is_ok());
    }

    #[test]
    fn test_docker_factory_validates_options() {
        let registry = DriverRegistry::with_defaults();
        let factory = registry.get(DOCKER_DRIVER).unwrap();

        // context が無いとドライバーを作成できない
        assert!(factory(BuildOptions::default()).is_err());
    }
}
