//! Hoist build
//!
//! イメージグラフに従ってビルドを並行実行するオーケストレーターと、
//! Docker / ansible-playbook / ドライラン用のドライバー、
//! ワーカープール、レジストリ操作、イメージのプロモートを提供します。

pub mod auth;
pub mod context;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod error;
pub mod image_url;
pub mod options;
pub mod promote;
pub mod registry;
pub mod semver;

pub use auth::RegistryAuth;
pub use context::BuildContext;
pub use dispatch::{Dispatcher, Job};
pub use driver::{Driver, DriverFactory, DriverRegistry};
pub use engine::{Engine, UNLIMITED_DEPTH};
pub use error::{BuildError, BuildResult};
pub use image_url::{ImageUrl, sanitize_tag};
pub use options::{BuildOptions, Credentials};
pub use promote::{DockerPromoter, DryRunPromoter, PromoteOptions, PromotePlan, Promoter, promote};
pub use registry::RegistryClient;
pub use self::semver::{DEFAULT_SEMVER_TEMPLATE, SemVer};
