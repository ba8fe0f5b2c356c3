//! イメージとビルダーのデータモデル

mod builder;
mod image;
mod scalar;
pub mod varmap;

pub use builder::{Builder, Builders, DEFAULT_DRIVER};
pub use image::{
    BuilderRef, Image, ImagesTree, NODE_KEY_SEPARATOR, Variables, WILDCARD_VERSION, node_key,
};
pub use varmap::VarMapping;
