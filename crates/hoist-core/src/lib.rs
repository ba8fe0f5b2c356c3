//! Hoist core
//!
//! イメージツリーのデータモデル、依存グラフのコンパイラ、
//! 検索インデックスとワイルドカード展開を提供します。

pub mod error;
pub mod filter;
pub mod graph;
pub mod index;
pub mod model;
pub mod template;
pub mod wildcard;

pub use error::{CoreError, Result};
pub use filter::{FilterAttribute, ImageFilter};
pub use graph::{ImageNode, ImagesGraph, NodeId, RenderDates, image_row};
pub use index::ImageIndex;
pub use model::{
    Builder, BuilderRef, Builders, DEFAULT_DRIVER, Image, ImagesTree, VarMapping, Variables,
    WILDCARD_VERSION, node_key,
};
pub use template::TemplateProcessor;
pub use wildcard::{ResolvedNode, SyntheticNode};
