pub mod build;
pub mod get;
pub mod promote;
