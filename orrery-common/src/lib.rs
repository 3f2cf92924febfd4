// orrery-common/src/lib.rs
pub mod catalog;
pub mod config;
pub mod dependency;
pub mod error;
pub mod keg;
pub mod model;
pub mod pipeline;

// Re-export key types
pub use catalog::Catalog;
pub use config::Config;
pub use error::{OrreryError, Result};
pub use model::Formula;
