//! Infrastructure - configuration
//!
//! - `config` - Run configuration (TOML loading, defaults)

pub mod config;

pub use config::{ClusteringConfig, Config, ModelKind};
