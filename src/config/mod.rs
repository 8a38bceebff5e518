// src/config/mod.rs
mod types;

pub use types::{ClusterConfig, ConfigError};
