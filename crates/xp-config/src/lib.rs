//! Prompt experiment engine configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `engine.json`
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation that reports every problem at once
//! - JSON schema export for the config file

pub mod engine;
pub mod resolve;
pub mod validate;

pub use engine::{
    AggregationConfig, EngineConfig, PricingConfig, SignificanceConfig, StorageConfig,
    MAX_WINDOW_DAYS, MIN_SAMPLES_FLOOR,
};
pub use resolve::{load_config_file, resolve_config, ConfigPaths, ResolvedConfig};
pub use validate::{validate_engine, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Default config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "engine.json";

/// JSON schema of `engine.json`, pretty-printed.
pub fn engine_schema_json() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(EngineConfig);
    serde_json::to_string_pretty(&schema)
}
