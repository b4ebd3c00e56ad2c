//! Engine configuration types.
//!
//! Every section and field is optional in the file; omitted values take the
//! defaults below, which reproduce the reference deployment.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Minimum per-arm sample count below which no comparison is trusted.
/// Configuration may raise the floor, never lower it.
pub const MIN_SAMPLES_FLOOR: u64 = 30;

/// Longest default aggregation window accepted from configuration.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub significance: SignificanceConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            pricing: PricingConfig::default(),
            aggregation: AggregationConfig::default(),
            significance: SignificanceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Token pricing for the model serving extractions.
///
/// Prices change independently of engine logic, so they live here rather
/// than in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PricingConfig {
    /// Model the prices apply to (informational).
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// USD per 1,000 input tokens.
    #[serde(default = "default_input_price")]
    pub input_price_per_1k_tokens: Decimal,

    /// USD per 1,000 output tokens.
    #[serde(default = "default_output_price")]
    pub output_price_per_1k_tokens: Decimal,
}

fn default_model_id() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}

fn default_input_price() -> Decimal {
    dec!(0.00025)
}

fn default_output_price() -> Decimal {
    dec!(0.00125)
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            input_price_per_1k_tokens: default_input_price(),
            output_price_per_1k_tokens: default_output_price(),
        }
    }
}

/// Telemetry aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AggregationConfig {
    /// Trailing window used when a caller gives none.
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,

    /// Memoization TTL for per-version metrics; 0 disables the cache.
    #[serde(default)]
    pub cache_ttl_secs: u64,

    /// Number of semantic fields in the extraction schema.
    #[serde(default = "default_schema_field_count")]
    pub schema_field_count: u32,
}

fn default_window_days() -> u32 {
    7
}

fn default_schema_field_count() -> u32 {
    9
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
            cache_ttl_secs: 0,
            schema_field_count: default_schema_field_count(),
        }
    }
}

/// The practical significance gate and recommendation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignificanceConfig {
    /// Requests each arm needs before a comparison can be significant.
    #[serde(default = "default_min_samples")]
    pub min_samples_per_arm: u64,

    /// Absolute success-rate delta (percentage points) that must be exceeded.
    #[serde(default = "default_min_delta")]
    pub min_success_rate_delta_pp: f64,

    /// Cost increase (percent) at or above which a better treatment needs review.
    #[serde(default = "default_review_cost")]
    pub review_cost_increase_pct: f64,
}

fn default_min_samples() -> u64 {
    MIN_SAMPLES_FLOOR
}

fn default_min_delta() -> f64 {
    5.0
}

fn default_review_cost() -> f64 {
    20.0
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            min_samples_per_arm: default_min_samples(),
            min_success_rate_delta_pp: default_min_delta(),
            review_cost_increase_pct: default_review_cost(),
        }
    }
}

/// Where file-backed stores keep their data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}
