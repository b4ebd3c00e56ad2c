//! Semantic validation for engine configuration.
//!
//! Serde guarantees the shape; this module checks the values. All problems
//! are collected so a bad file can be fixed in one pass.

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::engine::{EngineConfig, MAX_WINDOW_DAYS, MIN_SAMPLES_FLOOR};

/// A single validation problem, addressed by a dotted field path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating a config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: &str, message: impl Into<String>) {
        self.warnings.push(ValidationError {
            path: path.to_string(),
            message: message.into(),
        });
    }

    /// Collapse errors into one message for `Error::Config`.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate an engine config.
pub fn validate_engine(config: &EngineConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !xp_common::schema::is_compatible(&config.schema_version) {
        result.error(
            "schema_version",
            format!("unsupported schema version {}", config.schema_version),
        );
    }

    let pricing = &config.pricing;
    if pricing.input_price_per_1k_tokens < Decimal::ZERO {
        result.error("pricing.input_price_per_1k_tokens", "must be non-negative");
    }
    if pricing.output_price_per_1k_tokens < Decimal::ZERO {
        result.error("pricing.output_price_per_1k_tokens", "must be non-negative");
    }
    if pricing.input_price_per_1k_tokens.is_zero() && pricing.output_price_per_1k_tokens.is_zero()
    {
        result.warn("pricing", "both token prices are zero; all costs will report 0");
    }

    let aggregation = &config.aggregation;
    if aggregation.default_window_days == 0 {
        result.error("aggregation.default_window_days", "must be at least 1");
    } else if aggregation.default_window_days > MAX_WINDOW_DAYS {
        result.error(
            "aggregation.default_window_days",
            format!("must be at most {}", MAX_WINDOW_DAYS),
        );
    }
    if aggregation.schema_field_count == 0 {
        result.error("aggregation.schema_field_count", "must be at least 1");
    }

    let significance = &config.significance;
    if significance.min_samples_per_arm < MIN_SAMPLES_FLOOR {
        result.error(
            "significance.min_samples_per_arm",
            format!("must be at least {}", MIN_SAMPLES_FLOOR),
        );
    }
    if !significance.min_success_rate_delta_pp.is_finite()
        || significance.min_success_rate_delta_pp < 0.0
    {
        result.error(
            "significance.min_success_rate_delta_pp",
            "must be a non-negative number",
        );
    }
    if !significance.review_cost_increase_pct.is_finite()
        || significance.review_cost_increase_pct < 0.0
    {
        result.error(
            "significance.review_cost_increase_pct",
            "must be a non-negative number",
        );
    }

    result
}
