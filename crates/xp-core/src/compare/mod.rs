//! Control vs treatment comparison and the promotion recommendation.
//!
//! Significance here is a practical gate, not a statistical test: both arms
//! need enough requests and the success-rate delta has to be large enough to
//! matter. A pooled two-proportion z-test is reported alongside as advisory
//! context and never changes the recommendation.

mod recommendation;

pub use recommendation::Recommendation;

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use xp_common::{Error, Result};
use xp_config::{SignificanceConfig, MIN_SAMPLES_FLOOR};
use xp_math::{round_to, two_proportion_z_test};
use xp_telemetry::TimeWindow;

use crate::cost::round_cost;
use crate::metrics::{MetricsAggregator, VersionMetrics};

/// Accepted range for `confidence_level`.
pub const CONFIDENCE_RANGE: std::ops::RangeInclusive<f64> = 0.5..=0.99;

/// Default confidence level when a caller gives none.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Thresholds that drive `is_significant` and the recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceGate {
    pub min_samples_per_arm: u64,
    pub min_success_rate_delta_pp: f64,
    pub review_cost_increase_pct: f64,
}

impl SignificanceGate {
    /// Raises a configured sample minimum below the floor back to it.
    pub fn from_config(config: &SignificanceConfig) -> Self {
        Self {
            min_samples_per_arm: config.min_samples_per_arm.max(MIN_SAMPLES_FLOOR),
            min_success_rate_delta_pp: config.min_success_rate_delta_pp,
            review_cost_increase_pct: config.review_cost_increase_pct,
        }
    }

    /// Both arms meet the sample minimum and `|delta|` exceeds the threshold.
    pub fn is_significant(&self, control_n: u64, treatment_n: u64, delta_pp: f64) -> bool {
        control_n >= self.min_samples_per_arm
            && treatment_n >= self.min_samples_per_arm
            && delta_pp.abs() > self.min_success_rate_delta_pp
    }
}

impl Default for SignificanceGate {
    fn default() -> Self {
        Self::from_config(&SignificanceConfig::default())
    }
}

/// Advisory significance of the success-rate difference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessRateTest {
    pub z: f64,
    pub p_value: f64,
    /// `p_value < 1 - confidence_level`.
    pub significant: bool,
}

/// Outcome of comparing two prompt versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub control_version: String,
    pub treatment_version: String,
    pub control_n: u64,
    pub treatment_n: u64,

    pub control_success_rate: f64,
    pub treatment_success_rate: f64,
    /// Treatment minus control, percentage points.
    pub success_rate_delta: f64,

    pub control_avg_latency_ms: f64,
    pub treatment_avg_latency_ms: f64,
    /// Treatment minus control, milliseconds.
    pub time_delta_ms: f64,

    pub control_avg_cost: Decimal,
    pub treatment_avg_cost: Decimal,
    pub cost_delta_usd: Decimal,
    /// Relative to control; 0 when control cost is 0.
    pub cost_delta_pct: f64,

    pub is_significant: bool,
    pub confidence_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate_test: Option<SuccessRateTest>,

    pub recommendation: Recommendation,
    /// Human-readable explanation of the recommendation.
    pub summary: String,
}

/// Compare two sets of metrics. Inputs are assumed already validated.
pub fn compare_metrics(
    control: &VersionMetrics,
    treatment: &VersionMetrics,
    confidence_level: f64,
    gate: &SignificanceGate,
) -> ComparisonResult {
    let success_rate_delta = round_to(treatment.success_rate - control.success_rate, 2);
    let time_delta_ms = round_to(treatment.avg_latency_ms - control.avg_latency_ms, 2);

    let cost_delta_usd = round_cost(treatment.avg_cost_per_request - control.avg_cost_per_request);
    let cost_delta_pct = if control.avg_cost_per_request.is_zero() {
        0.0
    } else {
        let pct = cost_delta_usd
            .checked_div(control.avg_cost_per_request)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .and_then(|pct| pct.to_f64())
            .unwrap_or(0.0);
        round_to(pct, 2)
    };

    let is_significant = gate.is_significant(
        control.total_requests,
        treatment.total_requests,
        success_rate_delta,
    );
    let recommendation =
        Recommendation::decide(is_significant, success_rate_delta, cost_delta_pct, gate);

    let success_rate_test = two_proportion_z_test(
        control.successful_requests,
        control.total_requests,
        treatment.successful_requests,
        treatment.total_requests,
    )
    .map(|t| SuccessRateTest {
        z: round_to(t.z, 4),
        p_value: round_to(t.p_value, 4),
        significant: t.p_value < 1.0 - confidence_level,
    });

    let summary = recommendation.explain(
        &treatment.prompt_version,
        control.total_requests.min(treatment.total_requests),
        success_rate_delta,
        cost_delta_pct,
        gate,
    );

    ComparisonResult {
        control_version: control.prompt_version.clone(),
        treatment_version: treatment.prompt_version.clone(),
        control_n: control.total_requests,
        treatment_n: treatment.total_requests,
        control_success_rate: control.success_rate,
        treatment_success_rate: treatment.success_rate,
        success_rate_delta,
        control_avg_latency_ms: control.avg_latency_ms,
        treatment_avg_latency_ms: treatment.avg_latency_ms,
        time_delta_ms,
        control_avg_cost: control.avg_cost_per_request,
        treatment_avg_cost: treatment.avg_cost_per_request,
        cost_delta_usd,
        cost_delta_pct,
        is_significant,
        confidence_level,
        success_rate_test,
        recommendation,
        summary,
    }
}

/// Check arguments before any data is read.
pub fn validate_request(control: &str, treatment: &str, confidence_level: f64) -> Result<()> {
    if !CONFIDENCE_RANGE.contains(&confidence_level) {
        return Err(Error::Validation(format!(
            "confidence_level {} outside [{}, {}]",
            confidence_level,
            CONFIDENCE_RANGE.start(),
            CONFIDENCE_RANGE.end()
        )));
    }
    if control.trim().is_empty() || treatment.trim().is_empty() {
        return Err(Error::Validation("prompt versions must not be empty".into()));
    }
    if control == treatment {
        return Err(Error::Validation(format!(
            "control and treatment are both {control}"
        )));
    }
    Ok(())
}

/// Compares prompt versions using metrics from an aggregator.
pub struct Comparator {
    aggregator: Arc<MetricsAggregator>,
    gate: SignificanceGate,
}

impl Comparator {
    pub fn new(aggregator: Arc<MetricsAggregator>, gate: SignificanceGate) -> Self {
        Self { aggregator, gate }
    }

    pub fn gate(&self) -> &SignificanceGate {
        &self.gate
    }

    /// Compare over the aggregator's default window.
    pub fn compare(
        &self,
        control: &str,
        treatment: &str,
        confidence_level: f64,
    ) -> Result<ComparisonResult> {
        self.compare_in(control, treatment, confidence_level, None)
    }

    /// Compare over an explicit window, or the default one when `None`.
    ///
    /// Either version lacking telemetry yields [`Error::InsufficientData`].
    #[instrument(skip(self))]
    pub fn compare_in(
        &self,
        control: &str,
        treatment: &str,
        confidence_level: f64,
        window: Option<TimeWindow>,
    ) -> Result<ComparisonResult> {
        validate_request(control, treatment, confidence_level)?;

        let control_metrics = self.metrics_for(control, treatment, control, window)?;
        let treatment_metrics = self.metrics_for(control, treatment, treatment, window)?;

        let result = compare_metrics(
            &control_metrics,
            &treatment_metrics,
            confidence_level,
            &self.gate,
        );
        info!(
            control,
            treatment,
            delta_pp = result.success_rate_delta,
            significant = result.is_significant,
            recommendation = %result.recommendation,
            "compared prompt versions"
        );
        Ok(result)
    }

    fn metrics_for(
        &self,
        control: &str,
        treatment: &str,
        version: &str,
        window: Option<TimeWindow>,
    ) -> Result<VersionMetrics> {
        self.aggregator
            .get_version_metrics(version, window)
            .map_err(|e| match e {
                Error::NoTelemetry { version } => Error::InsufficientData {
                    control: control.to_string(),
                    treatment: treatment.to_string(),
                    reason: format!("no telemetry for {version}"),
                },
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn metrics(version: &str, total: u64, successful: u64, avg_cost: Decimal) -> VersionMetrics {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        VersionMetrics {
            prompt_version: version.into(),
            window_start: at,
            window_end: at,
            total_requests: total,
            successful_requests: successful,
            failed_requests: total - successful,
            success_rate: round_to(xp_math::percentage(successful, total), 2),
            avg_latency_ms: 1000.0,
            p50_latency_ms: 1000,
            p95_latency_ms: 1500,
            p99_latency_ms: 2000,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_usd: avg_cost * Decimal::from(successful),
            avg_cost_per_request: avg_cost,
            avg_completeness_pct: 90.0,
            avg_fields_extracted: 8.1,
            first_request_at: at,
            last_request_at: at,
        }
    }

    #[test]
    fn promote_when_better_and_cheap_enough() {
        let c = metrics("v1", 100, 90, dec!(0.001));
        let t = metrics("v2", 100, 97, dec!(0.0011));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        assert_eq!(r.success_rate_delta, 7.0);
        assert_eq!(r.cost_delta_pct, 10.0);
        assert!(r.is_significant);
        assert_eq!(r.recommendation, Recommendation::Promote);
    }

    #[test]
    fn review_when_cost_rises_twenty_percent_or_more() {
        let c = metrics("v1", 100, 90, dec!(0.001));
        let t = metrics("v2", 100, 97, dec!(0.0012));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        assert_eq!(r.cost_delta_pct, 20.0);
        assert_eq!(r.recommendation, Recommendation::Review);
    }

    #[test]
    fn keep_control_when_treatment_is_worse() {
        let c = metrics("v1", 50, 49, dec!(0.001));
        let t = metrics("v2", 50, 45, dec!(0.001));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        assert_eq!(r.success_rate_delta, -8.0);
        assert!(r.is_significant);
        assert_eq!(r.recommendation, Recommendation::KeepControl);
    }

    #[test]
    fn small_arm_is_insufficient_regardless_of_delta() {
        let c = metrics("v1", 29, 10, dec!(0.001));
        let t = metrics("v2", 500, 500, dec!(0.001));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        assert!(!r.is_significant);
        assert_eq!(r.recommendation, Recommendation::InsufficientData);
    }

    #[test]
    fn delta_exactly_at_threshold_is_not_significant() {
        let c = metrics("v1", 100, 90, dec!(0.001));
        let t = metrics("v2", 100, 95, dec!(0.001));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        assert_eq!(r.success_rate_delta, 5.0);
        assert!(!r.is_significant);
    }

    #[test]
    fn zero_control_cost_reports_zero_pct() {
        let c = metrics("v1", 40, 0, Decimal::ZERO);
        let t = metrics("v2", 40, 40, dec!(0.002));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        assert_eq!(r.cost_delta_pct, 0.0);
        assert_eq!(r.cost_delta_usd, dec!(0.002));
        assert_eq!(r.recommendation, Recommendation::Promote);
    }

    #[test]
    fn advisory_test_does_not_change_recommendation() {
        // Large arms, small delta: z-test significant, gate is not.
        let c = metrics("v1", 20_000, 18_000, dec!(0.001));
        let t = metrics("v2", 20_000, 18_400, dec!(0.001));
        let r = compare_metrics(&c, &t, 0.95, &SignificanceGate::default());
        let test = r.success_rate_test.unwrap();
        assert!(test.significant);
        assert!(!r.is_significant);
        assert_eq!(r.recommendation, Recommendation::InsufficientData);
    }

    #[test]
    fn gate_floor_cannot_be_lowered() {
        let gate = SignificanceGate::from_config(&SignificanceConfig {
            min_samples_per_arm: 5,
            ..SignificanceConfig::default()
        });
        assert_eq!(gate.min_samples_per_arm, 30);
    }

    #[test]
    fn default_window_compare_uses_metrics_cache() {
        use crate::cost::CostModel;
        use xp_telemetry::{
            CompletedExtraction, MemoryTelemetryStore, TelemetryRecord, TelemetryStore,
        };

        let store = Arc::new(MemoryTelemetryStore::new());
        let append = |version: &str, doc: String| {
            store
                .append(&TelemetryRecord::completed(
                    doc.as_str().into(),
                    version,
                    Utc::now() - chrono::Duration::minutes(1),
                    CompletedExtraction {
                        processing_time_ms: 800,
                        input_tokens: 100,
                        output_tokens: 50,
                        extracted_field_count: 9,
                    },
                ))
                .unwrap()
        };
        for i in 0..3 {
            append("v1", format!("c-{i}"));
            append("v2", format!("t-{i}"));
        }
        let aggregator = Arc::new(
            MetricsAggregator::new(store.clone(), CostModel::default())
                .with_cache(std::time::Duration::from_secs(300)),
        );
        let comparator = Comparator::new(aggregator.clone(), SignificanceGate::default());

        assert_eq!(comparator.compare("v1", "v2", 0.95).unwrap().control_n, 3);
        append("v1", "c-late".into());
        assert_eq!(comparator.compare("v1", "v2", 0.95).unwrap().control_n, 3);

        aggregator.invalidate();
        assert_eq!(comparator.compare("v1", "v2", 0.95).unwrap().control_n, 4);
    }

    #[test]
    fn request_validation() {
        assert!(validate_request("v1", "v2", 0.95).is_ok());
        assert!(validate_request("v1", "v2", 0.5).is_ok());
        assert!(validate_request("v1", "v2", 0.99).is_ok());
        assert!(validate_request("v1", "v2", 0.3).is_err());
        assert!(validate_request("v1", "v2", 0.995).is_err());
        assert!(validate_request("v1", "v1", 0.95).is_err());
        assert!(validate_request("", "v2", 0.95).is_err());
    }
}
