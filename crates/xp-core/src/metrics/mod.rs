//! Per-version telemetry aggregation.
//!
//! [`summarize`] is the pure reduction from records to [`VersionMetrics`];
//! [`MetricsAggregator`] fetches the records from a store and optionally
//! memoizes the result.

mod aggregator;
mod cache;

pub use aggregator::MetricsAggregator;
pub use cache::MetricsCache;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use xp_common::{Error, Result};
use xp_math::{mean, mean_u64, percentage, round_to, LatencyPercentiles};
use xp_telemetry::{TelemetryRecord, TimeWindow};

use crate::cost::{round_cost, CostModel};

/// Aggregate metrics for one prompt version over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMetrics {
    pub prompt_version: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percent of requests that completed, 0-100.
    pub success_rate: f64,

    /// Latency over completed requests only.
    pub avg_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,

    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: Decimal,
    /// Total cost divided by completed requests.
    pub avg_cost_per_request: Decimal,

    /// Mean share of schema fields populated, 0-100.
    pub avg_completeness_pct: f64,
    pub avg_fields_extracted: f64,

    pub first_request_at: DateTime<Utc>,
    pub last_request_at: DateTime<Utc>,
}

/// Reduce the records of one version within `window` to metrics.
///
/// Records whose version or timestamp fall outside the request are ignored,
/// so callers may pass an unfiltered slice. Fails with
/// [`Error::NoTelemetry`] when nothing matches and with
/// [`Error::CorruptRecord`] when a record reports more fields than the
/// schema holds.
pub fn summarize(
    prompt_version: &str,
    window: TimeWindow,
    records: &[TelemetryRecord],
    cost_model: &CostModel,
    schema_field_count: u32,
) -> Result<VersionMetrics> {
    let mut total: u64 = 0;
    let mut latencies = Vec::new();
    let mut completeness = Vec::new();
    let mut fields = Vec::new();
    let mut input_tokens: u64 = 0;
    let mut output_tokens: u64 = 0;
    let mut first: Option<DateTime<Utc>> = None;
    let mut last: Option<DateTime<Utc>> = None;

    for record in records
        .iter()
        .filter(|r| r.prompt_version == prompt_version && window.contains(r.timestamp))
    {
        record
            .validate(schema_field_count)
            .map_err(|e| Error::CorruptRecord(format!("{}: {}", record.document_id, e)))?;

        total += 1;
        first = Some(first.map_or(record.timestamp, |t| t.min(record.timestamp)));
        last = Some(last.map_or(record.timestamp, |t| t.max(record.timestamp)));

        if let Some(m) = record.measurements() {
            latencies.push(m.processing_time_ms);
            input_tokens = input_tokens.saturating_add(m.input_tokens);
            output_tokens = output_tokens.saturating_add(m.output_tokens);
            fields.push(f64::from(m.extracted_field_count));
            completeness.push(percentage(
                u64::from(m.extracted_field_count),
                u64::from(schema_field_count),
            ));
        }
    }

    let (Some(first_request_at), Some(last_request_at)) = (first, last) else {
        return Err(Error::NoTelemetry {
            version: prompt_version.to_string(),
        });
    };

    let successful = latencies.len() as u64;
    latencies.sort_unstable();
    let percentiles = LatencyPercentiles::from_sorted(&latencies);

    let total_cost_usd = cost_model.cost(input_tokens, output_tokens);
    let avg_cost_per_request = if successful == 0 {
        Decimal::ZERO
    } else {
        round_cost(total_cost_usd / Decimal::from(successful))
    };

    Ok(VersionMetrics {
        prompt_version: prompt_version.to_string(),
        window_start: window.start,
        window_end: window.end,
        total_requests: total,
        successful_requests: successful,
        failed_requests: total - successful,
        success_rate: round_to(percentage(successful, total), 2),
        avg_latency_ms: round_to(mean_u64(&latencies).unwrap_or(0.0), 2),
        p50_latency_ms: percentiles.p50,
        p95_latency_ms: percentiles.p95,
        p99_latency_ms: percentiles.p99,
        total_input_tokens: input_tokens,
        total_output_tokens: output_tokens,
        total_cost_usd,
        avg_cost_per_request,
        avg_completeness_pct: round_to(mean(&completeness).unwrap_or(0.0), 2),
        avg_fields_extracted: round_to(mean(&fields).unwrap_or(0.0), 2),
        first_request_at,
        last_request_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use xp_telemetry::CompletedExtraction;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::trailing_days(base() + Duration::days(1), 7).unwrap()
    }

    fn ok(version: &str, minutes: i64, latency: u64, fields: u32) -> TelemetryRecord {
        TelemetryRecord::completed(
            format!("doc-{version}-{minutes}").as_str().into(),
            version,
            base() + Duration::minutes(minutes),
            CompletedExtraction {
                processing_time_ms: latency,
                input_tokens: 1000,
                output_tokens: 500,
                extracted_field_count: fields,
            },
        )
    }

    fn failed(version: &str, minutes: i64) -> TelemetryRecord {
        TelemetryRecord::failed(
            format!("fail-{version}-{minutes}").as_str().into(),
            version,
            base() + Duration::minutes(minutes),
            Some("throttled".into()),
        )
    }

    #[test]
    fn mixed_outcomes() {
        let records = vec![
            ok("v1", 0, 100, 9),
            ok("v1", 1, 300, 6),
            failed("v1", 2),
            ok("v1", 3, 200, 3),
            ok("v2", 4, 9999, 9),
        ];
        let m = summarize("v1", window(), &records, &CostModel::default(), 9).unwrap();

        assert_eq!(m.total_requests, 4);
        assert_eq!(m.successful_requests, 3);
        assert_eq!(m.failed_requests, 1);
        assert_eq!(m.success_rate, 75.0);
        assert_eq!(m.avg_latency_ms, 200.0);
        // sorted [100, 200, 300]: floor(3*0.5)=1
        assert_eq!(m.p50_latency_ms, 200);
        assert_eq!(m.p95_latency_ms, 300);
        assert_eq!(m.p99_latency_ms, 300);
        assert_eq!(m.total_input_tokens, 3000);
        assert_eq!(m.total_output_tokens, 1500);
        assert_eq!(m.total_cost_usd, dec!(0.002625));
        assert_eq!(m.avg_cost_per_request, dec!(0.000875));
        // (100 + 66.67 + 33.33) / 3
        assert!((m.avg_completeness_pct - 66.67).abs() < 0.01);
        assert_eq!(m.avg_fields_extracted, 6.0);
        assert_eq!(m.first_request_at, base());
        assert_eq!(m.last_request_at, base() + Duration::minutes(3));
    }

    #[test]
    fn all_failed_has_zero_latency_and_cost() {
        let records = vec![failed("v3", 0), failed("v3", 1)];
        let m = summarize("v3", window(), &records, &CostModel::default(), 9).unwrap();
        assert_eq!(m.success_rate, 0.0);
        assert_eq!(m.avg_latency_ms, 0.0);
        assert_eq!(m.p99_latency_ms, 0);
        assert_eq!(m.total_cost_usd, Decimal::ZERO);
        assert_eq!(m.avg_cost_per_request, Decimal::ZERO);
    }

    #[test]
    fn no_matching_records_is_no_telemetry() {
        let records = vec![ok("v1", 0, 100, 9)];
        let err = summarize("v9", window(), &records, &CostModel::default(), 9).unwrap_err();
        assert!(matches!(err, Error::NoTelemetry { .. }));
    }

    #[test]
    fn records_outside_window_are_ignored() {
        let records = vec![ok("v1", 0, 100, 9), ok("v1", -60 * 24 * 30, 5000, 9)];
        let m = summarize("v1", window(), &records, &CostModel::default(), 9).unwrap();
        assert_eq!(m.total_requests, 1);
        assert_eq!(m.p99_latency_ms, 100);
    }

    #[test]
    fn single_record_percentiles_equal_it() {
        let m = summarize("v1", window(), &[ok("v1", 0, 420, 9)], &CostModel::default(), 9)
            .unwrap();
        assert_eq!(
            (m.p50_latency_ms, m.p95_latency_ms, m.p99_latency_ms),
            (420, 420, 420)
        );
    }

    #[test]
    fn field_count_above_schema_is_corrupt() {
        let err = summarize("v1", window(), &[ok("v1", 0, 100, 12)], &CostModel::default(), 9)
            .unwrap_err();
        assert!(matches!(err, Error::CorruptRecord(_)));
    }
}
