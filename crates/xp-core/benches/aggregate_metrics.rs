//! Criterion benchmarks for metrics aggregation and comparison in `xp-core`.
//!
//! Benchmarks the pure `summarize` reduction at several telemetry volumes
//! and a full `compare` through in-memory stores.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xp_common::DocumentId;
use xp_config::EngineConfig;
use xp_core::{summarize, CostModel, Engine};
use xp_telemetry::{CompletedExtraction, TelemetryRecord, TimeWindow};

fn synthetic_records(version: &str, n: usize) -> Vec<TelemetryRecord> {
    let base = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let ts = base + Duration::seconds(i as i64);
            let doc = DocumentId::from(format!("{version}-{i}").as_str());
            if i % 20 == 0 {
                TelemetryRecord::failed(doc, version, ts, Some("timeout".into()))
            } else {
                TelemetryRecord::completed(
                    doc,
                    version,
                    ts,
                    CompletedExtraction {
                        processing_time_ms: 500 + (i as u64 * 7919) % 4000,
                        input_tokens: 1000 + (i as u64 % 300),
                        output_tokens: 400 + (i as u64 % 120),
                        extracted_field_count: (i % 10) as u32,
                    },
                )
            }
        })
        .collect()
}

fn bench_summarize(c: &mut Criterion) {
    let window = TimeWindow::new(
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap(),
    )
    .unwrap();
    let cost = CostModel::default();

    let mut group = c.benchmark_group("metrics/summarize");
    for n in [100usize, 1_000, 10_000, 100_000] {
        let records = synthetic_records("v1", n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &records, |b, recs| {
            b.iter(|| {
                let m = summarize("v1", window, black_box(recs), &cost, 9).unwrap();
                black_box(m.p99_latency_ms);
            })
        });
    }
    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let engine = Engine::in_memory(EngineConfig::default());
    let now = Utc::now();
    for version in ["v1", "v2"] {
        for (i, mut record) in synthetic_records(version, 5_000).into_iter().enumerate() {
            record.timestamp = now - Duration::seconds(i as i64 + 1);
            engine.record_telemetry(&record).unwrap();
        }
    }

    c.bench_function("compare/in_memory_5k_per_arm", |b| {
        b.iter(|| {
            let result = engine.comparator().compare("v1", "v2", 0.95).unwrap();
            black_box(result.is_significant);
        })
    });
}

criterion_group!(benches, bench_summarize, bench_compare);
criterion_main!(benches);
