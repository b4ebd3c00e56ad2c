//! Experiment lifecycle against file-backed stores.

use chrono::Utc;
use tempfile::TempDir;
use xp_common::{DocumentId, Error, ExperimentId};
use xp_config::{resolve_config, EngineConfig};
use xp_core::{Engine, ExperimentStatus, NewExperiment, TrafficAllocation};
use xp_telemetry::{CompletedExtraction, TelemetryRecord};

fn open(data: &TempDir) -> Engine {
    let resolved = resolve_config(None, Some(data.path())).unwrap();
    Engine::open(&resolved)
}

#[test]
fn state_survives_reopening() {
    let data = TempDir::new().unwrap();
    let id = {
        let engine = open(&data);
        let exp = engine
            .experiments()
            .create(
                NewExperiment::new("Allergy phrasing", "v2.0.0", "v2.1.0")
                    .with_traffic_allocation(TrafficAllocation::Canary)
                    .with_created_by("ml-oncall"),
            )
            .unwrap();
        engine.experiments().start(&exp.experiment_id).unwrap();
        engine
            .experiments()
            .record_request(&exp.experiment_id, "v2.1.0")
            .unwrap();
        exp.experiment_id
    };

    let engine = open(&data);
    let exp = engine.experiments().get(&id).unwrap();
    assert_eq!(exp.status, ExperimentStatus::Running);
    assert_eq!(exp.traffic_allocation.weights(), (95, 5));
    assert_eq!(exp.created_by, "ml-oncall");
    assert_eq!(exp.treatment_requests, 1);
}

#[test]
fn rollback_path() {
    let data = TempDir::new().unwrap();
    let engine = open(&data);
    let m = engine.experiments();
    let exp = m.create(NewExperiment::new("Vitals", "v1", "v2")).unwrap();

    assert!(matches!(
        m.rollback(&exp.experiment_id, None),
        Err(Error::InvalidTransition { .. })
    ));
    m.start(&exp.experiment_id).unwrap();
    m.complete(&exp.experiment_id, "v1", Some("no gain".into()))
        .unwrap();
    let rolled = m
        .rollback(&exp.experiment_id, Some("latency regression".into()))
        .unwrap();
    assert_eq!(rolled.status, ExperimentStatus::RolledBack);
    assert_eq!(rolled.winner.as_deref(), Some("v1"));
    assert_eq!(rolled.conclusion.as_deref(), Some("latency regression"));

    let listed = m.list(Some(ExperimentStatus::RolledBack), None).unwrap();
    assert_eq!(listed.len(), 1);
}

#[test]
fn telemetry_persists_to_jsonl() {
    let data = TempDir::new().unwrap();
    {
        let engine = open(&data);
        engine
            .record_telemetry(&TelemetryRecord::completed(
                DocumentId::new(),
                "v1",
                Utc::now(),
                CompletedExtraction {
                    processing_time_ms: 1200,
                    input_tokens: 2000,
                    output_tokens: 600,
                    extracted_field_count: 7,
                },
            ))
            .unwrap();
    }
    let engine = open(&data);
    let m = engine.metrics().get_version_metrics("v1", None).unwrap();
    assert_eq!(m.total_requests, 1);
    assert_eq!(m.p50_latency_ms, 1200);
    assert!(data.path().join("telemetry").join("records.jsonl").exists());
}

#[test]
fn record_over_schema_size_is_rejected() {
    let engine = Engine::in_memory(EngineConfig::default());
    let err = engine
        .record_telemetry(&TelemetryRecord::completed(
            DocumentId::new(),
            "v1",
            Utc::now(),
            CompletedExtraction {
                processing_time_ms: 10,
                input_tokens: 1,
                output_tokens: 1,
                extracted_field_count: 10,
            },
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

fn assert_start_rejected(
    data: &TempDir,
    engine: &Engine,
    id: &ExperimentId,
    status: ExperimentStatus,
) {
    let before = engine.experiments().get(id).unwrap();
    assert_eq!(before.status, status);
    assert!(matches!(
        engine.experiments().start(id),
        Err(Error::InvalidTransition { action: "start", .. })
    ));
    assert_eq!(open(data).experiments().get(id).unwrap(), before);
}

#[test]
fn start_outside_draft_is_rejected_and_persisted_state_kept() {
    let data = TempDir::new().unwrap();
    let engine = open(&data);
    let m = engine.experiments();

    let id = m
        .create(NewExperiment::new("Dosage", "v1", "v2"))
        .unwrap()
        .experiment_id;
    m.start(&id).unwrap();
    m.record_request(&id, "v2").unwrap();
    assert_start_rejected(&data, &engine, &id, ExperimentStatus::Running);

    m.complete(&id, "v2", Some("better recall".into())).unwrap();
    assert_start_rejected(&data, &engine, &id, ExperimentStatus::Completed);

    m.promote(&id).unwrap();
    assert_start_rejected(&data, &engine, &id, ExperimentStatus::Promoted);

    let other = m
        .create(NewExperiment::new("Dosage rerun", "v1", "v2"))
        .unwrap()
        .experiment_id;
    m.start(&other).unwrap();
    m.complete(&other, "v1", None).unwrap();
    m.rollback(&other, Some("noisy".into())).unwrap();
    assert_start_rejected(&data, &engine, &other, ExperimentStatus::RolledBack);
}
