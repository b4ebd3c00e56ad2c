//! Prompt experiment engine.
//!
//! Aggregates extraction telemetry per prompt version, compares a treatment
//! version against a control, and manages the experiment lifecycle from
//! draft to promotion or rollback.

pub mod compare;
pub mod cost;
pub mod engine;
pub mod exit_codes;
pub mod experiment;
pub mod logging;
pub mod metrics;
pub mod render;

pub use compare::{
    compare_metrics, ComparisonResult, Comparator, Recommendation, SignificanceGate,
    SuccessRateTest, DEFAULT_CONFIDENCE,
};
pub use cost::CostModel;
pub use engine::Engine;
pub use exit_codes::ExitCode;
pub use experiment::{
    Arm, Experiment, ExperimentEvaluation, ExperimentManager, ExperimentStatus, ExperimentStore,
    ExperimentUpdate, JsonExperimentStore, MemoryExperimentStore, NewExperiment,
    TrafficAllocation,
};
pub use metrics::{summarize, MetricsAggregator, VersionMetrics};
