//! Prompt version experiments: records, storage, and lifecycle.

mod evaluate;
mod manager;
mod model;
mod store;

pub use evaluate::{evaluate, ExperimentEvaluation};
pub use manager::ExperimentManager;
pub use model::{
    Arm, Experiment, ExperimentStatus, NewExperiment, TrafficAllocation,
    DEFAULT_MAX_COST_INCREASE_PCT, DEFAULT_MAX_DURATION_DAYS, DEFAULT_MIN_SUCCESS_RATE_DELTA,
    DEFAULT_TARGET_SAMPLE_SIZE, MAX_DURATION_DAYS_LIMIT,
};
pub use store::{
    ExperimentStore, ExperimentUpdate, JsonExperimentStore, MemoryExperimentStore,
    EXPERIMENTS_DIR, EXPERIMENTS_FILE,
};
