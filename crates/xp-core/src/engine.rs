//! Explicit wiring of stores, aggregator, comparator, and manager.
//!
//! Callers build one [`Engine`] and pass it around; there is no global
//! instance.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use xp_common::{ExperimentId, Result};
use xp_config::{EngineConfig, ResolvedConfig};
use xp_telemetry::{JsonlTelemetryStore, MemoryTelemetryStore, TelemetryRecord, TelemetryStore, TimeWindow};

use crate::compare::{Comparator, SignificanceGate};
use crate::experiment::{
    evaluate, ExperimentEvaluation, ExperimentManager, ExperimentStore, JsonExperimentStore,
    MemoryExperimentStore,
};
use crate::metrics::MetricsAggregator;

pub struct Engine {
    config: EngineConfig,
    telemetry: Arc<dyn TelemetryStore>,
    aggregator: Arc<MetricsAggregator>,
    comparator: Comparator,
    experiments: ExperimentManager,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        telemetry: Arc<dyn TelemetryStore>,
        experiments: Arc<dyn ExperimentStore>,
    ) -> Self {
        let aggregator = Arc::new(MetricsAggregator::from_config(telemetry.clone(), &config));
        let comparator = Comparator::new(
            aggregator.clone(),
            SignificanceGate::from_config(&config.significance),
        );
        Self {
            config,
            telemetry,
            aggregator,
            comparator,
            experiments: ExperimentManager::new(experiments),
        }
    }

    /// Process-local stores.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryTelemetryStore::new()),
            Arc::new(MemoryExperimentStore::new()),
        )
    }

    /// File-backed stores under the resolved data directory.
    pub fn open(resolved: &ResolvedConfig) -> Self {
        let data_dir = &resolved.paths.data_dir;
        debug!(data_dir = %data_dir.display(), "opening file-backed stores");
        Self::new(
            resolved.config.clone(),
            Arc::new(JsonlTelemetryStore::from_data_dir(data_dir)),
            Arc::new(JsonExperimentStore::from_data_dir(data_dir)),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.aggregator
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }

    pub fn experiments(&self) -> &ExperimentManager {
        &self.experiments
    }

    /// Validate against the configured schema size, then append.
    pub fn record_telemetry(&self, record: &TelemetryRecord) -> Result<()> {
        record.validate(self.config.aggregation.schema_field_count)?;
        self.telemetry.append(record)?;
        self.aggregator.invalidate();
        Ok(())
    }

    /// Compare an experiment's versions over its own run and judge it
    /// against its thresholds.
    ///
    /// The window runs from `started_at` to `ended_at` (or now); a draft
    /// uses the default trailing window.
    pub fn evaluate_experiment(
        &self,
        id: &ExperimentId,
        confidence_level: f64,
    ) -> Result<ExperimentEvaluation> {
        let experiment = self.experiments.get(id)?;
        let now = Utc::now();
        let window = match experiment.started_at {
            Some(started) => {
                let end = experiment.ended_at.unwrap_or(now).max(started);
                Some(TimeWindow::new(started, end)?)
            }
            None => None,
        };
        let comparison = self.comparator.compare_in(
            &experiment.control_version,
            &experiment.treatment_version,
            confidence_level,
            window,
        )?;
        Ok(evaluate(&experiment, comparison, now))
    }
}
