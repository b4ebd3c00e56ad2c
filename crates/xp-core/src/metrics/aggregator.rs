use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, instrument};
use xp_common::{Error, Result};
use xp_config::EngineConfig;
use xp_telemetry::{TelemetryStore, TimeWindow, EXTRACTION_SCHEMA_FIELDS};

use super::{summarize, MetricsCache, VersionMetrics};
use crate::cost::CostModel;

const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Computes [`VersionMetrics`] from a telemetry store.
pub struct MetricsAggregator {
    store: Arc<dyn TelemetryStore>,
    cost_model: CostModel,
    schema_field_count: u32,
    default_window_days: u32,
    cache: Option<MetricsCache>,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn TelemetryStore>, cost_model: CostModel) -> Self {
        Self {
            store,
            cost_model,
            schema_field_count: EXTRACTION_SCHEMA_FIELDS,
            default_window_days: DEFAULT_WINDOW_DAYS,
            cache: None,
        }
    }

    /// Pricing, schema size, default window, and cache TTL from config.
    pub fn from_config(store: Arc<dyn TelemetryStore>, config: &EngineConfig) -> Self {
        let aggregator = Self::new(store, CostModel::from_pricing(&config.pricing))
            .with_schema_field_count(config.aggregation.schema_field_count)
            .with_default_window_days(config.aggregation.default_window_days);
        match config.aggregation.cache_ttl_secs {
            0 => aggregator,
            secs => aggregator.with_cache(Duration::from_secs(secs)),
        }
    }

    pub fn with_schema_field_count(mut self, count: u32) -> Self {
        self.schema_field_count = count;
        self
    }

    pub fn with_default_window_days(mut self, days: u32) -> Self {
        self.default_window_days = days;
        self
    }

    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(MetricsCache::new(ttl));
        self
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    /// The trailing default window ending now.
    pub fn default_window(&self) -> Result<TimeWindow> {
        TimeWindow::trailing_days(Utc::now(), self.default_window_days)
    }

    /// Drop memoized metrics so the next call re-reads the store.
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Metrics for `prompt_version` over `window`, or the default trailing
    /// window when `None`.
    ///
    /// Errors: [`Error::Validation`] for a blank version,
    /// [`Error::NoTelemetry`] when no record matches, and store failures
    /// unchanged.
    #[instrument(skip(self), fields(window_days = self.default_window_days))]
    pub fn get_version_metrics(
        &self,
        prompt_version: &str,
        window: Option<TimeWindow>,
    ) -> Result<VersionMetrics> {
        if prompt_version.trim().is_empty() {
            return Err(Error::Validation("prompt_version must not be empty".into()));
        }

        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(prompt_version, window))
        {
            return Ok(cached);
        }

        let started = Instant::now();
        let effective = match window {
            Some(window) => window,
            None => self.default_window()?,
        };
        let records = self.store.scan(prompt_version, &effective)?;

        let metrics = summarize(
            prompt_version,
            effective,
            &records,
            &self.cost_model,
            self.schema_field_count,
        )?;
        debug!(
            records = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregated telemetry"
        );

        if let Some(cache) = &self.cache {
            cache.insert(window, &metrics);
        }
        Ok(metrics)
    }
}
