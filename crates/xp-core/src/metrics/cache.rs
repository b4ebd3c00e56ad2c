//! In-process TTL cache for per-version metrics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;
use xp_telemetry::TimeWindow;

use super::VersionMetrics;

/// Window `None` means "the default trailing window at lookup time".
type CacheKey = (String, Option<TimeWindow>);

#[derive(Debug, Clone)]
struct CachedMetrics {
    metrics: VersionMetrics,
    cached_at: Instant,
}

impl CachedMetrics {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

/// Memoizes metrics per `(version, window)` for a fixed TTL.
///
/// Entries are served stale for at most `ttl`; new telemetry becomes
/// visible once an entry expires or the cache is cleared.
#[derive(Debug)]
pub struct MetricsCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CachedMetrics>>,
}

impl MetricsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, version: &str, window: Option<TimeWindow>) -> Option<VersionMetrics> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(&(version.to_string(), window))?;
        if entry.is_fresh(self.ttl) {
            debug!(version, "metrics cache hit");
            Some(entry.metrics.clone())
        } else {
            debug!(version, "metrics cache entry expired");
            None
        }
    }

    pub fn insert(&self, window: Option<TimeWindow>, metrics: &VersionMetrics) {
        // A poisoned cache only costs a recomputation.
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, e| e.is_fresh(ttl));
            entries.insert(
                (metrics.prompt_version.clone(), window),
                CachedMetrics {
                    metrics: metrics.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
