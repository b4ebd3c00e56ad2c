//! Telemetry storage capability and backends.
//!
//! A scan either reflects every stored record matching the filter or fails;
//! a backend never returns a partial result set. Unparseable stored lines are
//! reported as `CorruptRecord` rather than skipped.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;
use xp_common::{Error, Result};

use crate::record::TelemetryRecord;
use crate::window::TimeWindow;
use crate::{TELEMETRY_DIR, TELEMETRY_FILE};

/// Append-only storage for telemetry records.
pub trait TelemetryStore: Send + Sync {
    /// Persist one record.
    fn append(&self, record: &TelemetryRecord) -> Result<()>;

    /// All records for `version` whose timestamp lies in `window` (inclusive).
    /// No ordering is guaranteed.
    fn scan(&self, version: &str, window: &TimeWindow) -> Result<Vec<TelemetryRecord>>;
}

impl<T: TelemetryStore + ?Sized> TelemetryStore for Arc<T> {
    fn append(&self, record: &TelemetryRecord) -> Result<()> {
        (**self).append(record)
    }

    fn scan(&self, version: &str, window: &TimeWindow) -> Result<Vec<TelemetryRecord>> {
        (**self).scan(version, window)
    }
}

fn matches(record: &TelemetryRecord, version: &str, window: &TimeWindow) -> bool {
    record.prompt_version == version && window.contains(record.timestamp)
}

/// Process-local store, used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    records: RwLock<Vec<TelemetryRecord>>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetryStore for MemoryTelemetryStore {
    fn append(&self, record: &TelemetryRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::StoreUnavailable("telemetry lock poisoned".into()))?;
        records.push(record.clone());
        Ok(())
    }

    fn scan(&self, version: &str, window: &TimeWindow) -> Result<Vec<TelemetryRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::StoreUnavailable("telemetry lock poisoned".into()))?;
        Ok(records
            .iter()
            .filter(|r| matches(r, version, window))
            .cloned()
            .collect())
    }
}

/// One JSON record per line in `<data_dir>/telemetry/records.jsonl`.
#[derive(Debug)]
pub struct JsonlTelemetryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTelemetryStore {
    /// Create a store from a specific data directory.
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self::at_path(data_dir.join(TELEMETRY_DIR).join(TELEMETRY_FILE))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, err: std::io::Error) -> Error {
        Error::StoreUnavailable(format!("{}: {}", self.path.display(), err))
    }
}

impl TelemetryStore for JsonlTelemetryStore {
    fn append(&self, record: &TelemetryRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::StoreUnavailable("telemetry write lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.unavailable(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(e))?;
        writeln!(file, "{}", line).map_err(|e| self.unavailable(e))?;

        debug!(
            document_id = %record.document_id,
            version = %record.prompt_version,
            status = %record.status(),
            "telemetry appended"
        );
        Ok(())
    }

    fn scan(&self, version: &str, window: &TimeWindow) -> Result<Vec<TelemetryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path).map_err(|e| self.unavailable(e))?;
        let mut out = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.unavailable(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: TelemetryRecord = serde_json::from_str(&line).map_err(|e| {
                Error::CorruptRecord(format!("{} line {}: {}", self.path.display(), idx + 1, e))
            })?;
            if matches(&record, version, window) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CompletedExtraction;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    fn completed(version: &str, ts: DateTime<Utc>) -> TelemetryRecord {
        TelemetryRecord::completed(
            xp_common::DocumentId::new(),
            version,
            ts,
            CompletedExtraction {
                processing_time_ms: 700,
                input_tokens: 1200,
                output_tokens: 400,
                extracted_field_count: 8,
            },
        )
    }

    fn exercise(store: &dyn TelemetryStore) {
        store.append(&completed("v1.0.0", base())).unwrap();
        store
            .append(&completed("v1.0.0", base() - Duration::days(10)))
            .unwrap();
        store.append(&completed("v2.0.0", base())).unwrap();
        store
            .append(&TelemetryRecord::failed(
                xp_common::DocumentId::new(),
                "v1.0.0",
                base(),
                Some("throttled".into()),
            ))
            .unwrap();

        let window = TimeWindow::trailing_days(base(), 7).unwrap();
        let v1 = store.scan("v1.0.0", &window).unwrap();
        assert_eq!(v1.len(), 2);
        assert!(v1.iter().all(|r| r.prompt_version == "v1.0.0"));

        let v3 = store.scan("v3.0.0", &window).unwrap();
        assert!(v3.is_empty());
    }

    #[test]
    fn memory_store_filters_by_version_and_window() {
        let store = MemoryTelemetryStore::new();
        exercise(&store);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn jsonl_store_filters_by_version_and_window() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlTelemetryStore::from_data_dir(tmp.path());
        exercise(&store);
    }

    #[test]
    fn jsonl_missing_file_scans_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlTelemetryStore::from_data_dir(tmp.path());
        let window = TimeWindow::trailing_days(base(), 7).unwrap();
        assert!(store.scan("v1.0.0", &window).unwrap().is_empty());
    }

    #[test]
    fn jsonl_corrupt_line_fails_whole_scan() {
        let tmp = TempDir::new().unwrap();
        let store = JsonlTelemetryStore::from_data_dir(tmp.path());
        store.append(&completed("v1.0.0", base())).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(store.path())
            .unwrap();
        writeln!(file, "{{\"prompt_version\": \"v1.0.0\", \"status\": 3}}").unwrap();

        let window = TimeWindow::trailing_days(base(), 7).unwrap();
        let err = store.scan("v1.0.0", &window).unwrap_err();
        assert_eq!(err.code(), 41);
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn window_edges_are_inclusive() {
        let store = MemoryTelemetryStore::new();
        let window = TimeWindow::trailing_days(base(), 7).unwrap();
        store.append(&completed("v1.0.0", window.start)).unwrap();
        store.append(&completed("v1.0.0", window.end)).unwrap();
        store
            .append(&completed("v1.0.0", window.end + Duration::seconds(1)))
            .unwrap();
        assert_eq!(store.scan("v1.0.0", &window).unwrap().len(), 2);
    }
}
