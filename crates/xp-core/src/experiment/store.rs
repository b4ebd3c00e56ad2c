//! Experiment persistence.
//!
//! Every mutation after creation goes through [`ExperimentStore::update`],
//! which applies the change and its status precondition as one atomic step.
//! Counter increments are applied by the store, never computed by callers
//! from a prior read, so concurrent increments are never lost.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;
use xp_common::{Error, ExperimentId, Result};

use super::model::{Arm, Experiment, ExperimentStatus};

/// Directory under the data dir holding experiment files.
pub const EXPERIMENTS_DIR: &str = "experiments";

/// File holding every experiment.
pub const EXPERIMENTS_FILE: &str = "experiments.json";

/// Sidecar lock file serializing access across processes.
pub const EXPERIMENTS_LOCK_FILE: &str = "experiments.json.lock";

/// A partial change to one experiment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentUpdate {
    pub status: Option<ExperimentStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<String>,
    pub conclusion: Option<String>,
    /// Add one request to this arm's counter.
    pub increment: Option<Arm>,
}

impl ExperimentUpdate {
    pub fn status(status: ExperimentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn increment(arm: Arm) -> Self {
        Self {
            increment: Some(arm),
            ..Self::default()
        }
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    pub fn with_winner(mut self, winner: impl Into<String>) -> Self {
        self.winner = Some(winner.into());
        self
    }

    pub fn with_conclusion(mut self, conclusion: Option<String>) -> Self {
        self.conclusion = conclusion;
        self
    }

    /// Apply in place. Fields left `None` are unchanged.
    pub fn apply_to(&self, experiment: &mut Experiment) {
        if let Some(status) = self.status {
            experiment.status = status;
        }
        if let Some(at) = self.started_at {
            experiment.started_at = Some(at);
        }
        if let Some(at) = self.ended_at {
            experiment.ended_at = Some(at);
        }
        if let Some(winner) = &self.winner {
            experiment.winner = Some(winner.clone());
        }
        if let Some(conclusion) = &self.conclusion {
            experiment.conclusion = Some(conclusion.clone());
        }
        match self.increment {
            Some(Arm::Control) => {
                experiment.control_requests = experiment.control_requests.saturating_add(1)
            }
            Some(Arm::Treatment) => {
                experiment.treatment_requests = experiment.treatment_requests.saturating_add(1)
            }
            None => {}
        }
    }
}

fn check_condition(experiment: &Experiment, expected: Option<ExperimentStatus>) -> Result<()> {
    match expected {
        Some(status) if experiment.status != status => Err(Error::ConditionFailed {
            experiment_id: experiment.experiment_id.to_string(),
            expected: status.to_string(),
            actual: experiment.status.to_string(),
        }),
        _ => Ok(()),
    }
}

fn not_found(id: &ExperimentId) -> Error {
    Error::ExperimentNotFound {
        experiment_id: id.to_string(),
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::StoreUnavailable("experiment store lock poisoned".into())
}

/// Key-value storage for experiments.
pub trait ExperimentStore: Send + Sync {
    fn get(&self, id: &ExperimentId) -> Result<Experiment>;

    /// Write the whole item unconditionally.
    fn put(&self, experiment: &Experiment) -> Result<()>;

    /// Apply `update` atomically. When `expected_status` is given and the
    /// stored status differs, nothing changes and
    /// [`Error::ConditionFailed`] is returned. Returns the item after the
    /// update.
    fn update(
        &self,
        id: &ExperimentId,
        update: &ExperimentUpdate,
        expected_status: Option<ExperimentStatus>,
    ) -> Result<Experiment>;

    /// Every experiment, optionally filtered by status. Unordered.
    fn scan(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>>;
}

impl<T: ExperimentStore + ?Sized> ExperimentStore for Arc<T> {
    fn get(&self, id: &ExperimentId) -> Result<Experiment> {
        (**self).get(id)
    }

    fn put(&self, experiment: &Experiment) -> Result<()> {
        (**self).put(experiment)
    }

    fn update(
        &self,
        id: &ExperimentId,
        update: &ExperimentUpdate,
        expected_status: Option<ExperimentStatus>,
    ) -> Result<Experiment> {
        (**self).update(id, update, expected_status)
    }

    fn scan(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>> {
        (**self).scan(status)
    }
}

/// Process-local store with one lock per experiment.
///
/// The outer map lock is held only to find or insert an entry; updates to
/// different experiments proceed in parallel.
#[derive(Debug, Default)]
pub struct MemoryExperimentStore {
    items: RwLock<HashMap<ExperimentId, Arc<Mutex<Experiment>>>>,
}

impl MemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, id: &ExperimentId) -> Result<Arc<Mutex<Experiment>>> {
        let items = self.items.read().map_err(poisoned)?;
        items.get(id).cloned().ok_or_else(|| not_found(id))
    }
}

impl ExperimentStore for MemoryExperimentStore {
    fn get(&self, id: &ExperimentId) -> Result<Experiment> {
        let cell = self.cell(id)?;
        let experiment = cell.lock().map_err(poisoned)?;
        Ok(experiment.clone())
    }

    fn put(&self, experiment: &Experiment) -> Result<()> {
        let mut items = self.items.write().map_err(poisoned)?;
        match items.get(&experiment.experiment_id) {
            Some(cell) => *cell.lock().map_err(poisoned)? = experiment.clone(),
            None => {
                items.insert(
                    experiment.experiment_id.clone(),
                    Arc::new(Mutex::new(experiment.clone())),
                );
            }
        }
        Ok(())
    }

    fn update(
        &self,
        id: &ExperimentId,
        update: &ExperimentUpdate,
        expected_status: Option<ExperimentStatus>,
    ) -> Result<Experiment> {
        let cell = self.cell(id)?;
        let mut experiment = cell.lock().map_err(poisoned)?;
        check_condition(&experiment, expected_status)?;
        update.apply_to(&mut experiment);
        Ok(experiment.clone())
    }

    fn scan(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>> {
        let cells: Vec<_> = self
            .items
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect();
        let mut out = Vec::with_capacity(cells.len());
        for cell in cells {
            let experiment = cell.lock().map_err(poisoned)?;
            if status.map_or(true, |s| experiment.status == s) {
                out.push(experiment.clone());
            }
        }
        Ok(out)
    }
}

/// Exclusive advisory lock on the sidecar lock file, released on drop.
///
/// Blocks until every other holder, in this or another process, releases it.
#[derive(Debug)]
struct StoreLock {
    file: File,
}

impl StoreLock {
    fn acquire(path: &Path) -> Result<Self> {
        let unavailable = |e: std::io::Error| {
            Error::StoreUnavailable(format!("cannot lock {}: {}", path.display(), e))
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(unavailable)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            loop {
                let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
                if result == 0 {
                    break;
                }
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    return Err(unavailable(err));
                }
            }
        }

        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file stays: removing it would let a waiter lock an
        // unlinked inode while a newcomer locks a fresh file.
    }
}

/// Single JSON file keyed by experiment ID.
///
/// Every operation holds the in-process mutex and then an exclusive
/// `flock` on a sidecar lock file, so read-modify-write cycles from
/// separate CLI processes never interleave. Writes go through a
/// per-process temp file and rename, so readers never observe a torn
/// write.
#[derive(Debug)]
pub struct JsonExperimentStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock: Mutex<()>,
}

impl JsonExperimentStore {
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self::at_path(data_dir.join(EXPERIMENTS_DIR).join(EXPERIMENTS_FILE))
    }

    pub fn at_path(path: PathBuf) -> Self {
        let lock_path = path.with_file_name(format!(
            "{}.lock",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| EXPERIMENTS_FILE.to_string())
        ));
        Self {
            path,
            lock_path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn exclusive<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().map_err(poisoned)?;
        let _file_lock = StoreLock::acquire(&self.lock_path)?;
        f()
    }

    fn read_all(&self) -> Result<BTreeMap<ExperimentId, Experiment>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(Error::StoreUnavailable(format!(
                    "cannot read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| Error::CorruptRecord(format!("{}: {}", self.path.display(), e)))
    }

    fn write_all(&self, items: &BTreeMap<ExperimentId, Experiment>) -> Result<()> {
        let unavailable = |e: std::io::Error| {
            Error::StoreUnavailable(format!("cannot write {}: {}", self.path.display(), e))
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let content = serde_json::to_string_pretty(items)?;
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, content).map_err(unavailable)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(unavailable(e));
        }
        debug!(path = %self.path.display(), count = items.len(), "wrote experiments");
        Ok(())
    }
}

impl ExperimentStore for JsonExperimentStore {
    fn get(&self, id: &ExperimentId) -> Result<Experiment> {
        self.exclusive(|| self.read_all()?.remove(id).ok_or_else(|| not_found(id)))
    }

    fn put(&self, experiment: &Experiment) -> Result<()> {
        self.exclusive(|| {
            let mut items = self.read_all()?;
            items.insert(experiment.experiment_id.clone(), experiment.clone());
            self.write_all(&items)
        })
    }

    fn update(
        &self,
        id: &ExperimentId,
        update: &ExperimentUpdate,
        expected_status: Option<ExperimentStatus>,
    ) -> Result<Experiment> {
        self.exclusive(|| {
            let mut items = self.read_all()?;
            let experiment = items.get_mut(id).ok_or_else(|| not_found(id))?;
            check_condition(experiment, expected_status)?;
            update.apply_to(experiment);
            let updated = experiment.clone();
            self.write_all(&items)?;
            Ok(updated)
        })
    }

    fn scan(&self, status: Option<ExperimentStatus>) -> Result<Vec<Experiment>> {
        self.exclusive(|| {
            Ok(self
                .read_all()?
                .into_values()
                .filter(|e| status.map_or(true, |s| e.status == s))
                .collect())
        })
    }
}
