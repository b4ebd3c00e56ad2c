//! Config resolution: CLI → env → XDG → defaults.
//!
//! A config file that is absent everywhere is not an error; the built-in
//! defaults are used. A file that exists but cannot be parsed or fails
//! validation is an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};
use xp_common::{Error, Result};

use crate::engine::EngineConfig;
use crate::validate::validate_engine;
use crate::CONFIG_FILE_NAME;

const ENV_CONFIG: &str = "XP_CONFIG";
const ENV_DATA_DIR: &str = "XP_DATA_DIR";
const DIR_NAME: &str = "xp";

/// Where configuration and data were resolved from.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Config file actually loaded, if any.
    pub config_file: Option<PathBuf>,
    /// Root directory for file-backed stores.
    pub data_dir: PathBuf,
    /// True when no config file was found and defaults are in effect.
    pub using_defaults: bool,
}

/// A loaded, validated config plus its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: EngineConfig,
    pub paths: ConfigPaths,
}

/// Load and validate a config file.
pub fn load_config_file(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let config: EngineConfig = serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid JSON in {}: {}", path.display(), e)))?;

    let validation = validate_engine(&config);
    for warning in &validation.warnings {
        warn!(path = %path.display(), %warning, "config warning");
    }
    if !validation.is_valid() {
        return Err(Error::Config(format!(
            "{}: {}",
            path.display(),
            validation.summary()
        )));
    }
    Ok(config)
}

/// Resolve configuration and data directory.
///
/// Config file order: `explicit_config` → `$XP_CONFIG` →
/// `$XDG_CONFIG_HOME/xp/engine.json` → platform config dir → defaults.
/// An explicit path must exist.
///
/// Data directory order: `data_dir_override` → `$XP_DATA_DIR` →
/// `storage.data_dir` from the config → `$XDG_DATA_HOME/xp` → platform data
/// dir → `./.xp`.
pub fn resolve_config(
    explicit_config: Option<&Path>,
    data_dir_override: Option<&Path>,
) -> Result<ResolvedConfig> {
    let config_file = match explicit_config {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path.to_path_buf())
        }
        None => discover_config_file(),
    };

    let (config, using_defaults) = match &config_file {
        Some(path) => {
            debug!(path = %path.display(), "loading engine config");
            (load_config_file(path)?, false)
        }
        None => {
            debug!("no engine config found; using defaults");
            (EngineConfig::default(), true)
        }
    };

    let data_dir = resolve_data_dir(data_dir_override, &config);

    Ok(ResolvedConfig {
        config,
        paths: ConfigPaths {
            config_file,
            data_dir,
            using_defaults,
        },
    })
}

fn discover_config_file() -> Option<PathBuf> {
    // 1) Explicit override
    if let Ok(path) = std::env::var(ENV_CONFIG) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        warn!(path = %path.display(), "{} points to a missing file; ignoring", ENV_CONFIG);
    }

    // 2) XDG_CONFIG_HOME
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg).join(DIR_NAME).join(CONFIG_FILE_NAME);
        if path.exists() {
            return Some(path);
        }
    }

    // 3) Platform default
    dirs::config_dir()
        .map(|base| base.join(DIR_NAME).join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

fn resolve_data_dir(data_dir_override: Option<&Path>, config: &EngineConfig) -> PathBuf {
    if let Some(dir) = data_dir_override {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &config.storage.data_dir {
        return dir.clone();
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg).join(DIR_NAME);
    }
    dirs::data_dir()
        .map(|base| base.join(DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".xp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.json");
        let err = resolve_config(Some(&missing), Some(tmp.path())).unwrap_err();
        assert_eq!(err.code(), 50);
    }

    #[test]
    fn explicit_file_is_loaded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("engine.json");
        fs::write(&path, r#"{"aggregation": {"default_window_days": 14}}"#).unwrap();

        let resolved = resolve_config(Some(&path), Some(tmp.path())).unwrap();
        assert!(!resolved.paths.using_defaults);
        assert_eq!(resolved.config.aggregation.default_window_days, 14);
        assert_eq!(resolved.paths.data_dir, tmp.path());
    }

    #[test]
    fn malformed_json_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("engine.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn invalid_values_are_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("engine.json");
        fs::write(&path, r#"{"significance": {"min_samples_per_arm": 5}}"#).unwrap();
        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("min_samples_per_arm"));
    }

    #[test]
    fn override_beats_config_data_dir() {
        let mut cfg = EngineConfig::default();
        cfg.storage.data_dir = Some(PathBuf::from("/srv/xp"));
        let override_dir = PathBuf::from("/tmp/override");
        assert_eq!(resolve_data_dir(Some(&override_dir), &cfg), override_dir);
    }
}
