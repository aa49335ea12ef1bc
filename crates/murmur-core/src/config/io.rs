//! YAML configuration I/O
//!
//! Works with any serializable configuration type; a missing or unreadable
//! file yields the type's default.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

/// Read a YAML file into `T`
///
/// A missing file is normal on first run and yields `T::default()`. An
/// unreadable or malformed file is logged and also yields the default.
///
/// ```ignore
/// let prefs: EnvironmentSettings = load_config(&default_preferences_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No config at {:?}; starting from defaults", path);
            return T::default();
        }
        Err(e) => {
            log::warn!("Could not read {:?} ({}); starting from defaults", path, e);
            return T::default();
        }
    };

    serde_yaml::from_str(&contents).unwrap_or_else(|e| {
        log::warn!("Ignoring malformed {:?}: {}", path, e);
        T::default()
    })
}

/// Write `config` as YAML, creating missing parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
    log::debug!("Saved {:?}", path);
    Ok(())
}
