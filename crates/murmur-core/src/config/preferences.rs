//! Persisted listening environment
//!
//! The user's last soundscape, frequency, levels and subliminal choices.
//! Stored settings are kept as chosen; what the current tier may play is
//! decided each time they are loaded, so an upgrade later unlocks the
//! original choice again.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::io::{load_config, save_config};
use super::paths::default_preferences_path;
use crate::catalog::{is_frequency_allowed, is_soundscape_allowed, Tier, DEFAULT_FREQUENCY};
use crate::control::{MixPreset, PresetKind, SubliminalIntensity, SubliminalMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    pub soundscape_id: Option<String>,
    pub frequency_id: Option<String>,
    pub subliminal_on: bool,
    /// Background level the user chose; `None` follows the preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_volume: Option<f32>,
    /// Frequency level the user chose; `None` follows the preset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_volume: Option<f32>,
    pub subliminal_mode: SubliminalMode,
    pub subliminal_intensity: SubliminalIntensity,
    pub preset: PresetKind,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            soundscape_id: None,
            frequency_id: Some(DEFAULT_FREQUENCY.to_string()),
            subliminal_on: false,
            background_volume: None,
            frequency_volume: None,
            subliminal_mode: SubliminalMode::default(),
            subliminal_intensity: SubliminalIntensity::default(),
            preset: PresetKind::default(),
        }
    }
}

impl EnvironmentSettings {
    /// The settings `tier` may actually play
    ///
    /// A locked frequency falls back to the default frequency; a locked
    /// soundscape is dropped. Out-of-range levels are pulled into [0, 1].
    pub fn for_tier(mut self, tier: Tier) -> Self {
        if let Some(id) = self.frequency_id.as_deref() {
            if !is_frequency_allowed(id, tier) {
                log::info!("Frequency '{}' needs a higher tier than {}; using {}", id, tier, DEFAULT_FREQUENCY);
                self.frequency_id = Some(DEFAULT_FREQUENCY.to_string());
            }
        }
        if let Some(id) = self.soundscape_id.as_deref() {
            if !is_soundscape_allowed(id, tier) {
                log::info!("Soundscape '{}' needs a higher tier than {}; disabled", id, tier);
                self.soundscape_id = None;
            }
        }
        self.background_volume = self.background_volume.map(sanitize_level);
        self.frequency_volume = self.frequency_volume.map(sanitize_level);
        self
    }

    /// Background level to play under `preset`
    pub fn background_level(&self, preset: &MixPreset) -> f32 {
        self.background_volume.unwrap_or(preset.background_volume)
    }

    /// Frequency level to play under `preset`
    pub fn frequency_level(&self, preset: &MixPreset) -> f32 {
        self.frequency_volume.unwrap_or(preset.frequency_volume)
    }
}

fn sanitize_level(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Where environment settings live between runs
pub trait PreferenceStore {
    /// Settings exactly as last saved (defaults if none)
    fn load_stored(&self) -> EnvironmentSettings;

    fn save(&self, settings: &EnvironmentSettings) -> Result<()>;

    /// Settings as `tier` may play them; the stored copy is not rewritten
    fn load(&self, tier: Tier) -> EnvironmentSettings {
        self.load_stored().for_tier(tier)
    }
}

/// Save without letting a persistence failure reach the caller
pub fn save_best_effort(store: &dyn PreferenceStore, settings: &EnvironmentSettings) {
    if let Err(e) = store.save(settings) {
        log::warn!("Failed to save preferences: {:#}", e);
    }
}

/// Settings in a YAML file
pub struct YamlPreferenceStore {
    path: PathBuf,
}

impl YamlPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for YamlPreferenceStore {
    fn default() -> Self {
        Self::new(default_preferences_path())
    }
}

impl PreferenceStore for YamlPreferenceStore {
    fn load_stored(&self) -> EnvironmentSettings {
        load_config(&self.path)
    }

    fn save(&self, settings: &EnvironmentSettings) -> Result<()> {
        save_config(settings, &self.path)
    }
}

/// In-process store for tests and embedders without a filesystem
#[derive(Default)]
pub struct MemoryPreferenceStore {
    stored: Mutex<Option<EnvironmentSettings>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: EnvironmentSettings) -> Self {
        Self {
            stored: Mutex::new(Some(settings)),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load_stored(&self) -> EnvironmentSettings {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }

    fn save(&self, settings: &EnvironmentSettings) -> Result<()> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elite_choice() -> EnvironmentSettings {
        EnvironmentSettings {
            soundscape_id: Some("ocean".into()),
            frequency_id: Some("963hz".into()),
            subliminal_on: true,
            background_volume: Some(0.35),
            frequency_volume: Some(0.1),
            subliminal_mode: SubliminalMode::Rapid,
            subliminal_intensity: SubliminalIntensity::Medium,
            preset: PresetKind::Sleep,
        }
    }

    #[test]
    fn test_defaults() {
        let s = EnvironmentSettings::default();
        assert_eq!(s.frequency_id.as_deref(), Some("417hz"));
        assert_eq!(s.background_volume, None);
        assert_eq!(s.background_level(&MixPreset::OPTIMAL), 0.20);
        assert_eq!(s.frequency_level(&MixPreset::SLEEP), 0.42);
        assert!(!s.subliminal_on);
    }

    #[test]
    fn test_yaml_round_trip_with_downgrade() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlPreferenceStore::new(dir.path().join("preferences.yaml"));
        store.save(&elite_choice()).unwrap();

        let free = store.load(Tier::Free);
        assert_eq!(free.frequency_id.as_deref(), Some("417hz"));
        assert_eq!(free.soundscape_id.as_deref(), Some("ocean"));
        assert_eq!(free.subliminal_mode, SubliminalMode::Rapid);

        let elite = store.load(Tier::Elite);
        assert_eq!(elite, elite_choice());

        // The downgrade was not written back
        assert_eq!(store.load_stored().frequency_id.as_deref(), Some("963hz"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.yaml");
        std::fs::write(&path, "soundscape_id: rain\nsubliminal_mode: rapid\n").unwrap();

        let loaded = YamlPreferenceStore::new(&path).load(Tier::Free);
        assert_eq!(loaded.soundscape_id.as_deref(), Some("rain"));
        assert_eq!(loaded.subliminal_mode, SubliminalMode::Rapid);
        assert_eq!(loaded.frequency_id.as_deref(), Some("417hz"));
        assert_eq!(loaded.preset, PresetKind::Optimal);
        assert_eq!(loaded.background_volume, None);
    }

    #[test]
    fn test_unset_levels_follow_preset_and_stay_unset() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlPreferenceStore::new(dir.path().join("preferences.yaml"));
        let sleep = EnvironmentSettings {
            preset: PresetKind::Sleep,
            ..Default::default()
        };
        store.save(&sleep).unwrap();

        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(!written.contains("background_volume"));

        let loaded = store.load(Tier::Free);
        assert_eq!(loaded.background_level(&loaded.preset.preset()), 0.30);
        assert_eq!(loaded.frequency_level(&loaded.preset.preset()), 0.42);
    }

    #[test]
    fn test_numeric_level_in_file_is_an_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.yaml");
        std::fs::write(&path, "preset: sleep\nbackground_volume: 0.1\n").unwrap();

        let loaded = YamlPreferenceStore::new(&path).load(Tier::Free);
        assert_eq!(loaded.background_level(&MixPreset::SLEEP), 0.1);
        assert_eq!(loaded.frequency_level(&MixPreset::SLEEP), 0.42);
    }

    #[test]
    fn test_levels_sanitized_on_load() {
        let store = MemoryPreferenceStore::with_settings(EnvironmentSettings {
            background_volume: Some(4.0),
            frequency_volume: Some(f32::NAN),
            ..Default::default()
        });
        let loaded = store.load(Tier::Pro);
        assert_eq!(loaded.background_volume, Some(1.0));
        assert_eq!(loaded.frequency_volume, Some(0.0));
    }

    #[test]
    fn test_best_effort_save_swallows_errors() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the write fail
        let path = dir.path().join("preferences.yaml");
        std::fs::create_dir(&path).unwrap();
        let store = YamlPreferenceStore::new(&path);

        assert!(store.save(&EnvironmentSettings::default()).is_err());
        save_best_effort(&store, &EnvironmentSettings::default());
    }
}
