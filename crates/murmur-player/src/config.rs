//! Player configuration
//!
//! Stored as YAML next to the preferences.
//! Default location: ~/.config/murmur/player.yaml

use std::path::{Path, PathBuf};

use murmur_core::audio::OutputConfig;
use murmur_core::catalog::Tier;
use murmur_core::config::default_config_path;
use murmur_core::control::PresetKind;
use serde::{Deserialize, Serialize};

/// Extensions tried, in order, when looking for a soundscape file
const SOUNDSCAPE_EXTENSIONS: &[&str] = &["ogg", "flac", "wav", "mp3", "m4a"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub output: OutputConfig,
    /// Preset used when neither the command line nor preferences pick one
    pub default_preset: PresetKind,
    /// Tier assumed when none is given on the command line
    pub tier: Tier,
    /// Where `--render` puts relative file names
    pub export_dir: PathBuf,
    /// Directory holding `{id}.{ext}` soundscape files
    pub soundscape_dir: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let music = dirs::audio_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            output: OutputConfig::default(),
            default_preset: PresetKind::Optimal,
            tier: Tier::Free,
            export_dir: music.join("murmur"),
            soundscape_dir: murmur_core::config::config_root().join("soundscapes"),
        }
    }
}

impl PlayerConfig {
    /// File holding the soundscape `id`, if there is one
    pub fn soundscape_file(&self, id: &str) -> Option<PathBuf> {
        SOUNDSCAPE_EXTENSIONS
            .iter()
            .map(|ext| self.soundscape_dir.join(format!("{}.{}", id, ext)))
            .find(|path| path.is_file())
    }

    /// Resolve a render target against the export directory
    pub fn export_path(&self, target: &Path) -> PathBuf {
        if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.export_dir.join(target)
        }
    }
}

pub fn default_player_config_path() -> PathBuf {
    default_config_path("player.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::config::{load_config, save_config};

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.yaml");
        let config = PlayerConfig {
            output: OutputConfig::offline().with_sample_rate(44100),
            default_preset: PresetKind::Sleep,
            tier: Tier::Pro,
            export_dir: dir.path().join("exports"),
            soundscape_dir: dir.path().join("soundscapes"),
        };

        save_config(&config, &path).unwrap();
        assert_eq!(load_config::<PlayerConfig>(&path), config);
    }

    #[test]
    fn test_soundscape_lookup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rain.wav"), b"RIFF").unwrap();
        let config = PlayerConfig {
            soundscape_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        assert_eq!(config.soundscape_file("rain"), Some(dir.path().join("rain.wav")));
        assert_eq!(config.soundscape_file("ocean"), None);
    }

    #[test]
    fn test_export_path() {
        let config = PlayerConfig {
            export_dir: PathBuf::from("/tmp/murmur"),
            ..Default::default()
        };
        assert_eq!(config.export_path(Path::new("a.wav")), PathBuf::from("/tmp/murmur/a.wav"));
        assert_eq!(config.export_path(Path::new("/x/b.wav")), PathBuf::from("/x/b.wav"));
    }
}
