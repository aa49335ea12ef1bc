//! Standard locations of Murmur's files

use std::path::PathBuf;

/// Directory holding Murmur's configuration
///
/// Returns: `{config_dir}/murmur` (e.g. `~/.config/murmur` on Linux)
pub fn config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("murmur")
}

/// Get the default path of a file in the config directory
pub fn default_config_path(filename: &str) -> PathBuf {
    config_root().join(filename)
}

/// Where the listening environment is persisted
pub fn default_preferences_path() -> PathBuf {
    default_config_path("preferences.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_murmur() {
        assert!(config_root().ends_with("murmur"));
        let prefs = default_preferences_path();
        assert!(prefs.ends_with("preferences.yaml"));
        assert!(prefs.parent().is_some_and(|p| p.ends_with("murmur")));
    }
}
