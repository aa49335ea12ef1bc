//! Configuration and persisted preferences
//!
//! - Generic YAML config loading/saving
//! - Standard file locations
//! - The user's listening environment and its tier-aware store

mod io;
mod paths;
mod preferences;

pub use io::{load_config, save_config};
pub use paths::{config_root, default_config_path, default_preferences_path};
pub use preferences::{
    save_best_effort, EnvironmentSettings, MemoryPreferenceStore, PreferenceStore,
    YamlPreferenceStore,
};
