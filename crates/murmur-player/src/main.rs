//! Murmur Player - play a recorded affirmation session from the terminal
//!
//! Decodes the recording, opens a session on the configured output (or
//! renders it to WAV with `--render`), plays every pass of the recording
//! and saves the chosen environment for next time.

mod cli;
mod config;

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use murmur_core::audio::get_output_devices;
use murmur_core::buffer::{BufferKey, BufferStore, SharedBuffer};
use murmur_core::catalog::Tier;
use murmur_core::config::{
    load_config, save_best_effort, EnvironmentSettings, PreferenceStore, YamlPreferenceStore,
};
use murmur_core::control::{
    AudioGraphManager, EngineError, PlaybackSession, SessionAssets, SessionEvent,
    SubliminalIntensity,
};
use murmur_core::export::{render_to_wav, ExportOptions};

use cli::{parse_selection, Args};
use config::{default_player_config_path, PlayerConfig};

/// How often the session is polled for events
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Kept playing after the last pass so the reverb can ring out
const TAIL: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    if args.list_devices {
        return list_devices();
    }

    let config_path = args.config.clone().unwrap_or_else(default_player_config_path);
    let config: PlayerConfig = load_config(&config_path);
    let tier = args.tier.unwrap_or(config.tier);

    let prefs = YamlPreferenceStore::default();
    let stored = prefs.load_stored();
    let settings = apply_overrides(stored.clone(), &args, &config);

    let recording = args
        .recording
        .as_deref()
        .context("--recording is required")?;
    let bytes = std::fs::read(recording)
        .with_context(|| format!("Failed to read recording: {:?}", recording))?;
    let extension = extension_of(recording);

    log::info!("murmur-player starting (tier {}, preset {})", tier, settings.preset);

    match args.render.as_deref() {
        Some(target) => render(&config, &settings, tier, bytes, extension.as_deref(), target)?,
        None => play(&config, &settings, tier, bytes, extension.as_deref(), &prefs)?,
    }

    // Live playback saves from the session itself
    if args.render.is_some() && settings != stored {
        save_best_effort(&prefs, &settings);
    }
    Ok(())
}

/// Error for the terminal: the friendly message plus the detail
fn user_error(e: EngineError) -> anyhow::Error {
    anyhow::anyhow!("{} ({})", e.user_message(), e)
}

fn list_devices() -> Result<()> {
    let devices = get_output_devices().context("Failed to enumerate output devices")?;
    if devices.is_empty() {
        println!("No output devices found");
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

/// Command-line choices win over stored preferences
fn apply_overrides(mut settings: EnvironmentSettings, args: &Args, config: &PlayerConfig) -> EnvironmentSettings {
    if let Some(preset) = args.preset {
        settings.preset = preset;
    } else if settings == EnvironmentSettings::default() {
        settings.preset = config.default_preset;
    }
    if let Some(soundscape) = args.soundscape.as_deref() {
        settings.soundscape_id = parse_selection(soundscape);
    }
    if let Some(frequency) = args.frequency.as_deref() {
        settings.frequency_id = parse_selection(frequency);
    }
    if let Some(mode) = args.mode {
        settings.subliminal_mode = mode;
    }
    if let Some(intensity) = args.intensity {
        settings.subliminal_intensity = intensity;
        settings.subliminal_on = intensity != SubliminalIntensity::Off;
    }
    settings
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Decode the selected soundscape into `store`, if its file exists
fn load_soundscape(store: &mut BufferStore, config: &PlayerConfig, id: &str) -> Option<SharedBuffer> {
    let Some(path) = config.soundscape_file(id) else {
        log::warn!("No file for soundscape '{}' in {:?}", id, config.soundscape_dir);
        return None;
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Failed to read {:?}: {}", path, e);
            return None;
        }
    };
    let extension = extension_of(&path);
    match store.load(BufferKey::Soundscape(id.to_string()), bytes, extension.as_deref()) {
        Ok(buffer) => Some(buffer),
        Err(e) => {
            log::warn!("Soundscape '{}' could not be decoded: {}", id, e);
            None
        }
    }
}

fn render(
    config: &PlayerConfig,
    settings: &EnvironmentSettings,
    tier: Tier,
    bytes: Vec<u8>,
    extension: Option<&str>,
    target: &Path,
) -> Result<()> {
    let mut store = BufferStore::new().context("Failed to start decode service")?;
    let voice = store
        .load(BufferKey::Recording, bytes, extension)
        .map_err(|e| user_error(e.into()))?;
    let soundscape = settings
        .soundscape_id
        .as_deref()
        .and_then(|id| load_soundscape(&mut store, config, id));

    let options = ExportOptions {
        preset: settings.preset,
        settings: settings.clone(),
        subliminal: settings
            .subliminal_on
            .then_some((settings.subliminal_mode, settings.subliminal_intensity)),
        sample_rate: config.output.target_sample_rate(),
        ..Default::default()
    };

    let path = config.export_path(target);
    let summary = render_to_wav(&path, voice, soundscape, &options, &tier)?;
    println!(
        "Rendered {:.1}s ({} passes) to {}",
        summary.duration_seconds(),
        summary.vocal_loops,
        path.display()
    );
    Ok(())
}

fn play(
    config: &PlayerConfig,
    settings: &EnvironmentSettings,
    tier: Tier,
    bytes: Vec<u8>,
    extension: Option<&str>,
    prefs: &dyn PreferenceStore,
) -> Result<()> {
    let mut manager = AudioGraphManager::new(config.output.clone())?;
    let voice = manager
        .store_mut()
        .load(BufferKey::Recording, bytes, extension)
        .map_err(|e| user_error(e.into()))?;
    if let Some(id) = settings.soundscape_id.as_deref() {
        load_soundscape(manager.store_mut(), config, id);
    }

    let session = manager
        .open(settings.preset, settings, SessionAssets::voice_only(voice), &tier)
        .map_err(user_error)?;

    if settings.subliminal_on {
        session.start_subliminal(settings.subliminal_mode, settings.subliminal_intensity)?;
    }

    if let Some(latency) = session.output_latency_ms() {
        log::info!("Output latency ~{:.1}ms", latency);
    }
    session.subscribe(|event| match event {
        SessionEvent::VocalLoopCompleted { loops } => println!("Pass {} complete", loops),
        SessionEvent::OutputLost { reason } => eprintln!("Audio output lost: {}", reason),
        _ => {}
    });

    let result = run_until_finished(&session);
    let final_settings = session.settings();
    manager.close(&session);

    save_best_effort(prefs, &final_settings);
    result
}

fn run_until_finished(session: &PlaybackSession) -> Result<()> {
    loop {
        let events = session
            .poll_events()
            .map_err(user_error)?;
        if events.contains(&SessionEvent::VocalFinished) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    println!("Session complete");
    thread::sleep(TAIL);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::control::{PresetKind, SubliminalMode};

    fn args(flags: &[&str]) -> Args {
        let mut argv = vec!["murmur-player", "--recording", "me.wav"];
        argv.extend_from_slice(flags);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_stored_settings() {
        let stored = EnvironmentSettings {
            soundscape_id: Some("rain".into()),
            ..Default::default()
        };
        let settings = apply_overrides(
            stored,
            &args(&["--soundscape", "none", "--frequency", "963hz", "--intensity", "medium", "--mode", "rapid"]),
            &PlayerConfig::default(),
        );

        assert_eq!(settings.soundscape_id, None);
        assert_eq!(settings.frequency_id.as_deref(), Some("963hz"));
        assert!(settings.subliminal_on);
        assert_eq!(settings.subliminal_mode, SubliminalMode::Rapid);
    }

    #[test]
    fn test_config_preset_used_for_fresh_install() {
        let config = PlayerConfig {
            default_preset: PresetKind::Sleep,
            ..Default::default()
        };
        let fresh = apply_overrides(EnvironmentSettings::default(), &args(&[]), &config);
        assert_eq!(fresh.preset, PresetKind::Sleep);

        let explicit = apply_overrides(EnvironmentSettings::default(), &args(&["--preset", "optimal"]), &config);
        assert_eq!(explicit.preset, PresetKind::Optimal);
    }

    #[test]
    fn test_extension_lowercased() {
        assert_eq!(extension_of(Path::new("Me.WAV")).as_deref(), Some("wav"));
        assert_eq!(extension_of(Path::new("recording")), None);
    }
}
