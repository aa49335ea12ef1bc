//! Command-line argument parsing

use std::path::PathBuf;

use clap::Parser;
use murmur_core::catalog::Tier;
use murmur_core::control::{PresetKind, SubliminalIntensity, SubliminalMode};

#[derive(Parser, Debug)]
#[command(name = "murmur-player")]
#[command(about = "Play a recorded affirmation over a soundscape and frequency tone", long_about = None)]
pub struct Args {
    /// Recorded affirmation (wav, flac, mp3, m4a, ogg)
    #[arg(long, value_name = "FILE", required_unless_present = "list_devices")]
    pub recording: Option<PathBuf>,

    /// Mix preset: optimal or sleep
    #[arg(long, value_name = "PRESET")]
    pub preset: Option<PresetKind>,

    /// Background soundscape id (e.g. rain, ocean); "none" disables it
    #[arg(long, value_name = "ID")]
    pub soundscape: Option<String>,

    /// Frequency tone id (e.g. 417hz, 7.83hz); "none" disables it
    #[arg(long, value_name = "ID")]
    pub frequency: Option<String>,

    /// Subscription tier used for gating
    #[arg(long, value_name = "TIER")]
    pub tier: Option<Tier>,

    /// Subliminal shaping: echo or rapid
    #[arg(long, value_name = "MODE")]
    pub mode: Option<SubliminalMode>,

    /// Subliminal level: off, low, medium or high
    #[arg(long, value_name = "LEVEL")]
    pub intensity: Option<SubliminalIntensity>,

    /// Render the whole session to a WAV file instead of playing it
    #[arg(long, value_name = "WAV")]
    pub render: Option<PathBuf>,

    /// Player config file (default: ~/.config/murmur/player.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

/// `"none"` clears a selection
pub fn parse_selection(value: &str) -> Option<String> {
    match value.trim() {
        "" => None,
        v if v.eq_ignore_ascii_case("none") => None,
        v => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_flags() {
        let args = Args::try_parse_from([
            "murmur-player",
            "--recording",
            "me.wav",
            "--preset",
            "Sleep",
            "--tier",
            "elite",
            "--mode",
            "rapid",
            "--intensity",
            "low",
        ])
        .unwrap();
        assert_eq!(args.preset, Some(PresetKind::Sleep));
        assert_eq!(args.tier, Some(Tier::Elite));
        assert_eq!(args.mode, Some(SubliminalMode::Rapid));
        assert_eq!(args.intensity, Some(SubliminalIntensity::Low));
    }

    #[test]
    fn test_recording_required_unless_listing() {
        assert!(Args::try_parse_from(["murmur-player"]).is_err());
        assert!(Args::try_parse_from(["murmur-player", "--list-devices"]).is_ok());
        assert!(Args::try_parse_from(["murmur-player", "--recording", "a.wav", "--preset", "party"]).is_err());
    }

    #[test]
    fn test_none_clears() {
        assert_eq!(parse_selection("none"), None);
        assert_eq!(parse_selection("rain"), Some("rain".to_string()));
    }
}
