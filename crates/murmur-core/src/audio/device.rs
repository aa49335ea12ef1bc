//! Output device discovery across cpal hosts
//!
//! Sessions normally play on the system default output. A device can be
//! pinned by name (and optionally host) in the player configuration; these
//! helpers resolve that choice back to a cpal device.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Rates offered to the user when a device reports a continuous range
const PROBE_RATES: [u32; 4] = [44100, 48000, 88200, 96000];

/// Label shown for a cpal host
fn host_label(id: HostId) -> String {
    let raw = format!("{:?}", id);
    match raw.as_str() {
        "Alsa" | "Jack" | "Wasapi" => raw.to_ascii_uppercase(),
        _ => raw,
    }
}

fn open_hosts() -> impl Iterator<Item = (String, Host)> {
    cpal::available_hosts().into_iter().filter_map(|id| match cpal::host_from_id(id) {
        Ok(host) => Some((host_label(id), host)),
        Err(e) => {
            log::debug!("Skipping audio host {:?}: {}", id, e);
            None
        }
    })
}

fn device_named(host: &Host, name: &str) -> Option<cpal::Device> {
    host.output_devices()
        .ok()?
        .find(|device| device.name().ok().as_deref() == Some(name))
}

/// One playable output
#[derive(Debug, Clone)]
pub struct OutputDevice {
    pub id: DeviceId,
    pub name: String,
    pub host: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let marker = if self.is_default { " *" } else { "" };
        write!(f, "{} / {}{}", self.host, self.name, marker)
    }
}

/// Probe a device; `None` when it offers no usable output configuration
fn describe(device: &cpal::Device, host: &str, default_name: Option<&str>) -> Option<OutputDevice> {
    let name = device.name().ok()?;
    let ranges: Vec<_> = device.supported_output_configs().ok()?.collect();
    if ranges.is_empty() {
        return None;
    }

    let max_channels = ranges.iter().map(|r| r.channels()).max().unwrap_or(0);
    let sample_rates: Vec<u32> = PROBE_RATES
        .into_iter()
        .filter(|rate| {
            ranges
                .iter()
                .any(|r| r.min_sample_rate().0 <= *rate && *rate <= r.max_sample_rate().0)
        })
        .collect();

    Some(OutputDevice {
        id: DeviceId::with_host(&name, host),
        is_default: default_name == Some(name.as_str()),
        host: host.to_string(),
        name,
        sample_rates,
        max_channels,
    })
}

/// Every output device the system exposes, defaults listed first
pub fn get_output_devices() -> AudioResult<Vec<OutputDevice>> {
    let mut found = Vec::new();

    for (label, host) in open_hosts() {
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        match host.output_devices() {
            Ok(devices) => found.extend(
                devices.filter_map(|device| describe(&device, &label, default_name.as_deref())),
            ),
            Err(e) => log::debug!("{} would not list its outputs: {}", label, e),
        }
    }

    if found.is_empty() {
        return Err(AudioError::NoDevices);
    }

    found.sort_by(|a, b| {
        (!a.is_default, &a.host, &a.name).cmp(&(!b.is_default, &b.host, &b.name))
    });
    log::info!("{} output device(s) available", found.len());
    Ok(found)
}

/// Resolve a configured device, looking through every host if none was named
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    let mut hosts = open_hosts();
    let device = match id.host.as_deref() {
        Some(wanted) => hosts
            .find(|(label, _)| label == wanted)
            .and_then(|(_, host)| device_named(&host, &id.name)),
        None => hosts.find_map(|(_, host)| device_named(&host, &id.name)),
    };
    device.ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// The system default output
pub fn get_cpal_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("host reports no default output".to_string()))
}
