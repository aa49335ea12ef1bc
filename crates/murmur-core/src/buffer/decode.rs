//! Recording decoding (Symphonia)
//!
//! Turns raw container bytes into a [`SampleBuffer`]. Malformed or empty
//! input is rejected with [`DecodeError::InvalidAudio`]; nothing is retried.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer as PacketBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::sample_buffer::SampleBuffer;
use super::service::CancelToken;

/// Share of the declared frame count a decode must produce to count as whole
const MIN_COMPLETE_FRACTION: f64 = 0.95;

/// Errors produced by the buffer store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Decode cancelled")]
    Cancelled,

    #[error("Decode service unavailable")]
    ServiceUnavailable,
}

/// Decode a complete recording held in memory
///
/// `extension` is an optional container hint ("wav", "m4a", ...); the probe
/// falls back to content sniffing without it. The token is checked between
/// packets so a cancelled decode stops promptly.
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    cancel: &CancelToken,
) -> Result<SampleBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::InvalidAudio("empty input".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::InvalidAudio(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::InvalidAudio("no audio track found".to_string()))?;

    let track_id = track.id;
    let declared_frames = track.codec_params.n_frames;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::InvalidAudio(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut packet_buf: Option<PacketBuffer<f32>> = None;
    let mut packet_frames: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::InvalidAudio(format!("unreadable stream: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::InvalidAudio(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        // Packet sizes may grow (VBR streams), so the scratch buffer follows
        let capacity = decoded.capacity() as u64;
        if packet_buf.is_none() || capacity > packet_frames {
            packet_buf = Some(PacketBuffer::new(capacity, spec));
            packet_frames = capacity;
        }

        if let Some(ref mut buf) = packet_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let sample_rate = sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| DecodeError::InvalidAudio("unknown sample rate".to_string()))?;
    let channels = channels.unwrap_or(2);

    let buffer = SampleBuffer::from_interleaved(&samples, channels, sample_rate);
    if buffer.is_empty() {
        return Err(DecodeError::InvalidAudio("no audio frames".to_string()));
    }
    if let Some(declared) = declared_frames {
        if (buffer.len() as f64) < declared as f64 * MIN_COMPLETE_FRACTION {
            return Err(DecodeError::InvalidAudio(format!(
                "truncated: {} of {} frames",
                buffer.len(),
                declared
            )));
        }
    }

    log::debug!(
        "Decoded {} frames ({} ch @ {} Hz, {:.2}s)",
        buffer.len(),
        channels,
        sample_rate,
        buffer.duration_seconds()
    );

    Ok(buffer)
}

/// Encode interleaved samples as an in-memory 16-bit WAV file
#[cfg(test)]
pub(crate) fn wav_fixture(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
