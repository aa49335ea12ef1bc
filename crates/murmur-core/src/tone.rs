//! Frequency tone synthesis
//!
//! Audible frequencies render as a plain sine on both channels. Beat
//! frequencies below [`BINAURAL_THRESHOLD_HZ`] cannot be heard directly, so
//! they render as a binaural pair around [`CARRIER_HZ`]: the left channel
//! plays `carrier - beat/2` and the right `carrier + beat/2`.
//!
//! Tones are looped by the frequency layer. Each channel frequency is
//! rounded to a whole number of cycles per loop so the loop point is
//! seamless; with a 10 second loop that is 0.1 Hz resolution.

use std::f64::consts::TAU;

use crate::buffer::SampleBuffer;
use crate::types::StereoSample;

/// Below this the tone is rendered binaurally
pub const BINAURAL_THRESHOLD_HZ: f64 = 20.0;

/// Carrier for binaural beats
pub const CARRIER_HZ: f64 = 200.0;

/// Loop length of a rendered tone
pub const TONE_LOOP_SECONDS: u32 = 10;

/// Peak amplitude before the frequency layer gain
const TONE_AMPLITUDE: f64 = 0.5;

/// Left/right oscillator frequencies for a target frequency
pub fn channel_frequencies(hz: f64) -> (f64, f64) {
    if hz < BINAURAL_THRESHOLD_HZ {
        let half_beat = hz * 0.5;
        (CARRIER_HZ - half_beat, CARRIER_HZ + half_beat)
    } else {
        (hz, hz)
    }
}

/// Round to a whole number of cycles over the loop
fn loopable(hz: f64) -> f64 {
    let seconds = TONE_LOOP_SECONDS as f64;
    (hz * seconds).round() / seconds
}

/// Render one loop of the tone for `hz`
pub fn render_tone(hz: f64, sample_rate: u32) -> SampleBuffer {
    let (left_hz, right_hz) = channel_frequencies(hz);
    let (left_hz, right_hz) = (loopable(left_hz), loopable(right_hz));

    let len = (sample_rate * TONE_LOOP_SECONDS) as usize;
    let rate = sample_rate as f64;

    let frames = (0..len)
        .map(|i| {
            let t = i as f64 / rate;
            StereoSample::new(
                ((TAU * left_hz * t).sin() * TONE_AMPLITUDE) as f32,
                ((TAU * right_hz * t).sin() * TONE_AMPLITUDE) as f32,
            )
        })
        .collect();

    SampleBuffer::new(sample_rate, 2, frames)
}
