//! Room reverb on the vocal send
//!
//! Freeverb-style: parallel damped comb filters for the decay, series
//! allpass filters for diffusion. The room has a fixed character; how much
//! of it is heard is set entirely by the reverb send gain in front of it.
//! Output is 100% wet.

use crate::types::StereoBuffer;

/// Comb filter delay line lengths (in samples at 44.1kHz)
/// Prime-ish to avoid stacked resonances
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths (in samples at 44.1kHz)
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Right channel offset for stereo decorrelation (in samples)
const STEREO_SPREAD: usize = 23;

/// Comb feedback (decay time of a medium, soft room)
const ROOM_FEEDBACK: f32 = 0.84;

/// One-pole damping of the comb feedback (0 = bright, 1 = dark)
const DAMPING: f32 = 0.5;

const ALLPASS_FEEDBACK: f32 = 0.5;

/// Gain compensation for summing eight combs
const COMB_GAIN: f32 = 0.2;

/// Circular delay line shared by both filter kinds
struct DelayLine {
    cells: Vec<f32>,
    cursor: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            cells: vec![0.0; len.max(1)],
            cursor: 0,
        }
    }

    /// Return the oldest value and overwrite it with `value`
    #[inline]
    fn cycle(&mut self, value: impl FnOnce(f32) -> f32) -> f32 {
        let oldest = self.cells[self.cursor];
        self.cells[self.cursor] = value(oldest);
        self.cursor += 1;
        if self.cursor == self.cells.len() {
            self.cursor = 0;
        }
        oldest
    }

    fn clear(&mut self) {
        self.cells.fill(0.0);
    }
}

/// Comb and allpass stages for one output channel
struct Tank {
    combs: Vec<(DelayLine, f32)>,
    diffusers: Vec<DelayLine>,
}

impl Tank {
    fn new(scale: f32, offset: usize) -> Self {
        let line = |len: usize| DelayLine::new(((len + offset) as f32 * scale) as usize);
        Self {
            combs: COMB_LENGTHS.iter().map(|&len| (line(len), 0.0)).collect(),
            diffusers: ALLPASS_LENGTHS.iter().map(|&len| line(len)).collect(),
        }
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let mut decay = 0.0;
        for (line, damped) in &mut self.combs {
            decay += line.cycle(|delayed| {
                *damped = delayed * (1.0 - DAMPING) + *damped * DAMPING;
                input + *damped * ROOM_FEEDBACK
            });
        }

        self.diffusers.iter_mut().fold(decay * COMB_GAIN, |signal, line| {
            line.cycle(|delayed| signal + delayed * ALLPASS_FEEDBACK) - signal
        })
    }

    fn clear(&mut self) {
        for (line, damped) in &mut self.combs {
            line.clear();
            *damped = 0.0;
        }
        self.diffusers.iter_mut().for_each(DelayLine::clear);
    }
}

pub struct RoomReverb {
    left: Tank,
    right: Tank,
}

impl RoomReverb {
    /// Build the delay network for the output sample rate
    pub fn new(sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / 44100.0;
        Self {
            left: Tank::new(scale, 0),
            right: Tank::new(scale, STEREO_SPREAD),
        }
    }

    /// Replace the send signal in `buffer` with the reverb's wet output
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for frame in buffer.iter_mut() {
            let input = (frame.left + frame.right) * 0.5;
            frame.left = self.left.tick(input);
            frame.right = self.right.tick(input);
        }
    }

    /// Clear the tail (used when the engine halts)
    pub fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}
