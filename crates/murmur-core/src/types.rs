//! Common types for Murmur
//!
//! Fundamental audio types shared by the buffer store, the real-time engine
//! and the control layer: stereo samples and buffers, mix layers and the
//! named gain paths every volume change is addressed to.

use serde::{Deserialize, Serialize};

/// Default output sample rate (48kHz)
/// The actual rate is negotiated with the output device at runtime.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of source layers in a playback graph
pub const NUM_LAYERS: usize = 4;

/// Number of addressable gain paths (one per layer, reverb send, master)
pub const NUM_GAIN_PATHS: usize = 6;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Source layers of a playback graph
///
/// Every layer owns at most one playing source and one gain path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(usize)]
pub enum Layer {
    /// The user's own recording, played `loop_count` times
    Vocal = 0,
    /// Looping background soundscape
    Background = 1,
    /// Looping frequency tone
    Frequency = 2,
    /// Near-threshold shaped copy of the recording
    Subliminal = 3,
}

impl Layer {
    /// All layers in render order
    pub const ALL: [Layer; NUM_LAYERS] = [
        Layer::Vocal,
        Layer::Background,
        Layer::Frequency,
        Layer::Subliminal,
    ];

    /// Index into per-layer arrays
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The gain path controlling this layer
    #[inline]
    pub fn gain_path(self) -> GainPath {
        match self {
            Layer::Vocal => GainPath::Vocal,
            Layer::Background => GainPath::Background,
            Layer::Frequency => GainPath::Frequency,
            Layer::Subliminal => GainPath::Subliminal,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Layer::Vocal => "vocal",
            Layer::Background => "background",
            Layer::Frequency => "frequency",
            Layer::Subliminal => "subliminal",
        }
    }
}

/// Named gain paths in the playback graph
///
/// All volume changes are addressed to one of these paths and go through
/// the gain automation unit; nothing else writes gain values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum GainPath {
    Vocal = 0,
    Background = 1,
    Frequency = 2,
    Subliminal = 3,
    /// Send level from the vocal into the room reverb
    ReverbSend = 4,
    /// Master bus (used for pause/resume fades)
    Master = 5,
}

impl GainPath {
    pub const ALL: [GainPath; NUM_GAIN_PATHS] = [
        GainPath::Vocal,
        GainPath::Background,
        GainPath::Frequency,
        GainPath::Subliminal,
        GainPath::ReverbSend,
        GainPath::Master,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GainPath::Vocal => "vocal",
            GainPath::Background => "background",
            GainPath::Frequency => "frequency",
            GainPath::Subliminal => "subliminal",
            GainPath::ReverbSend => "reverb_send",
            GainPath::Master => "master",
        }
    }
}

impl std::fmt::Display for GainPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One stereo frame
///
/// `#[repr(C)]` keeps the `[left, right]` layout so a slice of frames can be
/// viewed as interleaved `f32` through bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self::new(value, value)
    }

    /// Point `t` of the way from `self` to `toward`
    #[inline]
    pub fn lerp(self, toward: Self, t: Sample) -> Self {
        self + (toward + self * -1.0) * t
    }

    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, gain: Sample) -> Self {
        Self::new(self.left * gain, self.right * gain)
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, gain: Sample) {
        *self = *self * gain;
    }
}

/// Growable run of stereo frames
///
/// Render-path buffers are allocated once at `MAX_BUFFER_SIZE` and only
/// resized within that capacity. Offline renders append freely.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    frames: Vec<StereoSample>,
}

impl StereoBuffer {
    pub fn silence(len: usize) -> Self {
        Self {
            frames: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Change the working length without reallocating
    ///
    /// Growing past the allocated capacity is a bug on the render path.
    #[inline]
    pub fn set_len_from_capacity(&mut self, len: usize) {
        debug_assert!(len <= self.frames.capacity(), "buffer grown past capacity");
        self.frames.resize(len, StereoSample::silence());
    }

    pub fn fill_silence(&mut self) {
        self.frames.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.frames
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.frames
    }

    /// `[L, R, L, R, ...]` view without copying
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.frames)
    }

    /// Mix `other` into this buffer frame by frame
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        self.frames
            .iter_mut()
            .zip(&other.frames)
            .for_each(|(dst, src)| *dst += *src);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StereoSample> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, StereoSample> {
        self.frames.iter_mut()
    }

    pub fn peak(&self) -> Sample {
        self.frames.iter().fold(0.0, |peak, frame| peak.max(frame.peak()))
    }

    /// Append frames (allocates; offline use only)
    pub fn extend_from_slice(&mut self, frames: &[StereoSample]) {
        self.frames.extend_from_slice(frames);
    }
}

impl std::ops::Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, frame: usize) -> &StereoSample {
        &self.frames[frame]
    }
}

impl std::ops::IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, frame: usize) -> &mut StereoSample {
        &mut self.frames[frame]
    }
}

impl FromIterator<StereoSample> for StereoBuffer {
    fn from_iter<I: IntoIterator<Item = StereoSample>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}
