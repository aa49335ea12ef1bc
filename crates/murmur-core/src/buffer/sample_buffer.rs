//! Immutable decoded audio

use basedrop::Shared;

use crate::engine::gc::gc_handle;
use crate::types::{Sample, StereoSample};

/// A decoded buffer shared between playback sources
///
/// Cloning is a reference-count bump. Dropping the last reference on the
/// audio thread defers the free to the GC thread.
pub type SharedBuffer = Shared<SampleBuffer>;

/// Immutable decoded audio data
///
/// Frames are always stored as stereo; mono sources are duplicated to both
/// channels and anything wider keeps its first two channels. `channels`
/// records the channel count of the source material.
///
/// There are no mutating accessors: once a buffer leaves the decoder it is
/// read-only for its whole life.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: u16,
    frames: Vec<StereoSample>,
}

impl SampleBuffer {
    /// Create a buffer from stereo frames
    pub fn new(sample_rate: u32, channels: u16, frames: Vec<StereoSample>) -> Self {
        Self {
            sample_rate,
            channels,
            frames,
        }
    }

    /// Create a buffer from interleaved samples with `channels` channels
    pub fn from_interleaved(samples: &[Sample], channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let frames = samples
            .chunks_exact(channels as usize)
            .map(|frame| match frame {
                [mono] => StereoSample::mono(*mono),
                [left, right, ..] => StereoSample::new(*left, *right),
                [] => StereoSample::silence(),
            })
            .collect();

        Self {
            sample_rate,
            channels,
            frames,
        }
    }

    /// Move this buffer behind a GC-managed shared pointer
    pub fn into_shared(self) -> SharedBuffer {
        Shared::new(&gc_handle(), self)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the source material
    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> &[StereoSample] {
        &self.frames
    }

    /// Number of frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Read a fractional frame position with linear interpolation
    ///
    /// With `wrap` the frame after the last one is the first one (looping
    /// playback); without it the last frame is held.
    #[inline]
    pub fn frame_at(&self, position: f64, wrap: bool) -> StereoSample {
        let len = self.frames.len();
        if len == 0 {
            return StereoSample::silence();
        }

        let index = (position.floor() as usize).min(len - 1);
        let frac = (position - index as f64).clamp(0.0, 1.0) as Sample;
        let next = if index + 1 < len {
            index + 1
        } else if wrap {
            0
        } else {
            index
        };

        self.frames[index].lerp(self.frames[next], frac)
    }
}

/// Check whether two shared handles point at the same decoded buffer
pub fn same_buffer(a: &SharedBuffer, b: &SharedBuffer) -> bool {
    std::ptr::eq::<SampleBuffer>(&**a, &**b)
}
