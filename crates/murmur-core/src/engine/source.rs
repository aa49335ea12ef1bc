//! Buffer playback source
//!
//! Plays a shared [`SampleBuffer`](crate::buffer::SampleBuffer) with
//! playback-rate and detune shaping. Detune is applied as a pitch ratio of
//! `2^(cents/1200)` on top of the rate, so both change speed and pitch
//! together. Sample-rate differences between the buffer and the output are
//! folded into the same step.

use crate::buffer::SharedBuffer;
use crate::types::StereoSample;

/// How many times a source plays its buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// Loop until stopped
    Forever,
    /// Play `n` complete passes, then finish (0 is treated as 1)
    Count(u32),
}

/// Playback-rate and detune applied to a source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shaping {
    pub playback_rate: f64,
    pub detune_cents: f64,
}

impl Shaping {
    /// Unshaped playback
    pub const NEUTRAL: Shaping = Shaping {
        playback_rate: 1.0,
        detune_cents: 0.0,
    };

    /// Combined speed factor of rate and detune
    #[inline]
    pub fn effective_rate(&self) -> f64 {
        self.playback_rate * 2f64.powf(self.detune_cents / 1200.0)
    }
}

impl Default for Shaping {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// What happened to a source during one render call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStatus {
    /// Passes completed during this call
    pub loops_completed: u32,
    /// The source played its final pass during this call
    pub finished: bool,
}

/// A playing instance of a buffer
///
/// Created on the control path, moved to the render path inside a command
/// and dropped there; the buffer itself is freed by the GC thread.
pub struct SourceNode {
    buffer: SharedBuffer,
    shaping: Shaping,
    loop_mode: LoopMode,
    /// Buffer frames advanced per output frame
    step: f64,
    position: f64,
    loops_completed: u32,
    finished: bool,
}

impl SourceNode {
    pub fn new(buffer: SharedBuffer, shaping: Shaping, loop_mode: LoopMode, output_rate: u32) -> Self {
        let rate_ratio = if output_rate == 0 {
            1.0
        } else {
            buffer.sample_rate() as f64 / output_rate as f64
        };
        let finished = buffer.is_empty();

        Self {
            step: shaping.effective_rate() * rate_ratio,
            buffer,
            shaping,
            loop_mode,
            position: 0.0,
            loops_completed: 0,
            finished,
        }
    }

    #[inline]
    pub fn shaping(&self) -> Shaping {
        self.shaping
    }

    #[inline]
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Current position in buffer frames
    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the pass in progress is followed by another one
    #[inline]
    fn loops_again(&self) -> bool {
        match self.loop_mode {
            LoopMode::Forever => true,
            LoopMode::Count(n) => self.loops_completed + 1 < n.max(1),
        }
    }

    /// Render into `out` (overwrites it), returning loop progress
    ///
    /// Frames after the source finishes are silence.
    pub fn render(&mut self, out: &mut [StereoSample]) -> RenderStatus {
        let mut status = RenderStatus::default();
        let len = self.buffer.len() as f64;

        for frame in out.iter_mut() {
            if self.finished {
                *frame = StereoSample::silence();
                continue;
            }

            let wrap = self.loops_again();
            *frame = self.buffer.frame_at(self.position, wrap);

            self.position += self.step;
            while self.position >= len {
                self.loops_completed += 1;
                status.loops_completed += 1;
                if wrap {
                    self.position -= len;
                } else {
                    self.position = len;
                    self.finished = true;
                    status.finished = true;
                    break;
                }
            }
        }

        status
    }
}
