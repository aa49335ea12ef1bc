//! Per-frame gain parameter with linear ramps

/// A gain value owned by the render path
///
/// Ramps are linear in amplitude and advance one step per rendered frame,
/// so they run on the audio clock. Every ramp starts from the value the
/// listener is hearing right now, never from the previous target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainParam {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl GainParam {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump to `value`, cancelling any ramp
    pub fn set(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Ramp from the current value to `target` over `frames`
    ///
    /// A ramp already in flight toward the same target is left alone.
    pub fn ramp_to(&mut self, target: f32, frames: u32) {
        if self.remaining > 0 && self.target == target {
            return;
        }
        if frames == 0 || self.current == target {
            self.set(target);
            return;
        }

        self.target = target;
        self.remaining = frames;
        self.step = (target - self.current) / frames as f32;
    }

    /// Stop any ramp, holding the current value
    pub fn cancel(&mut self) {
        self.set(self.current);
    }

    /// Advance one frame and return the gain for it
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// True when the path is silent and will stay silent
    #[inline]
    pub fn is_silent(&self) -> bool {
        self.remaining == 0 && self.current == 0.0
    }
}

impl Default for GainParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
