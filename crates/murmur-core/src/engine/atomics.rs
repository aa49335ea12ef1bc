//! Lock-free engine telemetry
//!
//! The render path publishes its state here once per block; the control
//! path reads it without ever touching the engine. Floats are stored as
//! their bit patterns.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::types::{GainPath, Layer, NUM_GAIN_PATHS, NUM_LAYERS};

pub struct EngineAtomics {
    /// Current (not target) gain per path, f32 bits
    gains: [AtomicU32; NUM_GAIN_PATHS],
    /// Whether a layer currently holds a source
    source_active: [AtomicBool; NUM_LAYERS],
    /// Sources started per layer since the engine was created
    sources_started: [AtomicU64; NUM_LAYERS],
    /// Effective rate (rate x detune ratio) of each layer's source, f64 bits
    source_rate: [AtomicU64; NUM_LAYERS],
    /// Vocal playhead in buffer frames
    vocal_position: AtomicU64,
    /// Completed vocal passes
    vocal_loops: AtomicU32,
    vocal_finished: AtomicBool,
    /// Output frames rendered (frozen while paused)
    frames_rendered: AtomicU64,
    paused: AtomicBool,
    halted: AtomicBool,
}

impl EngineAtomics {
    pub fn new() -> Self {
        Self {
            gains: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            source_active: std::array::from_fn(|_| AtomicBool::new(false)),
            sources_started: std::array::from_fn(|_| AtomicU64::new(0)),
            source_rate: std::array::from_fn(|_| AtomicU64::new(0.0f64.to_bits())),
            vocal_position: AtomicU64::new(0),
            vocal_loops: AtomicU32::new(0),
            vocal_finished: AtomicBool::new(false),
            frames_rendered: AtomicU64::new(0),
            paused: AtomicBool::new(false),
            halted: AtomicBool::new(false),
        }
    }

    /// Current gain of a path (lock-free)
    #[inline]
    pub fn gain(&self, path: GainPath) -> f32 {
        f32::from_bits(self.gains[path.index()].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn is_source_active(&self, layer: Layer) -> bool {
        self.source_active[layer.index()].load(Ordering::Relaxed)
    }

    /// Number of sources a layer has been given over the engine's life
    #[inline]
    pub fn sources_started(&self, layer: Layer) -> u64 {
        self.sources_started[layer.index()].load(Ordering::Relaxed)
    }

    /// Effective playback rate of the layer's source (0 when empty)
    #[inline]
    pub fn source_rate(&self, layer: Layer) -> f64 {
        f64::from_bits(self.source_rate[layer.index()].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn vocal_position(&self) -> u64 {
        self.vocal_position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn vocal_loops(&self) -> u32 {
        self.vocal_loops.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_vocal_finished(&self) -> bool {
        self.vocal_finished.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }

    // Writers (render path only)

    pub(crate) fn set_gain(&self, path: GainPath, value: f32) {
        self.gains[path.index()].store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn set_source(&self, layer: Layer, active: bool, rate: f64) {
        self.source_active[layer.index()].store(active, Ordering::Relaxed);
        self.source_rate[layer.index()].store(rate.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn count_source_start(&self, layer: Layer) {
        self.sources_started[layer.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_vocal(&self, position: u64, loops: u32, finished: bool) {
        self.vocal_position.store(position, Ordering::Relaxed);
        self.vocal_loops.store(loops, Ordering::Relaxed);
        self.vocal_finished.store(finished, Ordering::Relaxed);
    }

    pub(crate) fn add_frames(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub(crate) fn set_halted(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }
}

impl Default for EngineAtomics {
    fn default() -> Self {
        Self::new()
    }
}
