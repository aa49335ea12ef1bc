//! Mix engine - the render path's exclusive state
//!
//! Four source layers (vocal, background, frequency, subliminal), each with
//! its own gain path, summed into a master bus. The vocal also feeds a room
//! reverb through the reverb send path. The engine only changes state in
//! response to commands, applied at block boundaries in issue order.

use std::sync::Arc;

use super::atomics::EngineAtomics;
use super::command::{EngineCommand, EngineEvent};
use super::gain::GainParam;
use super::reverb::RoomReverb;
use super::source::SourceNode;
use crate::types::{GainPath, Layer, StereoBuffer, NUM_LAYERS};

/// Maximum block size pre-allocated for real-time safety
///
/// Backends split larger device callbacks into blocks of at most this size.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// A source waiting for its layer to fade to silence
struct PendingSwap {
    source: Option<Box<SourceNode>>,
    /// Gain to ramp back to after the swap
    restore: f32,
    fade_frames: u32,
}

struct LayerSlot {
    source: Option<Box<SourceNode>>,
    gain: GainParam,
    pending: Option<PendingSwap>,
}

impl LayerSlot {
    fn new() -> Self {
        Self {
            source: None,
            gain: GainParam::new(0.0),
            pending: None,
        }
    }
}

/// Gain change addressed to a path
#[derive(Clone, Copy)]
enum GainChange {
    Set(f32),
    Ramp(f32, u32),
}

impl GainChange {
    fn target(self) -> f32 {
        match self {
            GainChange::Set(v) | GainChange::Ramp(v, _) => v,
        }
    }

    fn apply(self, param: &mut GainParam) {
        match self {
            GainChange::Set(v) => param.set(v),
            GainChange::Ramp(v, frames) => param.ramp_to(v, frames),
        }
    }
}

fn push_event(events: &mut rtrb::Producer<EngineEvent>, event: EngineEvent) {
    // A full queue means nobody is polling; dropping is fine
    let _ = events.push(event);
}

pub struct MixEngine {
    sample_rate: u32,
    slots: [LayerSlot; NUM_LAYERS],
    reverb_send: GainParam,
    master: GainParam,
    reverb: RoomReverb,
    /// Pre-allocated per-layer scratch
    layer_buffer: StereoBuffer,
    /// Pre-allocated reverb send bus
    send_buffer: StereoBuffer,
    /// Freeze once the master path reaches silence
    pause_pending: bool,
    paused: bool,
    halted: bool,
    atomics: Arc<EngineAtomics>,
    events: rtrb::Producer<EngineEvent>,
}

impl MixEngine {
    pub fn new(
        sample_rate: u32,
        atomics: Arc<EngineAtomics>,
        events: rtrb::Producer<EngineEvent>,
    ) -> Self {
        let engine = Self {
            sample_rate,
            slots: std::array::from_fn(|_| LayerSlot::new()),
            reverb_send: GainParam::new(0.0),
            master: GainParam::new(1.0),
            reverb: RoomReverb::new(sample_rate),
            layer_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            send_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
            pause_pending: false,
            paused: false,
            halted: false,
            atomics,
            events,
        };
        engine.publish();
        engine
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn atomics(&self) -> &Arc<EngineAtomics> {
        &self.atomics
    }

    /// Drain and apply every queued command
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.handle_command(cmd);
        }
    }

    pub fn handle_command(&mut self, cmd: EngineCommand) {
        if self.halted {
            // Sources in late commands are simply dropped
            return;
        }

        match cmd {
            EngineCommand::SetGain { path, value } => self.change_gain(path, GainChange::Set(value)),
            EngineCommand::RampGain { path, target, frames } => {
                self.change_gain(path, GainChange::Ramp(target, frames))
            }
            EngineCommand::StartSource { layer, source } => self.start_source(layer, source),
            EngineCommand::StopSource { layer } => {
                let slot = &mut self.slots[layer.index()];
                slot.source = None;
                slot.pending = None;
                slot.gain.cancel();
            }
            EngineCommand::ReplaceSource {
                layer,
                source,
                fade_frames,
            } => self.replace_source(layer, source, fade_frames),
            EngineCommand::Pause => {
                self.pause_pending = !self.paused;
            }
            EngineCommand::Resume => {
                self.pause_pending = false;
                self.paused = false;
                self.atomics.set_paused(false);
            }
            EngineCommand::Shutdown => self.halt(),
        }
    }

    fn change_gain(&mut self, path: GainPath, change: GainChange) {
        match path {
            GainPath::ReverbSend => change.apply(&mut self.reverb_send),
            GainPath::Master => change.apply(&mut self.master),
            _ => {
                let slot = &mut self.slots[path.index()];
                match slot.pending.as_mut() {
                    // Mid-swap changes land after the swap
                    Some(pending) => pending.restore = change.target(),
                    None => change.apply(&mut slot.gain),
                }
            }
        }
    }

    fn start_source(&mut self, layer: Layer, source: Box<SourceNode>) {
        let slot = &mut self.slots[layer.index()];
        if let Some(pending) = slot.pending.take() {
            slot.gain.ramp_to(pending.restore, pending.fade_frames);
        }
        slot.source = Some(source);
        self.atomics.count_source_start(layer);
    }

    fn replace_source(&mut self, layer: Layer, source: Option<Box<SourceNode>>, fade_frames: u32) {
        let slot = &mut self.slots[layer.index()];
        let restore = slot
            .pending
            .take()
            .map_or(slot.gain.target(), |pending| pending.restore);

        if slot.source.is_none() || slot.gain.is_silent() {
            // Nothing audible to fade out
            if source.is_some() {
                self.atomics.count_source_start(layer);
            }
            slot.source = source;
            slot.gain.set(0.0);
            slot.gain.ramp_to(restore, fade_frames);
            push_event(&mut self.events, EngineEvent::LayerSwapped { layer });
        } else {
            slot.gain.ramp_to(0.0, fade_frames);
            slot.pending = Some(PendingSwap {
                source,
                restore,
                fade_frames,
            });
        }
    }

    fn halt(&mut self) {
        for slot in &mut self.slots {
            slot.source = None;
            slot.pending = None;
            slot.gain.set(0.0);
        }
        self.reverb_send.set(0.0);
        self.master.set(0.0);
        self.reverb.reset();
        self.pause_pending = false;
        self.halted = true;

        self.atomics.set_halted();
        self.publish();
        push_event(&mut self.events, EngineEvent::Halted);
    }

    /// Render one block into `out` (at most [`MAX_BUFFER_SIZE`] frames)
    pub fn process(&mut self, out: &mut StereoBuffer) {
        out.fill_silence();
        if self.halted || self.paused {
            return;
        }

        let n = out.len().min(MAX_BUFFER_SIZE);
        self.layer_buffer.set_len_from_capacity(n);
        self.send_buffer.set_len_from_capacity(n);

        for layer in Layer::ALL {
            let slot = &mut self.slots[layer.index()];
            let buffer = &mut self.layer_buffer;

            match slot.source.as_mut() {
                Some(source) => {
                    let status = source.render(buffer.as_mut_slice());
                    if layer == Layer::Vocal {
                        if status.loops_completed > 0 {
                            let loops = source.loops_completed();
                            push_event(&mut self.events, EngineEvent::VocalLoopCompleted { loops });
                        }
                        if status.finished {
                            push_event(&mut self.events, EngineEvent::VocalFinished);
                        }
                    }
                }
                None => buffer.fill_silence(),
            }

            for sample in buffer.iter_mut() {
                *sample *= slot.gain.next();
            }

            if layer == Layer::Vocal {
                for (send, dry) in self.send_buffer.iter_mut().zip(buffer.iter()) {
                    *send = *dry * self.reverb_send.next();
                }
            }

            out.add_buffer(buffer);

            if slot.pending.is_some() && slot.gain.is_silent() {
                if let Some(pending) = slot.pending.take() {
                    if pending.source.is_some() {
                        self.atomics.count_source_start(layer);
                    }
                    slot.source = pending.source;
                    slot.gain.ramp_to(pending.restore, pending.fade_frames);
                    push_event(&mut self.events, EngineEvent::LayerSwapped { layer });
                }
            }
        }

        self.reverb.process(&mut self.send_buffer);
        out.add_buffer(&self.send_buffer);

        for sample in out.iter_mut() {
            *sample *= self.master.next();
            sample.left = sample.left.clamp(-1.0, 1.0);
            sample.right = sample.right.clamp(-1.0, 1.0);
        }

        if self.pause_pending && self.master.is_silent() {
            self.pause_pending = false;
            self.paused = true;
            self.atomics.set_paused(true);
            push_event(&mut self.events, EngineEvent::Paused);
        }

        self.atomics.add_frames(n as u64);
        self.publish();
    }

    /// Publish telemetry for the control path
    fn publish(&self) {
        for layer in Layer::ALL {
            let slot = &self.slots[layer.index()];
            self.atomics.set_gain(layer.gain_path(), slot.gain.value());
            let rate = slot
                .source
                .as_ref()
                .map_or(0.0, |s| s.shaping().effective_rate());
            self.atomics.set_source(layer, slot.source.is_some(), rate);
        }
        self.atomics.set_gain(GainPath::ReverbSend, self.reverb_send.value());
        self.atomics.set_gain(GainPath::Master, self.master.value());

        match self.slots[Layer::Vocal.index()].source.as_ref() {
            Some(vocal) => self.atomics.set_vocal(
                vocal.position() as u64,
                vocal.loops_completed(),
                vocal.is_finished(),
            ),
            None => self.atomics.set_vocal(0, 0, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::engine::command::event_channel;
    use crate::engine::source::{LoopMode, Shaping};

    fn engine() -> (MixEngine, rtrb::Consumer<EngineEvent>) {
        let (tx, rx) = event_channel();
        (MixEngine::new(48000, Arc::new(EngineAtomics::new()), tx), rx)
    }

    fn constant_source(value: f32, len: usize, loop_mode: LoopMode) -> Box<SourceNode> {
        let buffer = SampleBuffer::from_interleaved(&vec![value; len], 1, 48000).into_shared();
        Box::new(SourceNode::new(buffer, Shaping::NEUTRAL, loop_mode, 48000))
    }

    fn render(engine: &mut MixEngine, frames: usize) -> StereoBuffer {
        let mut out = StereoBuffer::silence(frames);
        engine.process(&mut out);
        out
    }

    fn drain(rx: &mut rtrb::Consumer<EngineEvent>) -> Vec<EngineEvent> {
        std::iter::from_fn(|| rx.pop().ok()).collect()
    }

    #[test]
    fn test_layers_sum_with_gain() {
        let (mut engine, _events) = engine();
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Background,
            source: constant_source(0.5, 4800, LoopMode::Forever),
        });
        engine.handle_command(EngineCommand::SetGain { path: GainPath::Background, value: 0.2 });

        let out = render(&mut engine, 256);
        assert!((out[100].left - 0.1).abs() < 1e-6);
        assert_eq!(engine.atomics().gain(GainPath::Background), 0.2);
        assert!(engine.atomics().is_source_active(Layer::Background));
    }

    #[test]
    fn test_vocal_loop_events() {
        let (mut engine, mut events) = engine();
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Vocal,
            source: constant_source(0.5, 100, LoopMode::Count(2)),
        });
        engine.handle_command(EngineCommand::SetGain { path: GainPath::Vocal, value: 1.0 });

        render(&mut engine, 256);
        let seen = drain(&mut events);
        assert!(seen.contains(&EngineEvent::VocalLoopCompleted { loops: 2 }));
        assert!(seen.contains(&EngineEvent::VocalFinished));
        assert!(engine.atomics().is_vocal_finished());
        assert_eq!(engine.atomics().vocal_loops(), 2);
    }

    #[test]
    fn test_replace_fades_swaps_and_restores() {
        let (mut engine, mut events) = engine();
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Background,
            source: constant_source(0.5, 4800, LoopMode::Forever),
        });
        engine.handle_command(EngineCommand::SetGain { path: GainPath::Background, value: 0.3 });
        render(&mut engine, 64);

        engine.handle_command(EngineCommand::ReplaceSource {
            layer: Layer::Background,
            source: Some(constant_source(0.25, 4800, LoopMode::Forever)),
            fade_frames: 128,
        });
        // A volume change mid-swap applies after the swap
        engine.handle_command(EngineCommand::RampGain {
            path: GainPath::Background,
            target: 0.4,
            frames: 10,
        });

        render(&mut engine, 128);
        assert_eq!(drain(&mut events), vec![EngineEvent::LayerSwapped { layer: Layer::Background }]);
        assert_eq!(engine.atomics().sources_started(Layer::Background), 2);

        render(&mut engine, 128);
        let out = render(&mut engine, 16);
        assert!((out[8].left - 0.25 * 0.4).abs() < 1e-5);
    }

    #[test]
    fn test_replace_on_empty_layer_is_immediate() {
        let (mut engine, mut events) = engine();
        engine.handle_command(EngineCommand::SetGain { path: GainPath::Frequency, value: 0.25 });
        engine.handle_command(EngineCommand::ReplaceSource {
            layer: Layer::Frequency,
            source: Some(constant_source(1.0, 4800, LoopMode::Forever)),
            fade_frames: 64,
        });
        assert_eq!(drain(&mut events), vec![EngineEvent::LayerSwapped { layer: Layer::Frequency }]);

        let out = render(&mut engine, 128);
        // Fades in from silence rather than jumping
        assert!(out[0].left < 0.25);
        assert!((out[127].left - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_pause_freezes_after_fade() {
        let (mut engine, mut events) = engine();
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Vocal,
            source: constant_source(0.5, 48000, LoopMode::Count(1)),
        });
        engine.handle_command(EngineCommand::SetGain { path: GainPath::Vocal, value: 1.0 });
        engine.handle_command(EngineCommand::RampGain { path: GainPath::Master, target: 0.0, frames: 100 });
        engine.handle_command(EngineCommand::Pause);

        render(&mut engine, 128);
        assert_eq!(drain(&mut events), vec![EngineEvent::Paused]);
        assert!(engine.atomics().is_paused());

        let position = engine.atomics().vocal_position();
        let out = render(&mut engine, 128);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(engine.atomics().vocal_position(), position);

        engine.handle_command(EngineCommand::Resume);
        engine.handle_command(EngineCommand::RampGain { path: GainPath::Master, target: 1.0, frames: 10 });
        render(&mut engine, 128);
        assert!(engine.atomics().vocal_position() > position);
        assert!(!engine.atomics().is_paused());
    }

    #[test]
    fn test_stop_cancels_ramp() {
        let (mut engine, _events) = engine();
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Subliminal,
            source: constant_source(0.5, 4800, LoopMode::Forever),
        });
        engine.handle_command(EngineCommand::RampGain {
            path: GainPath::Subliminal,
            target: 0.14,
            frames: 4800,
        });
        render(&mut engine, 480);
        engine.handle_command(EngineCommand::StopSource { layer: Layer::Subliminal });
        let frozen = engine.atomics().gain(GainPath::Subliminal);
        render(&mut engine, 480);

        assert_eq!(engine.atomics().gain(GainPath::Subliminal), frozen);
        assert!(!engine.atomics().is_source_active(Layer::Subliminal));
    }

    #[test]
    fn test_shutdown_silences_everything() {
        let (mut engine, mut events) = engine();
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Vocal,
            source: constant_source(0.5, 4800, LoopMode::Forever),
        });
        engine.handle_command(EngineCommand::RampGain { path: GainPath::Vocal, target: 1.0, frames: 4800 });
        engine.handle_command(EngineCommand::Shutdown);

        assert_eq!(drain(&mut events), vec![EngineEvent::Halted]);
        assert!(engine.is_halted());
        assert_eq!(render(&mut engine, 256).peak(), 0.0);

        // Commands after shutdown are ignored
        engine.handle_command(EngineCommand::StartSource {
            layer: Layer::Vocal,
            source: constant_source(0.5, 4800, LoopMode::Forever),
        });
        assert!(!engine.atomics().is_source_active(Layer::Vocal));
    }

    #[test]
    fn test_output_is_clamped() {
        let (mut engine, _events) = engine();
        for layer in [Layer::Vocal, Layer::Background, Layer::Frequency] {
            engine.handle_command(EngineCommand::StartSource {
                layer,
                source: constant_source(1.0, 4800, LoopMode::Forever),
            });
            engine.handle_command(EngineCommand::SetGain { path: layer.gain_path(), value: 1.0 });
        }
        let out = render(&mut engine, 256);
        assert!(out.peak() <= 1.0);
    }
}
