//! Lock-free command and event queues between control and render paths
//!
//! The control path pushes [`EngineCommand`]s through an `rtrb` ring buffer;
//! the render path drains it at the start of every block, in issue order.
//! Both push and pop are wait-free, so no control operation can stall the
//! audio callback and vice versa.
//!
//! Notifications flow the other way through a second ring buffer of
//! [`EngineEvent`]s, drained by the session when the caller polls.
//!
//! ```ignore
//! let (mut tx, mut rx) = command_channel();
//! tx.push(EngineCommand::SetGain { path: GainPath::Vocal, value: 0.85 });
//! engine.process_commands(&mut rx);
//! ```

use super::source::SourceNode;
use crate::types::{GainPath, Layer};

/// Commands sent from the control path to the render path
///
/// Sources are boxed so the enum stays small in the ring buffer.
pub enum EngineCommand {
    /// Jump a gain path to `value`, cancelling any ramp on it
    SetGain { path: GainPath, value: f32 },
    /// Ramp a gain path from its current value to `target` over `frames`
    ///
    /// A ramp already heading to the same target keeps its schedule.
    RampGain {
        path: GainPath,
        target: f32,
        frames: u32,
    },

    /// Start a source on a layer, replacing any source already there
    StartSource { layer: Layer, source: Box<SourceNode> },
    /// Remove a layer's source and freeze its gain where it is
    StopSource { layer: Layer },
    /// Fade a layer out, swap its source at silence, fade back in
    ///
    /// `None` leaves the layer empty after the fade.
    ReplaceSource {
        layer: Layer,
        source: Option<Box<SourceNode>>,
        fade_frames: u32,
    },

    /// Freeze rendering once the master path has reached silence
    Pause,
    /// Unfreeze rendering
    Resume,

    /// Cancel all ramps, drop every source and render silence from now on
    Shutdown,
}

/// Notifications from the render path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The vocal finished one pass; `loops` passes are complete so far
    VocalLoopCompleted { loops: u32 },
    /// The vocal finished its last pass
    VocalFinished,
    /// A fade-swap installed the new source on `layer`
    LayerSwapped { layer: Layer },
    /// Rendering is frozen after a pause fade
    Paused,
    /// The engine processed `Shutdown`
    Halted,
}

/// Capacity of the command queue
///
/// Opening a session or switching presets sends a burst of a dozen or so
/// commands; 1024 leaves room for bursts from many rapid user actions.
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the event queue; events beyond this are dropped
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// The producer is owned by the control path, the consumer by the render
/// path.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Create a new event channel (render path produces, control path consumes)
pub fn event_channel() -> (rtrb::Producer<EngineEvent>, rtrb::Consumer<EngineEvent>) {
    rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_order() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::SetGain { path: GainPath::Vocal, value: 0.5 }).ok();
        tx.push(EngineCommand::StopSource { layer: Layer::Subliminal }).ok();

        assert!(matches!(rx.pop(), Ok(EngineCommand::SetGain { path: GainPath::Vocal, .. })));
        assert!(matches!(rx.pop(), Ok(EngineCommand::StopSource { layer: Layer::Subliminal })));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_size() {
        // Sources are boxed; everything else is a few scalars
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 32, "EngineCommand is {} bytes, expected <= 32", size);
    }
}
