//! Real-time mix engine
//!
//! Everything in this module runs on (or is handed to) the render path:
//! the engine itself, its gain parameters and sources, the command/event
//! queues that connect it to the control path, and the telemetry it
//! publishes.

mod atomics;
mod command;
#[allow(clippy::module_inception)]
mod engine;
mod gain;
pub mod gc;
mod reverb;
mod source;

pub use atomics::EngineAtomics;
pub use command::{
    command_channel, event_channel, EngineCommand, EngineEvent, COMMAND_QUEUE_CAPACITY,
    EVENT_QUEUE_CAPACITY,
};
pub use engine::{MixEngine, MAX_BUFFER_SIZE};
pub use gain::GainParam;
pub use reverb::RoomReverb;
pub use source::{LoopMode, RenderStatus, Shaping, SourceNode};
