//! Output backends behind one handle
//!
//! Both backends share the same lock-free architecture:
//! - the control path sends commands through an `rtrb` ring buffer
//! - the render path (device callback or offline renderer) owns the
//!   [`MixEngine`] exclusively and drains commands at block boundaries
//! - telemetry flows back through [`EngineAtomics`] and an event queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::config::{OutputBackend, OutputConfig};
use super::cpal_backend::CpalOutputHandle;
use super::error::AudioResult;
use super::offline_backend::OfflineOutput;
use crate::engine::{
    command_channel, event_channel, EngineAtomics, EngineCommand, EngineEvent, MixEngine,
    MAX_BUFFER_SIZE,
};
use crate::types::{StereoBuffer, StereoSample};

/// Command sender for the control path
///
/// Wraps the lock-free producer; every send is non-blocking.
pub struct CommandSender {
    pub(crate) producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Queue a command for the next render block
    ///
    /// Returns `Err(cmd)` if the queue is full.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Free command slots
    pub fn slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Liveness of an output, shared with the backend's error path
#[derive(Debug, Default)]
pub struct OutputHealth {
    lost: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl OutputHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the output went away; the first reason wins
    pub fn mark_lost(&self, reason: impl Into<String>) {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.lost.store(true, Ordering::Release);
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Render-side state: the engine plus its command consumer
///
/// Owned by the device callback (or the offline renderer) behind a mutex
/// that only the render path ever locks while audio is running.
pub(crate) struct RenderState {
    engine: MixEngine,
    command_rx: rtrb::Consumer<EngineCommand>,
    block: StereoBuffer,
}

impl RenderState {
    fn new(engine: MixEngine, command_rx: rtrb::Consumer<EngineCommand>) -> Self {
        Self {
            engine,
            command_rx,
            block: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Render one block of at most [`MAX_BUFFER_SIZE`] frames
    pub(crate) fn render_block(&mut self, n_frames: usize) -> &[StereoSample] {
        self.block.set_len_from_capacity(n_frames.min(MAX_BUFFER_SIZE));
        self.engine.process_commands(&mut self.command_rx);
        self.engine.process(&mut self.block);
        self.block.as_slice()
    }
}

/// Everything the control path gets back from opening an output
pub struct OutputLink {
    /// Keeps the output alive (drop to stop)
    pub handle: OutputHandle,
    pub command_sender: CommandSender,
    pub events: rtrb::Consumer<EngineEvent>,
    pub atomics: Arc<EngineAtomics>,
    pub sample_rate: u32,
    pub buffer_size: u32,
}

/// Handle to an active output
pub enum OutputHandle {
    Device(CpalOutputHandle),
    Offline(OfflineOutput),
}

impl OutputHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            OutputHandle::Device(h) => h.sample_rate(),
            OutputHandle::Offline(h) => h.sample_rate(),
        }
    }

    pub fn buffer_size(&self) -> u32 {
        match self {
            OutputHandle::Device(h) => h.buffer_size(),
            OutputHandle::Offline(h) => h.block_size(),
        }
    }

    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size() as f32 / self.sample_rate() as f32) * 1000.0
    }

    pub fn health(&self) -> &Arc<OutputHealth> {
        match self {
            OutputHandle::Device(h) => h.health(),
            OutputHandle::Offline(h) => h.health(),
        }
    }

    pub fn is_lost(&self) -> bool {
        self.health().is_lost()
    }

    /// The offline renderer, if this output is offline
    pub fn offline(&self) -> Option<&OfflineOutput> {
        match self {
            OutputHandle::Offline(h) => Some(h),
            OutputHandle::Device(_) => None,
        }
    }
}

/// Create an engine wired to fresh command and event queues
pub(crate) fn create_engine(
    sample_rate: u32,
) -> (
    Arc<Mutex<RenderState>>,
    CommandSender,
    rtrb::Consumer<EngineEvent>,
    Arc<EngineAtomics>,
) {
    let atomics = Arc::new(EngineAtomics::new());
    let (event_tx, event_rx) = event_channel();
    let (command_tx, command_rx) = command_channel();

    let engine = MixEngine::new(sample_rate, Arc::clone(&atomics), event_tx);
    let state = Arc::new(Mutex::new(RenderState::new(engine, command_rx)));

    (
        state,
        CommandSender {
            producer: command_tx,
        },
        event_rx,
        atomics,
    )
}

/// Open the output described by `config`
pub fn start_output(config: &OutputConfig) -> AudioResult<OutputLink> {
    match config.backend {
        OutputBackend::Device => super::cpal_backend::start_device_output(config),
        OutputBackend::Offline => Ok(super::offline_backend::start_offline_output(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GainPath;

    #[test]
    fn test_command_sender_reports_full_queue() {
        let (_state, mut sender, _events, _atomics) = create_engine(48000);
        let mut sent = 0;
        while sender
            .send(EngineCommand::SetGain { path: GainPath::Master, value: 1.0 })
            .is_ok()
        {
            sent += 1;
        }
        assert_eq!(sent, crate::engine::COMMAND_QUEUE_CAPACITY);
        assert_eq!(sender.slots(), 0);
    }

    #[test]
    fn test_health_keeps_first_reason() {
        let health = OutputHealth::new();
        assert!(!health.is_lost());
        health.mark_lost("unplugged");
        health.mark_lost("second");
        assert!(health.is_lost());
        assert_eq!(health.reason().as_deref(), Some("unplugged"));
    }
}
