//! Session notifications and their subscribers

use crate::engine::EngineEvent;
use crate::types::Layer;

/// Something the caller may want to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    VocalLoopCompleted { loops: u32 },
    /// The recording played its last pass; the session keeps running
    VocalFinished,
    LayerSwapped { layer: Layer },
    Paused,
    Halted,
    /// The output device went away; the session is now Failed
    OutputLost { reason: String },
}

impl From<EngineEvent> for SessionEvent {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::VocalLoopCompleted { loops } => SessionEvent::VocalLoopCompleted { loops },
            EngineEvent::VocalFinished => SessionEvent::VocalFinished,
            EngineEvent::LayerSwapped { layer } => SessionEvent::LayerSwapped { layer },
            EngineEvent::Paused => SessionEvent::Paused,
            EngineEvent::Halted => SessionEvent::Halted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventHandler = Box<dyn FnMut(&SessionEvent)>;

pub(crate) type HandlerList = Vec<(SubscriptionId, EventHandler)>;

pub(crate) fn dispatch_to(handlers: &mut [(SubscriptionId, EventHandler)], event: &SessionEvent) {
    for (_, handler) in handlers.iter_mut() {
        handler(event);
    }
}

/// Registered callbacks, invoked in subscription order
#[derive(Default)]
pub(crate) struct HandlerTable {
    handlers: HandlerList,
    next_id: u64,
}

impl HandlerTable {
    pub(crate) fn subscribe(&mut self, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, handler));
        id
    }

    /// Returns whether `id` was registered
    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Move the handlers out for dispatch, keeping the id sequence here
    pub(crate) fn detach(&mut self) -> HandlerList {
        std::mem::take(&mut self.handlers)
    }

    /// Put detached handlers back ahead of any registered meanwhile
    pub(crate) fn restore(&mut self, mut detached: HandlerList) {
        detached.append(&mut self.handlers);
        self.handlers = detached;
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }
}
