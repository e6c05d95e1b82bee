use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle shared by the server and client engines. No reverse
/// transitions: `Created -> Running -> Stopping -> Disposed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Disposed = 3,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EngineState::Created,
            1 => EngineState::Running,
            2 => EngineState::Stopping,
            _ => EngineState::Disposed,
        }
    }
}

pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(initial: EngineState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub(crate) fn get(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}
