use std::sync::Arc;

use serde::Serialize;

use crate::signaling::{ParticipantId, RoomToken};

/// User-visible call phase. Exactly one is active at a time and it is
/// the only externally observable progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallPhase {
    Idle,
    AcquiringMedia,
    CreatingRoom,
    WaitingForPeer,
    Joining,
    Negotiating,
    Connected,
    Error,
}

/// Events emitted by the core to embedding UI listeners.
#[derive(Debug, Clone)]
pub enum CallEvent {
    PhaseChanged(CallPhase),
    RoomReady(RoomToken),
    PeerJoined(ParticipantId),
    PeerLeft,
    MicrophoneMuted(bool),
    /// User-facing message ("peer left the call", "connection lost").
    StatusMessage(String),
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait CallEventListener: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<std::sync::RwLock<Vec<Arc<dyn CallEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(std::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn emit(&self, event: CallEvent) {
        let listeners = self.listeners.read().unwrap();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
