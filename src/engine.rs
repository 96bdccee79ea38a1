//! Playback engine contract.
//!
//! The engine is a stateful black box owned by the coordinator and only ever
//! touched from the owner loop. The expected call sequence per session is
//! `reset -> set_data_source -> prepare_async`, followed by `start` once the
//! engine reports [`EngineEvent::Prepared`].

use tokio::sync::mpsc;

use crate::coordinator::Message;
use crate::error::PlaybackError;

pub trait PlaybackEngine {
    /// Drop the current data source and any session built on it.
    fn reset(&mut self);

    fn set_data_source(&mut self, url: &str) -> Result<(), PlaybackError>;

    /// Begin preparing the current data source. Completion is reported
    /// through `events`, never by the return value.
    fn prepare_async(&mut self, events: EngineEvents) -> Result<(), PlaybackError>;

    fn start(&mut self) -> Result<(), PlaybackError>;

    fn stop(&mut self);

    /// Stop and free everything. The engine refuses further sessions.
    fn release(&mut self);

    fn is_playing(&self) -> bool;
}

/// Callback notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Prepared,
    Error(PlaybackError),
    Completed,
}

/// Delivers engine callbacks to the owner queue, tagged with the session
/// they belong to.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    session: u64,
    tx: mpsc::UnboundedSender<Message>,
}

impl EngineEvents {
    pub fn new(session: u64, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { session, tx }
    }

    pub fn prepared(&self) {
        self.post(EngineEvent::Prepared);
    }

    pub fn error(&self, error: PlaybackError) {
        self.post(EngineEvent::Error(error));
    }

    pub fn completed(&self) {
        self.post(EngineEvent::Completed);
    }

    fn post(&self, event: EngineEvent) {
        // The owner may already be gone during shutdown
        let _ = self.tx.send(Message::Engine {
            session: self.session,
            event,
        });
    }
}
