//! Stream playback coordination.
//!
//! The coordinator owns the playback engine and lives on the owner loop (the
//! main UI loop). Redirect resolution runs on the tokio runtime; its result
//! and every engine callback come back as a [`Message`] on the coordinator's
//! queue and are handled in arrival order on the owner loop, so engine calls
//! are never interleaved.
//!
//! Each station selection opens a new session. Messages carry the session
//! they were produced for, and anything from a superseded session is dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineEvent, EngineEvents, PlaybackEngine};
use crate::error::{Error, ResolveError};
use crate::resolver::{RedirectResolver, Transport};
use crate::station::Station;

/// Lifecycle of one station selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Resolving,
    Preparing,
    Playing,
    Failed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Idle)
                | (_, Resolving)
                | (Resolving, Preparing)
                | (Preparing, Playing)
                | (Resolving, Failed)
                | (Preparing, Failed)
                | (Playing, Failed)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Resolving => "Resolving",
            SessionState::Preparing => "Buffering",
            SessionState::Playing => "Playing",
            SessionState::Failed => "Failed",
        }
    }
}

/// Completion messages posted to the owner loop.
#[derive(Debug)]
pub enum Message {
    Resolved {
        session: u64,
        result: Result<String, ResolveError>,
    },
    Engine {
        session: u64,
        event: EngineEvent,
    },
}

/// Snapshot for the UI.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub state: SessionState,
    /// Station whose session is current, if any
    pub selected: Option<Station>,
    /// Name shown as "now playing". Only changes once a stream starts.
    pub now_playing: Option<String>,
    /// Last failure, readable by a human
    pub notice: Option<String>,
}

pub struct Coordinator<E: PlaybackEngine, T: Transport + 'static> {
    engine: E,
    resolver: Arc<RedirectResolver<T>>,
    resolve_timeout: Duration,
    session: u64,
    state: SessionState,
    selected: Option<Station>,
    now_playing: Option<String>,
    notice: Option<String>,
    cancel: Option<CancellationToken>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    shut_down: bool,
}

impl<E: PlaybackEngine, T: Transport + 'static> Coordinator<E, T> {
    pub fn new(engine: E, resolver: RedirectResolver<T>, resolve_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            engine,
            resolver: Arc::new(resolver),
            resolve_timeout,
            session: 0,
            state: SessionState::Idle,
            selected: None,
            now_playing: None,
            notice: None,
            cancel: None,
            tx,
            rx,
            shut_down: false,
        }
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            selected: self.selected.clone(),
            now_playing: self.now_playing.clone(),
            notice: self.notice.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Start playing `station`, superseding whatever was selected before.
    ///
    /// The engine is reset before this returns; resolution continues in the
    /// background and the rest of the sequence runs from [`Self::handle`].
    pub fn play_stream(&mut self, station: Station) {
        if self.shut_down {
            warn!("Ignoring {} after shutdown", station.name);
            return;
        }

        self.cancel_pending();
        self.engine.reset();

        self.session += 1;
        let session = self.session;
        info!(session, "Selected {} ({})", station.name, station.url);

        self.notice = None;
        self.selected = Some(station.clone());
        self.transition(SessionState::Resolving);

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());

        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        let timeout = self.resolve_timeout;
        let seed = station.url;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!(session, "Resolution cancelled");
                    return;
                }
                result = tokio::time::timeout(timeout, resolver.resolve(&seed)) => {
                    result.unwrap_or_else(|_| {
                        Err(ResolveError::network(&seed, format!("timed out after {:?}", timeout)))
                    })
                }
            };
            let _ = tx.send(Message::Resolved { session, result });
        });
    }

    /// Stop the current session, whatever phase it is in.
    pub fn stop(&mut self) {
        if self.shut_down {
            return;
        }
        self.cancel_pending();
        self.engine.stop();
        self.engine.reset();
        // Late messages for the stopped session become stale
        self.session += 1;
        self.transition(SessionState::Idle);
        info!("Playback stopped");
    }

    /// Cancel in-flight work, stop playback and release the engine.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.cancel_pending();
        if self.engine.is_playing() {
            self.engine.stop();
        }
        self.engine.release();
        self.session += 1;
        self.state = SessionState::Idle;
        info!("Coordinator shut down");
    }

    /// Wait for the next completion message.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Apply one completion message on the owner loop.
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Resolved { session, result } => {
                if !self.is_current(session, SessionState::Resolving) {
                    debug!(session, current = self.session, "Dropping stale resolution");
                    return;
                }
                self.cancel = None;
                match result {
                    Ok(url) => self.begin_prepare(url),
                    Err(e) => self.fail(e.into()),
                }
            }
            Message::Engine { session, event } => {
                if self.shut_down || session != self.session {
                    debug!(session, current = self.session, ?event, "Dropping stale engine event");
                    return;
                }
                self.on_engine_event(event);
            }
        }
    }

    fn begin_prepare(&mut self, url: String) {
        info!(session = self.session, "Resolved stream URL: {}", url);

        if let Err(e) = self.engine.set_data_source(&url) {
            return self.fail(e.into());
        }
        self.transition(SessionState::Preparing);

        let events = EngineEvents::new(self.session, self.tx.clone());
        if let Err(e) = self.engine.prepare_async(events) {
            self.fail(e.into());
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Prepared => {
                if self.state != SessionState::Preparing {
                    debug!(state = ?self.state, "Ignoring duplicate prepared event");
                    return;
                }
                debug!("Engine prepared, starting playback");
                if let Err(e) = self.engine.start() {
                    return self.fail(e.into());
                }
                self.transition(SessionState::Playing);
                self.now_playing = self.selected.as_ref().map(|s| s.name.clone());
            }
            EngineEvent::Error(e) => self.fail(e.into()),
            EngineEvent::Completed => {
                info!("Playback completed");
                self.engine.reset();
                self.transition(SessionState::Idle);
            }
        }
    }

    /// Report a failure and return the session (and engine) to idle.
    fn fail(&mut self, err: Error) {
        let name = self
            .selected
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("stream");
        error!(session = self.session, "{} failed: {}", name, err);

        self.notice = Some(format!("{} unavailable: {}", name, err));
        self.transition(SessionState::Failed);
        self.engine.reset();
        self.transition(SessionState::Idle);
    }

    fn is_current(&self, session: u64, expected: SessionState) -> bool {
        !self.shut_down && session == self.session && self.state == expected
    }

    fn cancel_pending(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!("Unexpected session transition {:?} -> {:?}", self.state, next);
        }
        debug!(session = self.session, "{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> u64 {
        self.session
    }
}

impl<E: PlaybackEngine, T: Transport + 'static> Drop for Coordinator<E, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
