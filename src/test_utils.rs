//! Test doubles for the resolver transport and the playback engine.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::{EngineEvents, PlaybackEngine};
use crate::error::{PlaybackError, ResolveError};
use crate::resolver::{Connection, Transport};

/// Canned behaviour for one URL.
#[derive(Debug, Clone)]
pub enum Route {
    Respond {
        status: u16,
        location: Option<String>,
    },
    Fail(String),
    /// Never answers
    Pending,
}

impl Route {
    pub fn status(status: u16) -> Self {
        Route::Respond {
            status,
            location: None,
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Route::Respond {
            status,
            location: Some(location.to_string()),
        }
    }

    pub fn redirect_without_location(status: u16) -> Self {
        Route::status(status)
    }

    pub fn fail(reason: &str) -> Self {
        Route::Fail(reason.to_string())
    }
}

/// In-memory transport that counts opened and closed connections.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, Route>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    pending: PendingRequests,
}

/// Counts requests parked on a [`Route::Pending`] and how many of them were
/// abandoned by their caller. Shared, so it stays readable after the
/// transport has been moved into a resolver.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    entered: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
}

impl PendingRequests {
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> PendingRequests {
        self.pending.clone()
    }
}

pub struct ScriptedConnection {
    status: u16,
    location: Option<String>,
    closed: Arc<AtomicUsize>,
}

impl Connection for ScriptedConnection {
    fn status(&self) -> u16 {
        self.status
    }

    fn location(&self) -> Option<&[u8]> {
        self.location.as_deref().map(str::as_bytes)
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn open(&self, url: &Url) -> Result<ScriptedConnection, ResolveError> {
        match self.routes.get(url.as_str()) {
            Some(Route::Respond { status, location }) => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(ScriptedConnection {
                    status: *status,
                    location: location.clone(),
                    closed: Arc::clone(&self.closed),
                })
            }
            Some(Route::Fail(reason)) => Err(ResolveError::network(url.as_str(), reason)),
            Some(Route::Pending) => {
                self.pending.entered.fetch_add(1, Ordering::SeqCst);
                let _guard = PendingGuard(Arc::clone(&self.pending.dropped));
                std::future::pending::<Result<ScriptedConnection, ResolveError>>().await
            }
            None => Err(ResolveError::network(url.as_str(), "no route to host")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Reset,
    SetDataSource(String),
    Prepare,
    Start,
    Stop,
    Release,
}

/// What [`RecordingEngine::prepare_async`] reports.
#[derive(Debug, Clone, Copy)]
pub enum PrepareOutcome {
    Prepared,
    Fail,
    /// Report nothing; the test fires events by hand
    Wait,
}

/// Engine that records its calls and panics if the call sequence breaks the
/// engine contract.
pub struct RecordingEngine {
    pub calls: Vec<EngineCall>,
    outcome: PrepareOutcome,
    events: Option<EngineEvents>,
    source: Option<String>,
    playing: bool,
    released: bool,
}

impl RecordingEngine {
    pub fn new(outcome: PrepareOutcome) -> Self {
        Self {
            calls: Vec::new(),
            outcome,
            events: None,
            source: None,
            playing: false,
            released: false,
        }
    }

    /// Event sink handed over by the latest `prepare_async`.
    pub fn events(&self) -> Option<EngineEvents> {
        self.events.clone()
    }
}

impl PlaybackEngine for RecordingEngine {
    fn reset(&mut self) {
        self.calls.push(EngineCall::Reset);
        self.source = None;
        self.playing = false;
    }

    fn set_data_source(&mut self, url: &str) -> Result<(), PlaybackError> {
        assert!(!self.released, "data source set on released engine");
        assert!(self.source.is_none(), "data source replaced without reset");
        self.calls.push(EngineCall::SetDataSource(url.to_string()));
        self.source = Some(url.to_string());
        Ok(())
    }

    fn prepare_async(&mut self, events: EngineEvents) -> Result<(), PlaybackError> {
        assert!(self.source.is_some(), "prepare without data source");
        self.calls.push(EngineCall::Prepare);
        match self.outcome {
            PrepareOutcome::Prepared => events.prepared(),
            PrepareOutcome::Fail => {
                events.error(PlaybackError::EnginePrepare("unsupported stream format".into()))
            }
            PrepareOutcome::Wait => {}
        }
        self.events = Some(events);
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        assert!(!self.playing, "engine started twice");
        assert!(self.source.is_some(), "start without data source");
        self.calls.push(EngineCall::Start);
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.push(EngineCall::Stop);
        self.playing = false;
    }

    fn release(&mut self) {
        self.calls.push(EngineCall::Release);
        self.released = true;
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}
