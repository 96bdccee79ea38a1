//! Error types for stream resolution and playback.
//!
//! Each subsystem has its own `thiserror` enum; [`Error`] aggregates them for
//! callers that don't care which layer failed.

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the redirect resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The seed URL itself is unusable (unparsable or not http/https).
    #[error("invalid stream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// DNS, connect, TLS or timeout failure. Transient.
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// A redirect without a usable `Location` header.
    #[error("malformed redirect from {url}: {reason}")]
    MalformedRedirect { url: String, reason: String },

    /// The hop bound was exceeded (usually a redirect cycle).
    #[error("too many redirects from {seed} (limit {limit})")]
    RedirectLoop { seed: String, limit: usize },
}

impl ResolveError {
    pub fn network(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedRedirect {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures reported by (or about) the playback engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("engine failed to prepare stream: {0}")]
    EnginePrepare(String),

    #[error("playback failed: {0}")]
    EnginePlayback(String),

    #[error("no suitable player found (install ffmpeg or mpv)")]
    NoPlayer,

    #[error("engine has been released")]
    Released,
}
