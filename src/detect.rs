//! Song detection.
//!
//! Recognising the current song means recording a snippet and submitting it
//! to a recognition service. Neither exists here yet; the shipped detector
//! just reports that, and the UI surfaces the answer.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongInfo {
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectError {
    #[error("song detection is not available")]
    Unavailable,
}

#[async_trait]
pub trait SongDetector: Send + Sync {
    async fn detect(&self) -> Result<SongInfo, DetectError>;
}

/// Detector used until a recognition backend is wired in.
pub struct UnavailableDetector;

#[async_trait]
impl SongDetector for UnavailableDetector {
    async fn detect(&self) -> Result<SongInfo, DetectError> {
        tracing::debug!("Song detection requested, no backend configured");
        Err(DetectError::Unavailable)
    }
}

/// One-line text for the UI.
pub fn describe(result: &Result<SongInfo, DetectError>) -> String {
    match result {
        Ok(song) => format!("Detected: {} - {}", song.artist, song.title),
        Err(e) => format!("Detect song: {}", e),
    }
}
