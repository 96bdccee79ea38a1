//! Playback engine backed by an external player process.
//!
//! Decoding and audio output are left to ffplay, mpv or (on macOS) curl piped
//! into afplay. One child process corresponds to one prepared session.

use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PlayerConfig;
use crate::engine::{EngineEvents, PlaybackEngine};
use crate::error::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerType {
    Ffplay,
    Mpv,
    Afplay,
}

impl PlayerType {
    pub fn name(self) -> &'static str {
        match self {
            PlayerType::Ffplay => "ffplay",
            PlayerType::Mpv => "mpv",
            PlayerType::Afplay => "curl + afplay",
        }
    }

    fn from_config(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ffplay" => Some(PlayerType::Ffplay),
            "mpv" => Some(PlayerType::Mpv),
            "afplay" => Some(PlayerType::Afplay),
            _ => None,
        }
    }

    fn is_available(self) -> bool {
        match self {
            PlayerType::Ffplay => Command::new("ffplay").arg("-version").output().is_ok(),
            PlayerType::Mpv => Command::new("mpv").arg("--version").output().is_ok(),
            PlayerType::Afplay => {
                cfg!(target_os = "macos")
                    && Command::new("afplay").arg("--help").output().is_ok()
                    && Command::new("curl").arg("--version").output().is_ok()
            }
        }
    }

    /// Pick the configured player if it is installed, else the first
    /// available one in ffplay, mpv, afplay order.
    pub fn detect(preferred: &str) -> Result<Self, PlaybackError> {
        if let Some(player) = Self::from_config(preferred) {
            if player.is_available() {
                return Ok(player);
            }
            warn!("Preferred player {} not found, falling back", player.name());
        }

        [PlayerType::Ffplay, PlayerType::Mpv, PlayerType::Afplay]
            .into_iter()
            .find(|p| p.is_available())
            .ok_or(PlaybackError::NoPlayer)
    }
}

fn build_player_args(player_type: PlayerType, stream_url: &str, volume: u32) -> (String, Vec<String>) {
    match player_type {
        PlayerType::Ffplay => (
            "ffplay".to_string(),
            vec![
                "-nodisp".to_string(),
                "-autoexit".to_string(),
                "-loglevel".to_string(),
                "quiet".to_string(),
                "-volume".to_string(),
                volume.to_string(),
                stream_url.to_string(),
            ],
        ),
        PlayerType::Mpv => (
            "mpv".to_string(),
            vec![
                "--no-video".to_string(),
                "--no-terminal".to_string(),
                format!("--volume={}", volume),
                stream_url.to_string(),
            ],
        ),
        PlayerType::Afplay => (
            // URL goes in as $1 so it is never parsed by the shell
            "sh".to_string(),
            vec![
                "-c".to_string(),
                "curl -s \"$1\" | afplay -".to_string(),
                "sh".to_string(),
                stream_url.to_string(),
            ],
        ),
    }
}

struct ChildHandle {
    /// Dropping this (or sending on it) makes the watcher stop the child.
    kill_tx: Option<oneshot::Sender<()>>,
    _task: JoinHandle<()>,
}

impl ChildHandle {
    fn kill(mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub struct ProcessEngine {
    player_type: PlayerType,
    volume: u32,
    prepare_grace: Duration,
    data_source: Option<String>,
    child: Option<ChildHandle>,
    playing: bool,
    released: bool,
}

impl ProcessEngine {
    pub fn new(player_type: PlayerType, config: &PlayerConfig) -> Self {
        info!("Using {} for playback", player_type.name());
        Self {
            player_type,
            volume: config.volume.min(100),
            prepare_grace: config.prepare_grace(),
            data_source: None,
            child: None,
            playing: false,
            released: false,
        }
    }

    fn kill_child(&mut self) {
        if let Some(child) = self.child.take() {
            child.kill();
        }
        self.playing = false;
    }
}

impl PlaybackEngine for ProcessEngine {
    fn reset(&mut self) {
        self.kill_child();
        self.data_source = None;
    }

    fn set_data_source(&mut self, url: &str) -> Result<(), PlaybackError> {
        if self.released {
            return Err(PlaybackError::Released);
        }
        self.data_source = Some(url.to_string());
        Ok(())
    }

    fn prepare_async(&mut self, events: EngineEvents) -> Result<(), PlaybackError> {
        if self.released {
            return Err(PlaybackError::Released);
        }
        let url = self
            .data_source
            .clone()
            .ok_or_else(|| PlaybackError::EnginePrepare("no data source".to_string()))?;

        // Never two players at once
        self.kill_child();

        let (cmd, args) = build_player_args(self.player_type, &url, self.volume);
        debug!("Spawning {} {:?}", cmd, args);
        let child = TokioCommand::new(&cmd)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::EnginePrepare(format!("failed to start {}: {}", cmd, e)))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let task = tokio::spawn(watch_child(child, kill_rx, self.prepare_grace, events));
        self.child = Some(ChildHandle {
            kill_tx: Some(kill_tx),
            _task: task,
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), PlaybackError> {
        if self.child.is_none() {
            return Err(PlaybackError::EnginePlayback("start called before prepare".to_string()));
        }
        // The player emits audio as soon as it has buffered; this only
        // records the transition.
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.kill_child();
    }

    fn release(&mut self) {
        self.reset();
        self.released = true;
    }

    fn is_playing(&self) -> bool {
        self.playing && self.child.is_some()
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.kill_child();
    }
}

/// Owns the child process for its whole life: reports preparation, then exit.
async fn watch_child(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    grace: Duration,
    events: EngineEvents,
) {
    tokio::select! {
        status = child.wait() => {
            let reason = match status {
                Ok(status) => format!("player exited during startup ({})", status),
                Err(e) => e.to_string(),
            };
            events.error(PlaybackError::EnginePrepare(reason));
            return;
        }
        _ = &mut kill_rx => {
            terminate(&mut child).await;
            return;
        }
        _ = tokio::time::sleep(grace) => events.prepared(),
    }

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => events.completed(),
            Ok(status) => events.error(PlaybackError::EnginePlayback(format!("player exited with {}", status))),
            Err(e) => events.error(PlaybackError::EnginePlayback(e.to_string())),
        },
        _ = &mut kill_rx => terminate(&mut child).await,
    }
}

/// SIGTERM first so the player can release the audio device, then kill.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            if tokio::time::timeout(Duration::from_millis(500), child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }
    }
    let _ = child.kill().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffplay_args() {
        let (cmd, args) = build_player_args(PlayerType::Ffplay, "http://a/stream", 70);
        assert_eq!(cmd, "ffplay");
        assert_eq!(args.last().map(String::as_str), Some("http://a/stream"));
        assert!(args.windows(2).any(|w| w == ["-volume", "70"]));
    }

    #[test]
    fn test_afplay_url_is_not_interpolated() {
        let url = "http://a/stream?x='; rm -rf ~'";
        let (cmd, args) = build_player_args(PlayerType::Afplay, url, 70);
        assert_eq!(cmd, "sh");
        assert!(!args[1].contains(url));
        assert_eq!(args[3], url);
    }

    #[test]
    fn test_player_from_config() {
        assert_eq!(PlayerType::from_config("MPV"), Some(PlayerType::Mpv));
        assert_eq!(PlayerType::from_config("auto"), None);
    }

    #[test]
    fn test_start_requires_prepare() {
        let mut engine = ProcessEngine::new(PlayerType::Ffplay, &PlayerConfig::default());
        assert!(matches!(engine.start(), Err(PlaybackError::EnginePlayback(_))));
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_released_engine_refuses_data_source() {
        let mut engine = ProcessEngine::new(PlayerType::Mpv, &PlayerConfig::default());
        engine.release();
        assert_eq!(engine.set_data_source("http://a/stream"), Err(PlaybackError::Released));
    }

    #[tokio::test]
    async fn test_prepare_without_source_fails() {
        let mut engine = ProcessEngine::new(PlayerType::Ffplay, &PlayerConfig::default());
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let result = engine.prepare_async(EngineEvents::new(1, tx));
        assert!(matches!(result, Err(PlaybackError::EnginePrepare(_))));
    }

    // The curl | afplay pipeline runs under sh, which exists on any unix box.
    // Without afplay (or without a server) the pipeline exits inside the
    // grace period, so the watcher must report a prepare error.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_prepare_with_source_spawns_player() {
        use crate::coordinator::Message;
        use crate::engine::EngineEvent;

        let config = PlayerConfig {
            prepare_grace_ms: 10_000,
            ..PlayerConfig::default()
        };
        let mut engine = ProcessEngine::new(PlayerType::Afplay, &config);
        engine.set_data_source("http://127.0.0.1:1/stream").unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        engine.prepare_async(EngineEvents::new(7, tx)).unwrap();
        assert!(engine.child.is_some());
        assert_eq!(engine.data_source.as_deref(), Some("http://127.0.0.1:1/stream"));

        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no engine event")
            .expect("channel closed");
        match message {
            Message::Engine { session, event: EngineEvent::Error(PlaybackError::EnginePrepare(reason)) } => {
                assert_eq!(session, 7);
                assert!(reason.contains("during startup"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(engine.start().is_ok());
        engine.reset();
        assert!(engine.child.is_none());
        assert!(!engine.is_playing());
    }
}
