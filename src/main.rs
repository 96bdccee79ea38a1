mod config;
mod coordinator;
mod detect;
mod engine;
mod error;
mod player;
mod resolver;
mod station;
#[cfg(test)]
mod test_utils;
mod ui;

use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::{cursor::{Hide, Show, MoveTo}, execute};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::coordinator::{Coordinator, SessionState};
use crate::detect::{SongDetector, UnavailableDetector};
use crate::player::{PlayerType, ProcessEngine};
use crate::resolver::{HttpTransport, RedirectResolver};
use crate::ui::{draw_ui, UiState};

type RadioCoordinator = Coordinator<ProcessEngine, HttpTransport>;
type Tui = Terminal<CrosstermBackend<std::io::Stdout>>;

/// Terminal internet radio player
#[derive(Debug, Parser)]
#[command(name = "if-radio", version, about)]
struct Cli {
    /// Config file (default: <config dir>/if-radio/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Start playing station N (1-based) right away
    #[arg(short, long)]
    station: Option<usize>,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,

    /// Log file (default: <data dir>/if-radio/if-radio.log)
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Follow redirects for URL, print the final stream URL and exit
    Resolve { url: String },
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "if_radio=debug" } else { "if_radio=info" }))
}

/// Log to a file so the TUI owns the terminal.
fn setup_file_logging(cli: &Cli) -> error::Result<tracing_appender::non_blocking::WorkerGuard> {
    let path = match &cli.log_file {
        Some(path) => path.clone(),
        None => dirs::data_local_dir()
            .map(|d| d.join("if-radio"))
            .unwrap_or_default()
            .join("if-radio.log"),
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_env_filter(env_filter(cli.debug))
        .init();

    info!("Logging to {:?}", path);
    Ok(guard)
}

/// An explicit `--config` file must load; the default location falls back to
/// defaults.
fn load_config(cli: &Cli) -> error::Result<Config> {
    match &cli.config {
        Some(path) => Ok(config::load_from(path)?),
        None => Ok(config::load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Resolve { url }) = &cli.command {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter(cli.debug))
            .init();
        let config = load_config(&cli)?;
        let resolver = RedirectResolver::new(
            HttpTransport::new(&config.resolver)?,
            config.resolver.max_redirects,
        );
        let final_url = resolver.resolve(url).await?;
        println!("{}", final_url);
        return Ok(());
    }

    let _guard = setup_file_logging(&cli)?;
    info!("Starting if-radio {}", env!("CARGO_PKG_VERSION"));
    let config = load_config(&cli)?;

    // Detect available player
    let player_type = match PlayerType::detect(&config.player.preferred) {
        Ok(player_type) => player_type,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: No suitable player found");
            eprintln!("Please install one of the following:");
            if cfg!(target_os = "macos") {
                eprintln!("  macOS: brew install ffmpeg or brew install mpv");
            } else {
                eprintln!("  Linux: sudo apt-get install ffmpeg or sudo apt-get install mpv");
            }
            return Err(e.into());
        }
    };

    let engine = ProcessEngine::new(player_type, &config.player);
    let resolver = RedirectResolver::new(
        HttpTransport::new(&config.resolver)?,
        config.resolver.max_redirects,
    );
    let mut coordinator = Coordinator::new(engine, resolver, config.resolver.resolve_timeout());

    // Enable raw mode for keyboard input
    enable_raw_mode()?;
    {
        let mut stdout = std::io::stdout();
        let _ = execute!(stdout, Hide, Clear(ClearType::All), MoveTo(0, 0));
    }
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run(&mut terminal, &mut coordinator, &config, player_type, cli.station).await;

    // Engine teardown happens on every exit path, before the terminal is handed back
    coordinator.shutdown();

    // Restore terminal
    terminal.clear()?;
    disable_raw_mode()?;
    {
        let mut stdout = std::io::stdout();
        let _ = execute!(stdout, Show);
    }

    if let Err(e) = &result {
        error!("Exiting with error: {:#}", e);
    }
    info!("if-radio exiting");
    result
}

/// Read key presses on a blocking thread and forward them to the owner loop.
fn spawn_key_reader(stop: Arc<AtomicBool>) -> mpsc::UnboundedReceiver<(KeyCode, KeyModifiers)> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(KeyEvent { code, kind, modifiers, .. })) = event::read() {
                    if kind == KeyEventKind::Press && tx.send((code, modifiers)).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

async fn run(
    terminal: &mut Tui,
    coordinator: &mut RadioCoordinator,
    config: &Config,
    player_type: PlayerType,
    autoplay: Option<usize>,
) -> anyhow::Result<()> {
    let stations = &config.stations;
    let mut ui_state = UiState::new(player_type.name());
    let mut playing_since: Option<Instant> = None;

    if let Some(index) = autoplay {
        match index.checked_sub(1).and_then(|i| stations.get(i)) {
            Some(station) => {
                ui_state.cursor = index - 1;
                coordinator.play_stream(station.clone());
            }
            None => ui_state.message = Some(format!("No station {}", index)),
        }
    }

    let detector: Arc<dyn SongDetector> = Arc::new(UnavailableDetector);
    let (detect_tx, mut detect_rx) = mpsc::unbounded_channel();

    let stop_keys = Arc::new(AtomicBool::new(false));
    let mut keys = spawn_key_reader(Arc::clone(&stop_keys));

    // Handle Ctrl+C
    #[cfg(unix)]
    let mut ctrl_c = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        ui_state.status = coordinator.status();
        match (coordinator.state(), playing_since) {
            (SessionState::Playing, None) => playing_since = Some(Instant::now()),
            (SessionState::Playing, Some(_)) => {}
            _ => playing_since = None,
        }
        ui_state.elapsed = playing_since.map(|t| t.elapsed()).unwrap_or_default();
        draw_ui(terminal, &ui_state, stations)?;

        #[cfg(unix)]
        let interrupted = ctrl_c.recv();
        #[cfg(not(unix))]
        let interrupted = tokio::signal::ctrl_c();

        tokio::select! {
            _ = interrupted => {
                info!("Interrupted");
                break;
            }
            Some(message) = coordinator.next_message() => {
                coordinator.handle(message);
            }
            Some(result) = detect_rx.recv() => {
                ui_state.message = Some(detect::describe(&result));
            }
            Some((key_code, modifiers)) = keys.recv() => {
                match key_code {
                    KeyCode::Up => ui_state.cursor_up(stations.len()),
                    KeyCode::Down => ui_state.cursor_down(stations.len()),
                    KeyCode::Enter => {
                        if let Some(station) = stations.get(ui_state.cursor) {
                            coordinator.play_stream(station.clone());
                        }
                    }
                    KeyCode::Char(c @ '1'..='9') => {
                        let index = c as usize - '1' as usize;
                        if let Some(station) = stations.get(index) {
                            ui_state.cursor = index;
                            coordinator.play_stream(station.clone());
                        }
                    }
                    KeyCode::Char('s') | KeyCode::Char('S') => coordinator.stop(),
                    KeyCode::Char('d') | KeyCode::Char('D') => {
                        ui_state.message = Some("Listening...".to_string());
                        let detector = Arc::clone(&detector);
                        let tx = detect_tx.clone();
                        tokio::spawn(async move {
                            let _ = tx.send(detector.detect().await);
                        });
                    }
                    KeyCode::Char('q') | KeyCode::Char('Q') => break,
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => break,
                    _ => {}
                }
            }
            // Redraw for the elapsed counter
            _ = tick.tick() => {}
        }
    }

    stop_keys.store(true, Ordering::Relaxed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_parse_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "stations = \"not a list\"").unwrap();

        let cli = Cli::try_parse_from(["if-radio", "--config", path.to_str().unwrap()]).unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(matches!(err, error::Error::Config(config::ConfigError::Parse(..))));
    }

    #[test]
    fn test_explicit_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let cli = Cli::try_parse_from(["if-radio", "--config", path.to_str().unwrap()]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.stations, station::default_stations());
    }

    #[test]
    fn test_resolve_subcommand_parses() {
        let cli = Cli::try_parse_from(["if-radio", "resolve", "http://a/stream"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Resolve { ref url }) if url == "http://a/stream"));
    }
}
