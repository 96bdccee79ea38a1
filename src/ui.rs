use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use std::time::Duration;

use crate::coordinator::{SessionState, Status};
use crate::station::Station;

pub struct UiState {
    /// Cursor position in the station list
    pub cursor: usize,
    pub status: Status,
    pub player_name: &'static str,
    /// Latest one-off message (song detection, etc.)
    pub message: Option<String>,
    /// Time since the current stream started playing
    pub elapsed: Duration,
}

impl UiState {
    pub fn new(player_name: &'static str) -> Self {
        Self {
            cursor: 0,
            status: Status::default(),
            player_name,
            message: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn cursor_up(&mut self, len: usize) {
        if len > 0 {
            self.cursor = if self.cursor == 0 { len - 1 } else { self.cursor - 1 };
        }
    }

    pub fn cursor_down(&mut self, len: usize) {
        if len > 0 {
            self.cursor = (self.cursor + 1) % len;
        }
    }
}

fn status_line(state: &UiState) -> String {
    let status = &state.status;
    let station = status.now_playing.as_deref().unwrap_or("-");

    let mut text = match status.state {
        SessionState::Playing => {
            let secs = state.elapsed.as_secs();
            format!(
                "Now playing: {} | {:02}:{:02}:{:02}",
                station,
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            )
        }
        SessionState::Resolving | SessionState::Preparing => {
            let target = status.selected.as_ref().map(|s| s.name.as_str()).unwrap_or("-");
            format!("{} {}... | Last: {}", status.state.label(), target, station)
        }
        SessionState::Idle | SessionState::Failed => format!("{} | Last: {}", status.state.label(), station),
    };
    text.push_str(&format!(" | Player: {}", state.player_name));

    if let Some(notice) = &status.notice {
        text.push('\n');
        text.push_str(notice);
    }
    if let Some(message) = &state.message {
        text.push('\n');
        text.push_str(message);
    }
    text
}

pub fn draw_ui<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &UiState,
    stations: &[Station],
) -> std::io::Result<()> {
    terminal.draw(|f| {
        let size = f.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(stations.len() as u16 + 2),
                Constraint::Length(5),
                Constraint::Min(0),
            ])
            .split(size);

        let playing = state.status.selected.as_ref();

        // Stations list
        let items: Vec<ListItem> = stations
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let style = if Some(s) == playing {
                    Style::default().fg(Color::Green)
                } else if i == state.cursor {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                };
                ListItem::new(format!(
                    "{} {}. {}",
                    if i == state.cursor { "->" } else { "  " },
                    i + 1,
                    s.name
                ))
                .style(style)
            })
            .collect();
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Stations"));
        f.render_widget(list, chunks[0]);

        let status = Paragraph::new(status_line(state))
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[1]);

        let controls_text = "Controls:\nUp/Down: Select | Enter or 1-9: Play | s: Stop\nd: Detect song | q: Quit";
        let controls = Paragraph::new(controls_text)
            .block(Block::default().borders(Borders::ALL).title("Controls"));
        f.render_widget(controls, chunks[2]);
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_wraps() {
        let mut state = UiState::new("ffplay");
        state.cursor_up(4);
        assert_eq!(state.cursor, 3);
        state.cursor_down(4);
        assert_eq!(state.cursor, 0);
        state.cursor_down(0);
        assert_eq!(state.cursor, 0);
    }

    #[test]
    fn test_status_line_playing() {
        let mut state = UiState::new("mpv");
        state.status.state = SessionState::Playing;
        state.status.now_playing = Some("Radio Siamsa".into());
        state.elapsed = Duration::from_secs(3725);

        assert_eq!(
            status_line(&state),
            "Now playing: Radio Siamsa | 01:02:05 | Player: mpv"
        );
    }

    #[test]
    fn test_status_line_shows_failure() {
        let mut state = UiState::new("ffplay");
        state.status.now_playing = Some("Svensk Folk".into());
        state.status.notice = Some("Radio Folk unavailable: too many redirects".into());

        let text = status_line(&state);
        assert!(text.starts_with("Idle | Last: Svensk Folk"));
        assert!(text.ends_with("Radio Folk unavailable: too many redirects"));
    }
}
