//! Full-screen dashboard loop: redraw on a tick, quit on `q`/Esc/Ctrl-C.

use std::io;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};
use ratatui::backend::CrosstermBackend;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::crossterm::{cursor, execute, terminal};
use ratatui::layout::{Constraint, Layout};
use ratatui::text::Line;
use ratatui::widgets::{Block, BorderType, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use ttydash_core::DashboardCoordinator;
use ttydash_core::media::MediaHandle;

use crate::render::{self, RenderOptions};

const KEY_POLL: Duration = Duration::from_millis(200);

/// What the loop draws.
pub struct View<'a> {
    pub dashboard: Option<&'a DashboardCoordinator>,
    pub media: Option<&'a MediaHandle>,
    pub station: &'a str,
    pub options: RenderOptions,
    pub show_debug_info: bool,
}

impl View<'_> {
    /// One column of lines per panel, then the media pane.
    pub fn panes(&self) -> Vec<Vec<Line<'static>>> {
        let mut panes = Vec::new();
        if let Some(dashboard) = self.dashboard {
            panes.extend(
                dashboard
                    .snapshot()
                    .iter()
                    .map(|snapshot| render::panel(snapshot, self.station, &self.options)),
            );
        }
        if let Some(media) = self.media {
            panes.push(render::media_pane(&media.snapshot()));
        }
        panes
    }
}

fn rounded() -> Block<'static> {
    Block::bordered()
        .border_type(BorderType::Rounded)
        .padding(Padding::horizontal(1))
}

/// Clock on top, panes side by side in equal columns, optional footer.
/// Pane content past its box is clipped.
fn draw(frame: &mut Frame, panes: Vec<Vec<Line<'static>>>, show_debug_info: bool, now: DateTime<Local>) {
    let area = frame.area();
    let outer = rounded();
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let footer_height = u16::from(show_debug_info);
    let [header, body, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(footer_height),
    ])
    .areas(inner);
    frame.render_widget(Paragraph::new(render::clock(now)), header);

    let count = u32::try_from(panes.len()).unwrap_or(u32::MAX);
    let columns = Layout::horizontal(panes.iter().map(|_| Constraint::Ratio(1, count))).split(body);
    for (lines, column) in panes.into_iter().zip(columns.iter()) {
        frame.render_widget(Paragraph::new(lines).block(rounded()), *column);
    }

    if show_debug_info {
        frame.render_widget(Paragraph::new(render::debug_footer(area.width, area.height)), footer);
    }
}

enum Action {
    Quit,
    Refresh,
    Ignore,
}

fn action(key: KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::Ignore;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('r') => Action::Refresh,
        _ => Action::Ignore,
    }
}

/// Raw mode and the alternate screen, restored on drop.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), terminal::EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Key events are read on a blocking thread and forwarded until `cancel`.
fn spawn_key_reader(cancel: CancellationToken) -> mpsc::Receiver<KeyEvent> {
    let (tx, rx) = mpsc::channel(16);
    tokio::task::spawn_blocking(move || {
        while !cancel.is_cancelled() {
            match event::poll(KEY_POLL) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) => {
                        if tx.blocking_send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Reading terminal events failed");
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Polling terminal events failed");
                    break;
                }
            }
        }
    });
    rx
}

/// Redraw every `period` until the user quits or `cancel` fires.
pub async fn run(view: View<'_>, period: Duration, cancel: CancellationToken) -> Result<()> {
    let _guard = TerminalGuard::enter()?;
    let mut keys = spawn_key_reader(cancel.child_token());
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(50)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            () = cancel.cancelled() => break Ok(()),
            _ = tokio::signal::ctrl_c() => break Ok(()),
            key = keys.recv() => match key.map(action) {
                Some(Action::Quit) | None => break Ok(()),
                Some(Action::Refresh) => {
                    if let Some(dashboard) = view.dashboard {
                        dashboard.refresh_all();
                    }
                }
                Some(Action::Ignore) => {}
            },
            _ = ticker.tick() => {
                let panes = view.panes();
                let show_debug_info = view.show_debug_info;
                if let Err(e) = terminal.draw(|frame| draw(frame, panes, show_debug_info, Local::now())) {
                    break Err(e.into());
                }
            }
        }
    };

    cancel.cancel();
    result
}
