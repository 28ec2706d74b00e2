pub mod logic;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Cell, List, ListItem, ListState, Paragraph, Row, Table, Tabs};
use ratatui::Frame;

use crate::app::{App, Notice, NoticeLevel, ShiftBoard};
use crate::error::GitError;
use crate::git::{CancelToken, PullOutcome};
use crate::layout::StoreKind;
use crate::sync::SyncSchedule;
use crate::types::{Memo, ShiftEntry, Table as RosterTable, Team};
use crate::utils;
use crate::watcher::FileWatcher;

use logic::{Action, InputMode, UiState, View};

const TICK: Duration = Duration::from_millis(250);

/// Data shown for the current selection, reloaded whenever it changes.
#[derive(Debug, Default)]
pub struct Loaded {
    pub board: Option<ShiftBoard>,
    pub roster: Option<RosterTable>,
    pub memos: Vec<Memo>,
}

/// Pull running on a worker thread. Starting another one cancels it.
struct PendingSync {
    cancel: CancelToken,
    rx: Receiver<Result<PullOutcome, GitError>>,
}

pub struct Dashboard {
    app: Arc<App>,
    pub state: UiState,
    pub loaded: Loaded,
    pub notice: Option<Notice>,
    schedule: SyncSchedule,
    pending: Option<PendingSync>,
    export_dir: PathBuf,
}

impl Dashboard {
    pub fn new(app: Arc<App>, team: Team, sync_interval: Duration) -> Self {
        let session = app.new_session(team);
        let mut dashboard = Self {
            app,
            state: UiState::new(session),
            loaded: Loaded::default(),
            notice: None,
            schedule: SyncSchedule::new(sync_interval),
            pending: None,
            export_dir: PathBuf::from("."),
        };
        dashboard.reload();
        dashboard
    }

    pub fn reload(&mut self) {
        let team = self.state.session.team();
        let period = self.state.session.period();
        let date = self.state.session.date();

        let board = self.app.shift_board(team, date);
        let roster = self.app.roster_view(team, period, &self.state.search);
        let memos = self.app.list_memos(team, period);

        let mut errors = Vec::new();
        self.loaded.board = board.map_err(|e| errors.push(e.to_string())).ok();
        self.loaded.roster = roster.map_err(|e| errors.push(e.to_string())).ok().flatten();
        self.loaded.memos = memos
            .map_err(|e| errors.push(e.to_string()))
            .unwrap_or_default();

        self.state.memo_count = self.loaded.memos.len();
        self.state.roster_rows = self.loaded.roster.as_ref().map_or(0, |t| t.rows.len());
        self.state.clamp_selections();

        if let Some(first) = errors.into_iter().next() {
            tracing::error!("reload failed: {first}");
            self.notice = Some(Notice::error(first));
        }
    }

    fn start_sync(&mut self) {
        if let Some(previous) = self.pending.take() {
            previous.cancel.cancel();
        }
        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let app = self.app.clone();
        let token = cancel.clone();
        std::thread::spawn(move || {
            let _ = tx.send(app.sync(&token));
        });
        self.pending = Some(PendingSync { cancel, rx });
        self.schedule.mark(Instant::now());
    }

    fn poll_sync(&mut self) {
        let Some(pending) = &self.pending else {
            return;
        };
        match pending.rx.try_recv() {
            Ok(result) => {
                self.pending = None;
                match result {
                    Ok(outcome) => {
                        let changed = !matches!(
                            outcome,
                            PullOutcome::UpToDate | PullOutcome::LocalOnly | PullOutcome::RemoteEmpty
                        );
                        self.notice = Some(Notice::from_pull(&outcome));
                        if changed {
                            self.reload();
                        }
                    }
                    Err(GitError::Cancelled) => {}
                    Err(e) => {
                        tracing::error!("sync failed: {e}");
                        self.notice = Some(Notice::error(format!("Sync failed: {e}")));
                    }
                }
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.pending = None,
        }
    }

    /// Periodic work between key presses.
    pub fn tick(&mut self, watcher: Option<&FileWatcher>) {
        if self.pending.is_none() && self.schedule.is_due(Instant::now()) {
            self.start_sync();
        }
        self.poll_sync();

        if let Some(watcher) = watcher {
            let (changed, errors) = watcher.drain();
            for e in errors {
                tracing::warn!("{e}");
            }
            let team = self.state.session.team();
            if changed
                .iter()
                .any(|(kind, t)| *t == team && *kind != StoreKind::Snapshot)
            {
                self.reload();
            }
        }
    }

    /// Runs one action. Returns `false` when the dashboard should exit.
    pub fn apply(&mut self, action: Action) -> bool {
        let session = &self.state.session;
        let (team, period) = (session.team(), session.period());

        match action {
            Action::None => {}
            Action::Quit => {
                if let Some(pending) = self.pending.take() {
                    pending.cancel.cancel();
                }
                return false;
            }
            Action::Reload => self.reload(),
            Action::Sync => {
                self.notice = Some(Notice::info("Syncing..."));
                self.start_sync();
            }
            Action::AddMemo { author, note } => {
                self.notice = Some(match self.app.add_memo(team, period, &note, &author) {
                    Ok(true) => Notice::success("Memo saved"),
                    Ok(false) => Notice::warning("Same memo already saved"),
                    Err(e) => Notice::error(e.to_string()),
                });
                self.reload();
            }
            Action::DeleteMemo { index } => {
                let Some(memo) = self.loaded.memos.get(index).cloned() else {
                    return true;
                };
                self.notice = Some(
                    match self
                        .app
                        .delete_memo(&self.state.session, team, period, &memo)
                    {
                        Ok(true) => Notice::success("Memo deleted"),
                        Ok(false) => Notice::warning("Memo was already gone"),
                        Err(e) => Notice::from_error(&e),
                    },
                );
                self.reload();
            }
            Action::Unlock { secret } => {
                let gate = self.app.gate().clone();
                self.notice = Some(if self.state.session.unlock(&gate, &secret) {
                    Notice::success(format!("{team} admin mode on"))
                } else if !gate.has_secret(team) {
                    Notice::error(format!("No admin secret configured for {team}"))
                } else {
                    Notice::error("Wrong password")
                });
            }
            Action::Export => {
                self.notice = Some(match self.app.export_roster(team, period) {
                    Ok((name, bytes)) => {
                        let path = self.export_dir.join(name);
                        match std::fs::write(&path, bytes) {
                            Ok(()) => Notice::success(format!("Exported {}", path.display())),
                            Err(e) => Notice::error(format!("Export failed: {e}")),
                        }
                    }
                    Err(e) => Notice::error(e.to_string()),
                });
            }
        }
        true
    }
}

pub fn run_tui(app: Arc<App>, team: Team, sync_interval: Duration) -> Result<()> {
    let watcher = match FileWatcher::new(app.layout()) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!("live reload disabled: {e}");
            None
        }
    };
    let mut dashboard = Dashboard::new(app, team, sync_interval);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(
        &mut terminal,
        &mut dashboard,
        watcher.as_ref(),
        event::poll,
        event::read,
        None,
    );

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

/// Event loop. `max_iterations` bounds the loop in tests.
pub fn run_app<B, P, R>(
    terminal: &mut Terminal<B>,
    dashboard: &mut Dashboard,
    watcher: Option<&FileWatcher>,
    mut poll: P,
    mut read: R,
    max_iterations: Option<usize>,
) -> Result<()>
where
    B: Backend,
    B::Error: std::error::Error + Send + Sync + 'static,
    P: FnMut(Duration) -> io::Result<bool>,
    R: FnMut() -> io::Result<Event>,
{
    let mut iterations = 0usize;
    loop {
        if max_iterations.is_some_and(|max| iterations >= max) {
            return Ok(());
        }
        iterations += 1;

        dashboard.tick(watcher);
        terminal.draw(|frame| draw_ui(frame, dashboard))?;

        if !poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = read()? {
            let today = dashboard.app.today();
            let action = logic::handle_key(&mut dashboard.state, key, today);
            if !dashboard.apply(action) {
                return Ok(());
            }
        }
    }
}

pub fn draw_ui(frame: &mut Frame, dashboard: &Dashboard) {
    let [header, tabs, body, footer] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(3),
    ])
    .areas(frame.area());

    draw_header(frame, header, dashboard);

    let titles: Vec<&str> = View::ALL.iter().map(|v| v.title()).collect();
    frame.render_widget(
        Tabs::new(titles)
            .select(dashboard.state.view.index())
            .highlight_style(Style::new().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        tabs,
    );

    match dashboard.state.view {
        View::Shifts => draw_shifts(frame, body, dashboard),
        View::Roster => draw_roster(frame, body, dashboard),
        View::Memos => draw_memos(frame, body, dashboard),
    }

    draw_footer(frame, footer, dashboard);
}

fn draw_header(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let session = &dashboard.state.session;
    let today = dashboard.app.today();
    let mut spans = vec![
        Span::styled(
            session.team().to_string(),
            Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(session.period().month_label()),
        Span::raw("  "),
        Span::raw(utils::format_date_for_display(session.date(), today)),
    ];
    if session.is_admin() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            "[ADMIN]",
            Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }
    if dashboard.pending.is_some() {
        spans.push(Span::styled("  syncing", Style::new().fg(Color::DarkGray)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(Block::bordered().title(" rosterboard ")),
        area,
    );
}

fn entry_items(entries: &[ShiftEntry]) -> Vec<ListItem<'static>> {
    entries
        .iter()
        .map(|e| ListItem::new(format!("{:<6} {} ({})", e.division, e.name, e.shift_code)))
        .collect()
}

fn draw_shifts(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let session = &dashboard.state.session;
    let message = match &dashboard.loaded.board {
        None => Some("Could not load the roster".to_string()),
        Some(ShiftBoard::NoRoster) => Some(format!(
            "No roster uploaded for {} {}",
            session.team(),
            session.period().month_label()
        )),
        Some(ShiftBoard::NoColumn(column)) => Some(format!("No column {column} in the roster")),
        Some(ShiftBoard::Ready { .. }) => None,
    };
    if let Some(message) = message {
        frame.render_widget(
            Paragraph::new(message).block(Block::bordered().title(" Shifts ")),
            area,
        );
        return;
    }
    let Some(ShiftBoard::Ready {
        buckets,
        legend_missing,
    }) = &dashboard.loaded.board
    else {
        return;
    };

    let title = if *legend_missing {
        format!(" {} (no legend) ", utils::board_title(session.team(), session.date()))
    } else {
        format!(" {} ", utils::board_title(session.team(), session.date()))
    };
    let outer = Block::bordered().title(title);
    let inner = outer.inner(area);
    frame.render_widget(outer, area);

    let columns = Layout::horizontal([Constraint::Ratio(1, 3); 3]).split(inner);
    let sections = [
        ("Day", &buckets.day, Color::Yellow),
        ("Night", &buckets.night, Color::Blue),
        ("Vacation", &buckets.vacation, Color::Green),
    ];
    for ((name, entries, color), column) in sections.into_iter().zip(columns.iter()) {
        let list = List::new(entry_items(entries)).block(
            Block::bordered()
                .title(format!(" {name} {} ", entries.len()))
                .border_style(Style::new().fg(color)),
        );
        frame.render_widget(list, *column);
    }
}

fn draw_roster(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let state = &dashboard.state;
    let title = if state.search.is_empty() {
        format!(" {} {} ", state.session.team(), state.session.period().month_label())
    } else {
        format!(
            " {} {} / {} ",
            state.session.team(),
            state.session.period().month_label(),
            state.search
        )
    };
    let Some(roster) = &dashboard.loaded.roster else {
        frame.render_widget(
            Paragraph::new("No roster uploaded for this month").block(Block::bordered().title(title)),
            area,
        );
        return;
    };

    let header = Row::new(roster.headers.iter().map(|h| Cell::from(h.clone())))
        .style(Style::new().add_modifier(Modifier::BOLD));
    let rows = roster
        .rows
        .iter()
        .skip(state.roster_offset)
        .map(|row| Row::new(row.iter().map(|c| Cell::from(c.clone()))));
    let widths: Vec<Constraint> = roster
        .headers
        .iter()
        .map(|h| Constraint::Length((h.chars().count() as u16 * 2).clamp(4, 12)))
        .collect();

    frame.render_widget(
        Table::new(rows, widths)
            .header(header)
            .block(Block::bordered().title(title)),
        area,
    );
}

fn draw_memos(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let title = format!(
        " {} - {} memos ",
        dashboard.state.session.team(),
        dashboard.state.session.period().month_label()
    );
    if dashboard.loaded.memos.is_empty() {
        frame.render_widget(
            Paragraph::new("No memos saved for this month").block(Block::bordered().title(title)),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = dashboard
        .loaded
        .memos
        .iter()
        .map(|memo| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    utils::format_memo_time(&memo.timestamp),
                    Style::new().fg(Color::DarkGray),
                ),
                Span::raw(" "),
                Span::styled(memo.author.clone(), Style::new().fg(Color::Cyan)),
                Span::raw(": "),
                Span::raw(memo.note.replace('\n', " ")),
            ]))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(dashboard.state.memo_selected));
    frame.render_stateful_widget(
        List::new(items)
            .block(Block::bordered().title(title))
            .highlight_style(Style::new().add_modifier(Modifier::REVERSED)),
        area,
        &mut list_state,
    );
}

fn draw_footer(frame: &mut Frame, area: Rect, dashboard: &Dashboard) {
    let state = &dashboard.state;
    let line = if state.mode != InputMode::Normal {
        Line::from(vec![
            Span::styled(state.mode.prompt(), Style::new().fg(Color::Yellow)),
            Span::raw(state.visible_input()),
            Span::styled("_", Style::new().add_modifier(Modifier::SLOW_BLINK)),
        ])
    } else if let Some(notice) = &dashboard.notice {
        let color = match notice.level {
            NoticeLevel::Info => Color::White,
            NoticeLevel::Success => Color::Green,
            NoticeLevel::Warning => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        Line::from(Span::styled(notice.message.clone(), Style::new().fg(color)))
    } else {
        Line::from(Span::styled(
            "q quit  tab view  t team  ←/→ day  [/] month  g today  / search  m memo  a admin  s sync  e export",
            Style::new().fg(Color::DarkGray),
        ))
    };
    frame.render_widget(Paragraph::new(line).block(Block::bordered()), area);
}
