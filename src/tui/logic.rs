//! Key handling of the dashboard. Pure state transitions; anything that touches
//! the stores is returned as an [`Action`] for the event loop to run.

use chrono::NaiveDate;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Shifts,
    Roster,
    Memos,
}

impl View {
    pub const ALL: [View; 3] = [View::Shifts, View::Roster, View::Memos];

    pub fn title(&self) -> &'static str {
        match self {
            View::Shifts => "Shifts",
            View::Roster => "Roster",
            View::Memos => "Memos",
        }
    }

    pub fn index(&self) -> usize {
        View::ALL.iter().position(|v| v == self).unwrap_or(0)
    }

    fn step(&self, forward: bool) -> View {
        let len = View::ALL.len();
        let i = self.index();
        View::ALL[if forward { (i + 1) % len } else { (i + len - 1) % len }]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    MemoAuthor,
    MemoNote,
    Password,
}

impl InputMode {
    pub fn prompt(&self) -> &'static str {
        match self {
            InputMode::Normal => "",
            InputMode::Search => "Search name: ",
            InputMode::MemoAuthor => "Author: ",
            InputMode::MemoNote => "Memo: ",
            InputMode::Password => "Admin password: ",
        }
    }
}

/// Work for the event loop after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    /// Selection changed; reload the visible data.
    Reload,
    Sync,
    AddMemo { author: String, note: String },
    DeleteMemo { index: usize },
    Unlock { secret: String },
    Export,
}

#[derive(Debug, Clone)]
pub struct UiState {
    pub session: Session,
    pub view: View,
    pub mode: InputMode,
    pub input: String,
    pub search: String,
    pub memo_author: String,
    pub memo_selected: usize,
    pub memo_count: usize,
    pub roster_offset: usize,
    pub roster_rows: usize,
}

impl UiState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            view: View::Shifts,
            mode: InputMode::Normal,
            input: String::new(),
            search: String::new(),
            memo_author: String::new(),
            memo_selected: 0,
            memo_count: 0,
            roster_offset: 0,
            roster_rows: 0,
        }
    }

    /// Masked input for the password prompt.
    pub fn visible_input(&self) -> String {
        match self.mode {
            InputMode::Password => "*".repeat(self.input.chars().count()),
            _ => self.input.clone(),
        }
    }

    /// Keeps list selections inside freshly loaded data.
    pub fn clamp_selections(&mut self) {
        self.memo_selected = self.memo_selected.min(self.memo_count.saturating_sub(1));
        self.roster_offset = self.roster_offset.min(self.roster_rows.saturating_sub(1));
    }

    fn begin_input(&mut self, mode: InputMode, initial: &str) {
        self.mode = mode;
        self.input = initial.to_string();
    }

    fn end_input(&mut self) -> String {
        self.mode = InputMode::Normal;
        std::mem::take(&mut self.input)
    }
}

pub fn handle_key(state: &mut UiState, key: KeyEvent, today: NaiveDate) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Action::Quit;
    }
    match state.mode {
        InputMode::Normal => handle_normal_key(state, key, today),
        _ => handle_input_key(state, key),
    }
}

fn handle_normal_key(state: &mut UiState, key: KeyEvent, today: NaiveDate) -> Action {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Tab => {
            state.view = state.view.step(true);
            Action::None
        }
        KeyCode::BackTab => {
            state.view = state.view.step(false);
            Action::None
        }
        KeyCode::Char('t') => {
            state.session.cycle_team(true);
            Action::Reload
        }
        KeyCode::Char('T') => {
            state.session.cycle_team(false);
            Action::Reload
        }
        KeyCode::Left | KeyCode::Char('h') => {
            state.session.shift_date(-1);
            Action::Reload
        }
        KeyCode::Right | KeyCode::Char('l') => {
            state.session.shift_date(1);
            Action::Reload
        }
        KeyCode::Char('[') => {
            state.session.shift_month(-1, today);
            Action::Reload
        }
        KeyCode::Char(']') => {
            state.session.shift_month(1, today);
            Action::Reload
        }
        KeyCode::Char('g') => {
            state.session.select_today(today);
            Action::Reload
        }
        KeyCode::Up | KeyCode::Char('k') => {
            match state.view {
                View::Memos => state.memo_selected = state.memo_selected.saturating_sub(1),
                View::Roster => state.roster_offset = state.roster_offset.saturating_sub(1),
                View::Shifts => {}
            }
            Action::None
        }
        KeyCode::Down | KeyCode::Char('j') => {
            match state.view {
                View::Memos => state.memo_selected += 1,
                View::Roster => state.roster_offset += 1,
                View::Shifts => {}
            }
            state.clamp_selections();
            Action::None
        }
        KeyCode::Char('/') => {
            state.view = View::Roster;
            let current = state.search.clone();
            state.begin_input(InputMode::Search, &current);
            Action::None
        }
        KeyCode::Char('m') => {
            state.view = View::Memos;
            let author = state.memo_author.clone();
            state.begin_input(InputMode::MemoAuthor, &author);
            Action::None
        }
        KeyCode::Char('a') => {
            state.begin_input(InputMode::Password, "");
            Action::None
        }
        KeyCode::Char('L') => {
            state.session.lock();
            Action::None
        }
        KeyCode::Char('d') if state.view == View::Memos && state.memo_count > 0 => {
            Action::DeleteMemo {
                index: state.memo_selected,
            }
        }
        KeyCode::Char('s') => Action::Sync,
        KeyCode::Char('e') => Action::Export,
        KeyCode::Char('r') => Action::Reload,
        _ => Action::None,
    }
}

fn handle_input_key(state: &mut UiState, key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Esc => {
            state.end_input();
            Action::None
        }
        KeyCode::Backspace => {
            state.input.pop();
            if state.mode == InputMode::Search {
                state.search = state.input.clone();
                state.roster_offset = 0;
                return Action::Reload;
            }
            Action::None
        }
        KeyCode::Char(c) => {
            state.input.push(c);
            if state.mode == InputMode::Search {
                state.search = state.input.clone();
                state.roster_offset = 0;
                return Action::Reload;
            }
            Action::None
        }
        KeyCode::Enter => match state.mode {
            InputMode::Search => {
                state.search = state.end_input();
                Action::Reload
            }
            InputMode::MemoAuthor => {
                state.memo_author = state.end_input().trim().to_string();
                state.begin_input(InputMode::MemoNote, "");
                Action::None
            }
            InputMode::MemoNote => {
                let note = state.end_input();
                Action::AddMemo {
                    author: state.memo_author.clone(),
                    note,
                }
            }
            InputMode::Password => Action::Unlock {
                secret: state.end_input(),
            },
            InputMode::Normal => Action::None,
        },
        _ => Action::None,
    }
}
