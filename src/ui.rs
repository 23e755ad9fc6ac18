use crate::controller::PendingTermination;
use crate::filter::FilterSpec;
use crate::port::{PortRecord, Snapshot};
use crate::session::{Command, Reply};
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};
use serde::{Deserialize, Serialize};

/// Color scheme. Presentation-only, never seen by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Dark,
    #[default]
    Light,
}

impl ThemeMode {
    pub fn toggle(self) -> Self {
        match self {
            ThemeMode::Dark => ThemeMode::Light,
            ThemeMode::Light => ThemeMode::Dark,
        }
    }

    fn palette(self) -> Palette {
        match self {
            ThemeMode::Dark => Palette {
                fg: Color::White,
                bg: Color::Black,
                accent: Color::Cyan,
                key: Color::Yellow,
                selection: Color::DarkGray,
                muted: Color::Gray,
                danger: Color::LightRed,
            },
            ThemeMode::Light => Palette {
                fg: Color::Black,
                bg: Color::White,
                accent: Color::Blue,
                key: Color::Magenta,
                selection: Color::LightBlue,
                muted: Color::DarkGray,
                danger: Color::Red,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    fg: Color,
    bg: Color,
    accent: Color,
    key: Color,
    selection: Color,
    muted: Color,
    danger: Color,
}

impl Palette {
    fn base(&self) -> Style {
        Style::default().fg(self.fg).bg(self.bg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    PortFilter,
    NameFilter,
}

/// What the event loop should do after a key press
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    None,
    Quit,
    Send(Command),
}

pub struct DetailView {
    pub pid: u32,
    pub lines: Vec<String>,
    pub scroll: u16,
}

pub struct AppState {
    pub rows: Vec<PortRecord>,
    pub table_state: TableState,
    pub input_mode: InputMode,
    pub port_input: String,
    pub name_input: String,
    pub status_message: String,
    pub show_help: bool,
    pub detail: Option<DetailView>,
    pub confirm: Option<PendingTermination>,
    pub theme: ThemeMode,
    pub last_updated: Option<DateTime<Local>>,
    pub total_records: usize,
    pub max_open_files: usize,
    pub polling: bool,
}

impl AppState {
    pub fn new(theme: ThemeMode, filter: &FilterSpec, max_open_files: usize) -> Self {
        Self {
            rows: Vec::new(),
            table_state: TableState::default(),
            input_mode: InputMode::Normal,
            port_input: filter.port.clone().unwrap_or_default(),
            name_input: filter.process_name.clone().unwrap_or_default(),
            status_message: String::from("portwatch started. Press 'h' for help."),
            show_help: false,
            detail: None,
            confirm: None,
            theme,
            last_updated: None,
            total_records: 0,
            max_open_files,
            polling: false,
        }
    }

    pub fn filter_spec(&self) -> FilterSpec {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        FilterSpec::new(non_empty(&self.port_input), non_empty(&self.name_input))
    }

    /// Replace the rows, keeping the selected connection selected if it survived
    pub fn set_rows(&mut self, rows: Vec<PortRecord>) {
        let selected_key = self.selected().map(PortRecord::key);
        self.rows = rows;

        if self.rows.is_empty() {
            self.table_state.select(None);
            return;
        }

        let index = selected_key
            .and_then(|key| self.rows.iter().position(|r| r.key() == key))
            .or_else(|| {
                self.table_state
                    .selected()
                    .map(|i| i.min(self.rows.len() - 1))
            });
        self.table_state.select(index);
    }

    pub fn on_snapshot(&mut self, snapshot: &Snapshot, rows: Vec<PortRecord>) {
        self.total_records = snapshot.len();
        self.last_updated = Some(snapshot.captured_at);
        self.set_rows(rows);
        self.status_message = format!(
            "Showing {} of {} connection(s)",
            self.rows.len(),
            self.total_records
        );
    }

    pub fn on_poll_failed(&mut self, message: &str) {
        self.status_message = format!("Refresh failed: {}", message);
    }

    pub fn selected(&self) -> Option<&PortRecord> {
        self.table_state
            .selected()
            .and_then(|idx| self.rows.get(idx))
    }

    pub fn select_next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let next = match self.table_state.selected() {
            None => 0,
            Some(idx) => (idx + 1) % self.rows.len(),
        };
        self.table_state.select(Some(next));
    }

    pub fn select_previous(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        let previous = match self.table_state.selected() {
            None | Some(0) => self.rows.len() - 1,
            Some(idx) => idx - 1,
        };
        self.table_state.select(Some(previous));
    }

    fn select_edge(&mut self, last: bool) {
        if self.rows.is_empty() {
            return;
        }
        let index = if last { self.rows.len() - 1 } else { 0 };
        self.table_state.select(Some(index));
    }

    pub fn apply_reply(&mut self, reply: Reply) {
        match reply {
            Reply::Refreshing => self.status_message = "Refreshing...".to_string(),
            Reply::AlreadyRefreshing => {
                self.status_message = "Refresh already in progress".to_string()
            }
            Reply::Rows(rows) => {
                self.set_rows(rows);
                self.status_message = format!(
                    "Filter: {} ({} of {} shown)",
                    self.filter_spec().describe(),
                    self.rows.len(),
                    self.total_records
                );
            }
            Reply::Detail(pid, Some(detail)) => {
                self.detail = Some(DetailView {
                    pid,
                    lines: detail.lines(self.max_open_files),
                    scroll: 0,
                });
            }
            Reply::Detail(pid, None) => {
                self.status_message = format!("Process {} no longer exists", pid);
            }
            Reply::Confirm(pending) => self.confirm = Some(pending),
            Reply::Terminated(outcome) => self.status_message = outcome.to_string(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> UiAction {
        if key.kind != KeyEventKind::Press {
            return UiAction::None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return UiAction::Quit;
        }

        // If help is shown, any key closes it
        if self.show_help {
            self.show_help = false;
            return UiAction::None;
        }

        if self.confirm.is_some() {
            return self.handle_confirm_key(key);
        }

        if self.detail.is_some() {
            self.handle_detail_key(key);
            return UiAction::None;
        }

        match self.input_mode {
            InputMode::PortFilter | InputMode::NameFilter => self.handle_input_key(key),
            InputMode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Enter | KeyCode::Char('d')
        ) {
            self.detail = None;
            return;
        }

        if let Some(detail) = self.detail.as_mut() {
            detail.scroll = match key.code {
                KeyCode::Down | KeyCode::Char('j') => detail.scroll.saturating_add(1),
                KeyCode::Up | KeyCode::Char('k') => detail.scroll.saturating_sub(1),
                KeyCode::PageDown => detail.scroll.saturating_add(10),
                KeyCode::PageUp => detail.scroll.saturating_sub(10),
                _ => detail.scroll,
            };
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> UiAction {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => match self.confirm.take() {
                Some(pending) => UiAction::Send(Command::ConfirmTerminate(pending)),
                None => UiAction::None,
            },
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.confirm = None;
                self.status_message = "Termination cancelled".to_string();
                UiAction::None
            }
            _ => UiAction::None,
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> UiAction {
        let port = self.input_mode == InputMode::PortFilter;
        let changed = match key.code {
            KeyCode::Enter | KeyCode::Esc | KeyCode::Tab => {
                self.input_mode = InputMode::Normal;
                false
            }
            KeyCode::Backspace => {
                if port {
                    self.port_input.pop().is_some()
                } else {
                    self.name_input.pop().is_some()
                }
            }
            KeyCode::Char(c) if port && c.is_ascii_digit() => {
                self.port_input.push(c);
                true
            }
            KeyCode::Char(c) if !port => {
                self.name_input.push(c);
                true
            }
            _ => false,
        };

        if changed {
            UiAction::Send(Command::SetFilter(self.filter_spec()))
        } else {
            UiAction::None
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> UiAction {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return UiAction::Quit,
            KeyCode::Char('h') | KeyCode::Char('?') => self.show_help = true,
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
            KeyCode::Home => self.select_edge(false),
            KeyCode::End => self.select_edge(true),
            KeyCode::Char('r') => return UiAction::Send(Command::Refresh),
            KeyCode::Char('p') | KeyCode::Char('/') => self.input_mode = InputMode::PortFilter,
            KeyCode::Char('n') => self.input_mode = InputMode::NameFilter,
            KeyCode::Char('c') => {
                self.port_input.clear();
                self.name_input.clear();
                return UiAction::Send(Command::SetFilter(FilterSpec::default()));
            }
            KeyCode::Char('T') => {
                self.theme = self.theme.toggle();
                self.status_message = format!("Theme: {:?}", self.theme);
            }
            KeyCode::Enter | KeyCode::Char('d') => match self.selected() {
                Some(record) => return UiAction::Send(Command::RequestDetail(record.pid)),
                None => self.status_message = "No connection selected".to_string(),
            },
            KeyCode::Char(c @ ('x' | 'X')) => match self.selected() {
                Some(record) => {
                    return UiAction::Send(Command::RequestTerminate {
                        pid: record.pid,
                        force: c == 'X',
                    });
                }
                None => self.status_message = "No connection selected".to_string(),
            },
            _ => {}
        }
        UiAction::None
    }
}

pub fn draw_ui(f: &mut Frame, app: &mut AppState) {
    let palette = app.theme.palette();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(3), // Filters
            Constraint::Min(6),    // Connection table
            Constraint::Length(3), // Status bar
        ])
        .split(f.area());

    f.render_widget(Block::default().style(palette.base()), f.area());

    draw_header(f, chunks[0], app, &palette);
    draw_filters(f, chunks[1], app, &palette);
    draw_table(f, chunks[2], app, &palette);
    draw_status_bar(f, chunks[3], app, &palette);

    if app.detail.is_some() {
        draw_detail_overlay(f, f.area(), app, &palette);
    }

    if let Some(pending) = &app.confirm {
        draw_confirm_dialog(f, f.area(), pending, &palette);
    }

    if app.show_help {
        draw_help_overlay(f, f.area(), &palette);
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &AppState, palette: &Palette) {
    let updated = match (app.polling, app.last_updated) {
        (true, _) => "refreshing...".to_string(),
        (false, Some(at)) => format!("updated {}", at.format("%H:%M:%S")),
        (false, None) => "waiting for first poll".to_string(),
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "portwatch - Port & Process Monitor",
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("  ({})", updated), Style::default().fg(palette.muted)),
    ]))
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(header, area);
}

fn draw_filters(f: &mut Frame, area: Rect, app: &AppState, palette: &Palette) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let field = |title: &str, value: &str, active: bool| {
        let border = if active {
            Style::default().fg(palette.key).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.muted)
        };
        let text = if active {
            format!("{}_", value)
        } else if value.is_empty() {
            "(any)".to_string()
        } else {
            value.to_string()
        };
        Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title(title.to_string()),
        )
    };

    f.render_widget(
        field(
            "Port [p]",
            &app.port_input,
            app.input_mode == InputMode::PortFilter,
        ),
        halves[0],
    );
    f.render_widget(
        field(
            "Process [n]",
            &app.name_input,
            app.input_mode == InputMode::NameFilter,
        ),
        halves[1],
    );
}

fn draw_table(f: &mut Frame, area: Rect, app: &mut AppState, palette: &Palette) {
    let header = Row::new(
        ["PID", "Process", "Local address", "Remote address", "Status"]
            .into_iter()
            .map(Cell::from),
    )
    .style(
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = app
        .rows
        .iter()
        .map(|record| {
            Row::new(vec![
                Cell::from(record.pid.to_string()),
                Cell::from(record.process_name.clone()),
                Cell::from(format!("{} {}", record.protocol, record.local_display())),
                Cell::from(record.remote_display()),
                Cell::from(record.status.to_string()),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(8),
        Constraint::Percentage(25),
        Constraint::Percentage(25),
        Constraint::Percentage(25),
        Constraint::Length(12),
    ];

    let title = format!("Connections ({})", app.rows.len());
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(palette.selection)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &AppState, palette: &Palette) {
    // Auto-generate status bar from centralized keybindings
    let mut spans = vec![];

    for (i, (key, description)) in crate::keybindings::get_status_bar_keybindings()
        .iter()
        .enumerate()
    {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        spans.push(Span::styled(
            format!("[{}]", key),
            Style::default().fg(palette.key),
        ));
        spans.push(Span::raw(format!(" {}", description)));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        app.status_message.as_str(),
        Style::default().fg(palette.muted),
    ));

    let status =
        Paragraph::new(vec![Line::from(spans)]).block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn draw_detail_overlay(f: &mut Frame, area: Rect, app: &AppState, palette: &Palette) {
    let Some(detail) = &app.detail else {
        return;
    };

    let text: Vec<Line> = detail
        .lines
        .iter()
        .map(|line| Line::from(line.as_str()))
        .collect();

    let widget = Paragraph::new(text)
        .style(palette.base())
        .wrap(Wrap { trim: false })
        .scroll((detail.scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Process details - PID {}", detail.pid))
                .title_bottom(Line::from("[j/k] Scroll  [Esc] Close").alignment(Alignment::Center))
                .border_style(Style::default().fg(palette.accent)),
        );

    let detail_area = centered_rect(80, 80, area);
    f.render_widget(Clear, detail_area);
    f.render_widget(widget, detail_area);
}

fn draw_confirm_dialog(f: &mut Frame, area: Rect, pending: &PendingTermination, palette: &Palette) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            pending.prompt(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "[y] Yes  [n/Esc] No",
            Style::default().fg(palette.muted),
        )),
    ];

    let title = if pending.force {
        "Force kill"
    } else {
        "Terminate"
    };
    let dialog = Paragraph::new(text)
        .style(palette.base())
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(palette.danger)),
        );

    let dialog_area = centered_rect(50, 25, area);
    f.render_widget(Clear, dialog_area);
    f.render_widget(dialog, dialog_area);
}

fn draw_help_overlay(f: &mut Frame, area: Rect, palette: &Palette) {
    // Auto-generate help text from centralized keybindings
    let mut help_text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "portwatch - Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    let bindings = crate::keybindings::get_all_keybindings();
    for category in crate::keybindings::KeyCategory::all() {
        help_text.push(Line::from(""));
        help_text.push(Line::from(Span::styled(
            category.title(),
            Style::default().fg(palette.accent),
        )));
        for binding in bindings.iter().filter(|b| b.category == category) {
            help_text.push(Line::from(format!(
                "  {:14} - {}",
                binding.key, binding.description
            )));
        }
    }

    help_text.push(Line::from(""));
    help_text.push(Line::from("Press any key to close..."));

    let help = Paragraph::new(help_text).style(palette.base()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Help")
            .border_style(Style::default().fg(palette.accent)),
    );

    let help_area = centered_rect(60, 70, area);
    f.render_widget(Clear, help_area);
    f.render_widget(help, help_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
