use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::cursor;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};

use crate::config::{self, PaletteConfig};
use crate::container::CommandContainer;
use crate::model::{CommandCatalog, CommandItem};
use crate::palette::{Palette, PaletteOutcome, PaletteSettings};
use crate::scroll_lock::ScrollLock;

const MAX_SESSION_LINES: usize = 600;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub cwd: PathBuf,
    pub explicit_config_path: Option<PathBuf>,
    pub items_path: Option<PathBuf>,
    pub once: bool,
}

/// Items plus the settings that were read alongside them.
pub struct LoadedCatalog {
    pub items: Vec<CommandItem>,
    pub duplicate_keys: Vec<String>,
    pub config_path: Option<PathBuf>,
    pub settings: PaletteSettings,
    pub view: PaletteConfig,
}

pub fn load_catalog(runtime: &RuntimeContext) -> Result<LoadedCatalog> {
    let loaded = config::load(&runtime.cwd, runtime.explicit_config_path.as_deref())?;
    let hotkey = loaded.config.hotkey()?;

    let mut catalog = CommandCatalog::from_config(&loaded);
    if let Some(path) = &runtime.items_path {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            runtime.cwd.join(path)
        };
        catalog.extend(CommandCatalog::from_file(&path)?.into_vec());
    }
    let duplicate_keys = catalog.duplicate_keys();

    Ok(LoadedCatalog {
        items: catalog.into_vec(),
        duplicate_keys,
        config_path: loaded.path,
        settings: PaletteSettings {
            hotkey,
            close_on_accept: loaded.config.palette.close_on_accept,
        },
        view: loaded.config.palette,
    })
}

/// Runs the palette host. Returns the accepted item in `--once` mode.
pub fn run_tui(catalog: LoadedCatalog, runtime: RuntimeContext) -> Result<Option<CommandItem>> {
    let mut terminal = init_terminal()?;
    let mut app = AppState::new(catalog, runtime);

    let result = run_loop(&mut terminal, &mut app);
    let restored = restore_terminal(&mut terminal);
    let exit = result?;
    restored?;
    Ok(exit)
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    rollback_on_error(enter_alternate_screen(), || {
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    })
}

fn enter_alternate_screen() -> Result<TuiTerminal> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("failed to create terminal")
}

// Setup that fails halfway must not leave the shell in raw mode.
fn rollback_on_error<T>(result: Result<T>, rollback: impl FnOnce()) -> Result<T> {
    if result.is_err() {
        rollback();
    }
    result
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen,
        cursor::Show
    )
    .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")
}

fn run_loop(terminal: &mut TuiTerminal, app: &mut AppState) -> Result<Option<CommandItem>> {
    loop {
        terminal.draw(|frame| draw_ui(frame, app))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let event = event::read()?;

        match app.on_event(&event) {
            UiAction::None => {}
            UiAction::Quit => return Ok(None),
            UiAction::Finish(item) => return Ok(Some(item)),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum UiAction {
    None,
    Quit,
    Finish(CommandItem),
}

#[derive(Clone, Copy)]
enum SessionLineKind {
    Info,
    Accepted,
    Error,
}

struct SessionLine {
    kind: SessionLineKind,
    text: String,
}

struct AppState {
    palette: Palette,
    scroll_lock: ScrollLock,
    view: PaletteConfig,
    session: Vec<SessionLine>,
    session_scroll: usize,
    session_rows: usize,
    config_path: Option<PathBuf>,
    show_help: bool,
    runtime: RuntimeContext,
}

impl AppState {
    fn new(catalog: LoadedCatalog, runtime: RuntimeContext) -> Self {
        let LoadedCatalog {
            items,
            duplicate_keys,
            config_path,
            settings,
            view,
        } = catalog;
        let count = items.len();
        let scroll_lock = ScrollLock::new();
        let mut app = Self {
            palette: Palette::new(items, settings, scroll_lock.clone()),
            scroll_lock,
            view,
            session: Vec::new(),
            session_scroll: 0,
            session_rows: 1,
            config_path,
            show_help: false,
            runtime,
        };

        app.log_catalog(count, duplicate_keys);
        if app.runtime.once {
            app.palette.open();
        }
        app
    }

    fn apply_catalog(&mut self, catalog: LoadedCatalog) {
        let count = catalog.items.len();
        self.palette.set_settings(catalog.settings);
        self.palette.set_items(catalog.items);
        self.view = catalog.view;
        self.config_path = catalog.config_path;
        self.log_catalog(count, catalog.duplicate_keys);
    }

    fn log_catalog(&mut self, count: usize, duplicate_keys: Vec<String>) {
        self.push_info(format!("Loaded {count} commands"));
        if let Some(path) = &self.config_path {
            self.push_info(format!("Config: {}", path.display()));
        } else {
            self.push_info("Config: none (defaults)");
        }
        for key in duplicate_keys {
            self.push_error(format!("duplicate item key '{key}'"));
        }
    }

    fn on_event(&mut self, event: &Event) -> UiAction {
        match self.palette.handle_event(event) {
            PaletteOutcome::Handled | PaletteOutcome::Opened => UiAction::None,
            PaletteOutcome::Closed => {
                if self.runtime.once {
                    UiAction::Quit
                } else {
                    UiAction::None
                }
            }
            PaletteOutcome::Accepted(item) => {
                self.push_accepted(&item);
                if self.runtime.once {
                    UiAction::Finish(item)
                } else {
                    UiAction::None
                }
            }
            PaletteOutcome::Ignored => match event {
                Event::Key(key) if key.kind == KeyEventKind::Press => self.on_background_key(*key),
                Event::Mouse(mouse) => {
                    self.on_background_mouse(mouse);
                    UiAction::None
                }
                _ => UiAction::None,
            },
        }
    }

    fn on_background_key(&mut self, key: KeyEvent) -> UiAction {
        if self.show_help {
            match key.code {
                KeyCode::Esc | KeyCode::Char('?') => {
                    self.show_help = false;
                    return UiAction::None;
                }
                _ => {
                    self.show_help = false;
                }
            }
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => UiAction::Quit,
            KeyCode::Char('q') | KeyCode::Esc => UiAction::Quit,
            KeyCode::Char('?') => {
                self.show_help = true;
                UiAction::None
            }
            KeyCode::Char('r') => {
                self.reload();
                UiAction::None
            }
            KeyCode::Up => {
                self.scroll_session(1);
                UiAction::None
            }
            KeyCode::Down => {
                self.scroll_session(-1);
                UiAction::None
            }
            KeyCode::PageUp => {
                self.scroll_session(10);
                UiAction::None
            }
            KeyCode::PageDown => {
                self.scroll_session(-10);
                UiAction::None
            }
            _ => UiAction::None,
        }
    }

    fn on_background_mouse(&mut self, mouse: &MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.scroll_session(3),
            MouseEventKind::ScrollDown => self.scroll_session(-3),
            _ => {}
        }
    }

    fn reload(&mut self) {
        match load_catalog(&self.runtime) {
            Ok(catalog) => self.apply_catalog(catalog),
            Err(err) => self.push_error(format!("reload failed: {err:#}")),
        }
    }

    fn push_info<S: Into<String>>(&mut self, text: S) {
        self.push_line(SessionLineKind::Info, text.into());
    }

    fn push_error<S: Into<String>>(&mut self, text: S) {
        self.push_line(SessionLineKind::Error, text.into());
    }

    fn push_accepted(&mut self, item: &CommandItem) {
        self.push_line(
            SessionLineKind::Accepted,
            format!("accepted {} ({})", item.key, item.name),
        );
    }

    fn push_line(&mut self, kind: SessionLineKind, text: String) {
        self.session.push(SessionLine { kind, text });
        self.session_scroll = 0;
        if self.session.len() > MAX_SESSION_LINES {
            let overflow = self.session.len() - MAX_SESSION_LINES;
            self.session.drain(0..overflow);
        }
    }

    fn scroll_session(&mut self, delta: isize) {
        if self.scroll_lock.is_locked() {
            return;
        }
        if delta > 0 {
            self.session_scroll = self
                .session_scroll
                .saturating_add(delta as usize)
                .min(self.max_session_scroll());
        } else if delta < 0 {
            self.session_scroll = self.session_scroll.saturating_sub(delta.unsigned_abs());
        }
    }

    fn max_session_scroll(&self) -> usize {
        self.session.len().saturating_sub(self.session_rows)
    }
}

fn draw_ui(frame: &mut Frame, app: &mut AppState) {
    let bottom_height = if app.show_help { 8 } else { 1 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(bottom_height)])
        .split(frame.area());

    app.session_rows = (chunks[0].height.saturating_sub(2) as usize).max(1);
    app.session_scroll = app.session_scroll.min(app.max_session_scroll());
    draw_session_panel(frame, app, chunks[0]);
    if app.show_help {
        draw_help_panel(frame, app, chunks[1]);
    } else {
        draw_hint_bar(frame, app, chunks[1]);
    }

    if app.palette.is_visible() {
        let area = centered_rect(
            app.view.width_percent(),
            app.view.height_percent(),
            frame.area(),
        );
        app.palette.set_region(area);
        if let Some(container) = app.palette.container() {
            draw_palette(frame, &app.view, container, area);
        }
    }
}

fn draw_session_panel(frame: &mut Frame, app: &AppState, area: Rect) {
    let visible = app.session_rows;
    let offset = app.session_scroll;
    let start = app
        .session
        .len()
        .saturating_sub(visible.saturating_add(offset));

    let items: Vec<ListItem<'_>> = app
        .session
        .iter()
        .skip(start)
        .take(visible)
        .map(render_session_line)
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Session")
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::Rgb(70, 84, 96))),
    );
    frame.render_widget(list, area);
}

fn render_session_line(entry: &SessionLine) -> ListItem<'static> {
    let (prefix, style) = match entry.kind {
        SessionLineKind::Info => ("• ", Style::default().fg(Color::Gray)),
        SessionLineKind::Accepted => (
            "✓ ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        SessionLineKind::Error => ("! ", Style::default().fg(Color::LightRed)),
    };
    ListItem::new(Line::from(vec![
        Span::styled(prefix.to_string(), style),
        Span::styled(entry.text.clone(), style),
    ]))
}

fn draw_hint_bar(frame: &mut Frame, app: &AppState, area: Rect) {
    let selected = app
        .palette
        .container()
        .and_then(CommandContainer::selection);
    let text = if let Some(key) = selected {
        format!("  Enter select {key} · Up/Down move · Esc close")
    } else if app.palette.is_visible() {
        "  Esc close".to_string()
    } else {
        format!("  {} open palette · ? help · q quit", app.palette.hotkey())
    };
    let hint = Paragraph::new(text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Left);
    frame.render_widget(hint, area);
}

fn draw_help_panel(frame: &mut Frame, app: &AppState, area: Rect) {
    let rows = vec![
        Line::from(format!(
            "  {:<14} Toggle the command palette",
            app.palette.hotkey().to_string()
        )),
        Line::from("  Enter          Report the highlighted command"),
        Line::from("  Up/Down        Move the highlight (wraps)"),
        Line::from("  Esc / click    Close the palette"),
        Line::from("  Up/Down/PgUp   Scroll the session log"),
        Line::from("  r              Reload config and items"),
        Line::from("  ? / q          Toggle this help / quit"),
    ];
    let content = Paragraph::new(rows).alignment(Alignment::Left).block(
        Block::default()
            .borders(Borders::NONE)
            .style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(content, area);
}

fn draw_palette(frame: &mut Frame, view: &PaletteConfig, container: &CommandContainer, area: Rect) {
    frame.render_widget(Clear, area);
    let title = format!(
        "{} ({}/{})",
        view.title,
        container.filtered_len(),
        container.total()
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(88, 150, 201)))
        .style(Style::default().bg(Color::Black));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let body = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let query_line = if container.query().is_empty() {
        Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::LightCyan)),
            Span::styled(view.placeholder.clone(), Style::default().fg(Color::DarkGray)),
        ])
    } else {
        Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::LightCyan)),
            Span::styled(container.query().to_string(), Style::default().fg(Color::White)),
        ])
    };
    frame.render_widget(Paragraph::new(query_line), body[0]);

    let x = body[0]
        .x
        .saturating_add(2)
        .saturating_add(query_cursor_column(container.query(), container.query_cursor()))
        .min(body[0].right().saturating_sub(1));
    frame.set_cursor_position((x, body[0].y));

    if container.filtered_len() == 0 {
        let empty = Paragraph::new("No matching commands")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, body[1]);
        return;
    }

    let items: Vec<ListItem<'_>> = container
        .filtered()
        .map(|item| {
            let mut spans = vec![Span::styled(
                item.name.clone(),
                Style::default().fg(Color::White),
            )];
            if let Some(description) = &item.description {
                spans.push(Span::styled(
                    format!(" | {description}"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(container.selected_index());

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(42, 88, 116))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, body[1], &mut list_state);
}

// Display cells before the cursor; wide glyphs take two.
fn query_cursor_column(query: &str, cursor: usize) -> u16 {
    let before: String = query.chars().take(cursor).collect();
    u16::try_from(Span::raw(before).width()).unwrap_or(u16::MAX)
}

fn centered_rect(percent_x: u16, percent_y: u16, rect: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(rect);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::MouseButton;
    use ratatui::backend::TestBackend;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn sample_catalog() -> LoadedCatalog {
        LoadedCatalog {
            items: vec![
                CommandItem {
                    description: Some("Pick a file".to_string()),
                    ..CommandItem::new("a", "Open File")
                },
                CommandItem::new("b", "Open Folder"),
                CommandItem::new("c", "Save"),
            ],
            duplicate_keys: Vec::new(),
            config_path: None,
            settings: PaletteSettings::default(),
            view: PaletteConfig::default(),
        }
    }

    fn test_runtime(once: bool) -> RuntimeContext {
        RuntimeContext {
            cwd: std::env::temp_dir(),
            explicit_config_path: None,
            items_path: None,
            once,
        }
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    fn plain(code: KeyCode) -> Event {
        key(code, KeyModifiers::NONE)
    }

    fn hotkey() -> Event {
        key(KeyCode::Char('p'), KeyModifiers::CONTROL)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    fn render(app: &mut AppState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
        terminal.draw(|frame| draw_ui(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn accepted_item_is_logged_and_palette_closes() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        assert_eq!(app.on_event(&hotkey()), UiAction::None);
        assert!(app.palette.is_visible());

        for ch in "save".chars() {
            app.on_event(&plain(KeyCode::Char(ch)));
        }
        assert_eq!(app.on_event(&plain(KeyCode::Enter)), UiAction::None);
        assert!(!app.palette.is_visible());
        assert_eq!(app.session.last().unwrap().text, "accepted c (Save)");
    }

    #[test]
    fn once_mode_finishes_on_accept_and_quits_on_close() {
        let mut app = AppState::new(sample_catalog(), test_runtime(true));
        assert!(app.palette.is_visible());
        app.on_event(&plain(KeyCode::Down));
        assert_eq!(
            app.on_event(&plain(KeyCode::Enter)),
            UiAction::Finish(CommandItem::new("b", "Open Folder"))
        );

        let mut app = AppState::new(sample_catalog(), test_runtime(true));
        assert_eq!(app.on_event(&plain(KeyCode::Esc)), UiAction::Quit);
    }

    #[test]
    fn escape_closes_palette_before_quitting() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        app.on_event(&hotkey());
        assert_eq!(app.on_event(&plain(KeyCode::Esc)), UiAction::None);
        assert!(!app.palette.is_visible());
        assert_eq!(app.on_event(&plain(KeyCode::Esc)), UiAction::Quit);
    }

    #[test]
    fn background_scroll_is_locked_while_palette_is_open() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        for i in 0..20 {
            app.push_info(format!("line {i}"));
        }

        app.on_event(&mouse(MouseEventKind::ScrollUp, 0, 0));
        assert_eq!(app.session_scroll, 3);
        app.on_event(&plain(KeyCode::Down));
        assert_eq!(app.session_scroll, 2);

        app.on_event(&hotkey());
        app.scroll_session(5);
        app.on_event(&mouse(MouseEventKind::ScrollUp, 0, 0));
        assert_eq!(app.session_scroll, 2);

        app.on_event(&hotkey());
        app.on_event(&plain(KeyCode::PageUp));
        assert_eq!(app.session_scroll, 12);
    }

    #[test]
    fn drawn_overlay_defines_outside_click_region() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        app.on_event(&hotkey());
        let screen = render(&mut app);
        assert!(screen.contains("Commands (3/3)"));
        assert!(screen.contains("Type to search..."));
        assert!(screen.contains("Open File | Pick a file"));

        let region = centered_rect(60, 50, Rect::new(0, 0, 60, 20));
        let inside = mouse(
            MouseEventKind::Down(MouseButton::Left),
            region.x + 1,
            region.y + 1,
        );
        app.on_event(&inside);
        assert!(app.palette.is_visible());

        app.on_event(&mouse(MouseEventKind::Down(MouseButton::Left), 0, 0));
        assert!(!app.palette.is_visible());
        assert!(!app.scroll_lock.is_locked());
    }

    #[test]
    fn empty_filter_renders_placeholder_row() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        app.on_event(&hotkey());
        for ch in "xyz".chars() {
            app.on_event(&plain(KeyCode::Char(ch)));
        }
        let screen = render(&mut app);
        assert!(screen.contains("Commands (0/3)"));
        assert!(screen.contains("No matching commands"));
    }

    #[test]
    fn duplicate_keys_are_reported_in_session() {
        let mut catalog = sample_catalog();
        catalog.duplicate_keys = vec!["a".to_string()];
        let app = AppState::new(catalog, test_runtime(false));
        assert!(
            app.session
                .iter()
                .any(|line| line.text == "duplicate item key 'a'")
        );
    }

    #[test]
    fn failed_reload_keeps_current_items() {
        let mut runtime = test_runtime(false);
        runtime.items_path = Some(runtime.cwd.join("cmdpal-missing-items-file.json"));
        let mut app = AppState::new(sample_catalog(), runtime);

        app.on_event(&plain(KeyCode::Char('r')));
        assert!(
            app.session
                .last()
                .unwrap()
                .text
                .starts_with("reload failed:")
        );
        assert_eq!(app.palette.item_count(), 3);
    }

    #[test]
    fn session_scroll_stops_when_oldest_line_is_on_screen() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        render(&mut app);
        for i in 0..40 {
            app.push_info(format!("line {i}"));
        }

        // 60x20 leaves 17 rows inside the session border for 42 lines.
        for _ in 0..60 {
            app.on_event(&plain(KeyCode::Up));
        }
        assert_eq!(app.session_scroll, 25);
        assert!(render(&mut app).contains("Loaded 3 commands"));

        app.on_event(&plain(KeyCode::Down));
        assert_eq!(app.session_scroll, 24);
        let screen = render(&mut app);
        assert!(!screen.contains("Loaded 3 commands"));
        assert!(screen.contains("Config: none (defaults)"));
    }

    #[test]
    fn drawing_clamps_offset_taken_before_first_frame() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        for i in 0..40 {
            app.push_info(format!("line {i}"));
        }
        app.scroll_session(100);
        assert_eq!(app.session_scroll, 41);

        render(&mut app);
        assert_eq!(app.session_scroll, 25);
        app.on_event(&plain(KeyCode::Down));
        assert_eq!(app.session_scroll, 24);
    }

    #[test]
    fn session_log_keeps_only_newest_lines() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        for i in 0..MAX_SESSION_LINES + 5 {
            app.push_info(format!("line {i}"));
        }

        // two startup lines plus line 0..=4 fall off the front
        assert_eq!(app.session.len(), MAX_SESSION_LINES);
        assert_eq!(app.session.first().unwrap().text, "line 5");
        assert_eq!(
            app.session.last().unwrap().text,
            format!("line {}", MAX_SESSION_LINES + 4)
        );
        assert_eq!(app.session_scroll, 0);
    }

    #[test]
    fn reload_updates_items_and_settings_in_place() {
        let root = make_temp_dir();
        let config_path = root.join("cmdpal.toml");
        fs::write(
            &config_path,
            r#"
[[items]]
key = "a"
name = "Open File"
"#,
        )
        .unwrap();
        let mut runtime = test_runtime(false);
        runtime.cwd = root.clone();
        let catalog = load_catalog(&runtime).unwrap();
        let mut app = AppState::new(catalog, runtime);
        assert_eq!(app.palette.item_count(), 1);

        fs::write(
            &config_path,
            r#"
hotkey = "alt+k"

[palette]
title = "Actions"

[[items]]
key = "a"
name = "Open File"

[[items]]
key = "b"
name = "Build"
"#,
        )
        .unwrap();
        app.on_event(&plain(KeyCode::Char('r')));
        assert_eq!(app.palette.item_count(), 2);
        assert!(app.session.iter().any(|line| line.text == "Loaded 2 commands"));

        app.on_event(&hotkey());
        assert!(!app.palette.is_visible());
        app.on_event(&key(KeyCode::Char('k'), KeyModifiers::ALT));
        assert!(app.palette.is_visible());
        assert!(render(&mut app).contains("Actions (2/2)"));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn failed_setup_rolls_back_terminal_modes() {
        let mut rolled_back = false;
        let result: Result<()> =
            rollback_on_error(Err(anyhow::anyhow!("no tty")), || rolled_back = true);
        assert!(result.is_err());
        assert!(rolled_back);

        let mut rolled_back = false;
        let result = rollback_on_error(Ok(7), || rolled_back = true);
        assert_eq!(result.unwrap(), 7);
        assert!(!rolled_back);
    }

    #[test]
    fn cursor_column_counts_display_width() {
        assert_eq!(query_cursor_column("ab", 1), 1);
        assert_eq!(query_cursor_column("日本", 2), 4);
        assert_eq!(query_cursor_column("日本語", 1), 2);
        assert_eq!(query_cursor_column("", 0), 0);
    }

    #[test]
    fn terminal_cursor_follows_wide_query_text() {
        let mut app = AppState::new(sample_catalog(), test_runtime(false));
        app.on_event(&hotkey());
        for ch in "日本".chars() {
            app.on_event(&plain(KeyCode::Char(ch)));
        }

        let mut terminal = Terminal::new(TestBackend::new(60, 20)).unwrap();
        terminal.draw(|frame| draw_ui(frame, &mut app)).unwrap();
        let region = centered_rect(60, 50, Rect::new(0, 0, 60, 20));
        let cursor = terminal.get_cursor_position().unwrap();
        assert_eq!(cursor.x, region.x + 1 + 2 + 4);
        assert_eq!(cursor.y, region.y + 1);
    }

    fn make_temp_dir() -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!("cmdpal-app-test-{nonce}"));
        fs::create_dir_all(&path).unwrap();
        path
    }
}
