use anyhow::Result;
use captable_ledger::{
    ActionController, CapTable, CapTransaction, Ledger, LifecycleAction, MilestoneStatus,
    ShareholderRegistry, TransactionStatus,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Transactions,
    CapTable,
    Shareholders,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Transactions => Page::CapTable,
            Page::CapTable => Page::Shareholders,
            Page::Shareholders => Page::Transactions,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Transactions => Page::Shareholders,
            Page::CapTable => Page::Transactions,
            Page::Shareholders => Page::CapTable,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Transactions => "Transactions",
            Page::CapTable => "Cap Table",
            Page::Shareholders => "Shareholders",
        }
    }
}

/// One-line message in the status bar until the next key press
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub message: String,
    pub is_error: bool,
}

pub struct App {
    ledger: Ledger,
    pub transactions: Vec<CapTransaction>,
    pub registry: ShareholderRegistry,
    pub cap_table: CapTable,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub controller: ActionController,
    pub toast: Option<Toast>,
}

impl App {
    pub fn new(ledger: Ledger) -> Result<Self> {
        let mut app = Self {
            ledger,
            transactions: Vec::new(),
            registry: ShareholderRegistry::new(),
            cap_table: CapTable::new(),
            state: TableState::default(),
            current_page: Page::Transactions,
            show_detail: false,
            controller: ActionController::new(),
            toast: None,
        };
        app.refresh()?;
        Ok(app)
    }

    /// Reload everything from the ledger, keeping the selected row if possible
    pub fn refresh(&mut self) -> Result<()> {
        let selected_id = self.selected_transaction().map(|tx| tx.id.clone());

        self.transactions = self.ledger.transactions()?;
        self.registry = ShareholderRegistry::from_shareholders(self.ledger.shareholders()?);
        self.cap_table = match self.ledger.cap_table() {
            Ok(table) => table,
            Err(e) => {
                self.toast = Some(Toast {
                    message: format!("Cap table unavailable: {}", e),
                    is_error: true,
                });
                CapTable::new()
            }
        };

        let index = selected_id
            .and_then(|id| self.transactions.iter().position(|tx| tx.id == id))
            .or(if self.transactions.is_empty() { None } else { Some(0) });
        self.state.select(index);
        Ok(())
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_transaction(&self) -> Option<&CapTransaction> {
        self.state.selected().and_then(|i| self.transactions.get(i))
    }

    fn row_count(&self) -> usize {
        match self.current_page {
            Page::Transactions => self.transactions.len(),
            Page::CapTable => self.cap_table.ownership().len(),
            Page::Shareholders => self.registry.count(),
        }
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => (i - 1).min(len - 1),
        };
        self.state.select(Some(i));
    }

    fn switch_page(&mut self, page: Page) {
        self.current_page = page;
        let len = self.row_count();
        self.state.select(if len == 0 { None } else { Some(0) });
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    /// Open the confirmation dialog for `action` on the selected transaction
    pub fn request_action(&mut self, action: LifecycleAction) {
        if self.current_page != Page::Transactions {
            return;
        }
        let Some(tx) = self.selected_transaction().cloned() else {
            return;
        };

        // 'c' means retry when the transaction already failed
        let action = match (action, tx.status) {
            (LifecycleAction::Confirm, TransactionStatus::Failed) => LifecycleAction::Retry,
            _ => action,
        };

        if let Err(e) = self.controller.open(&tx, action) {
            self.toast = Some(Toast {
                message: format!("Not available: {}", e),
                is_error: true,
            });
        }
    }

    /// Run the action in the open dialog
    pub fn confirm_dialog(&mut self) -> Result<()> {
        let Some(action) = self.controller.dialog().map(|dialog| dialog.action) else {
            return Ok(());
        };
        match self.controller.confirm(&self.ledger) {
            Some(Ok(tx)) => {
                self.toast = Some(match (&tx.failure_reason, tx.status) {
                    (Some(reason), TransactionStatus::Failed) => Toast {
                        message: format!("Transaction failed: {}", reason),
                        is_error: true,
                    },
                    _ => Toast {
                        message: format!("{} ({})", action.success_message(), tx.status),
                        is_error: false,
                    },
                });
                self.refresh()?;
            }
            // the dialog keeps the error and stays open
            Some(Err(_)) | None => {}
        }
        Ok(())
    }

    /// Returns true when the app should quit
    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Result<bool> {
        if self.controller.is_open() {
            match code {
                KeyCode::Char('y') | KeyCode::Enter => self.confirm_dialog()?,
                KeyCode::Char('n') | KeyCode::Esc => self.controller.dismiss(),
                _ => {}
            }
            return Ok(false);
        }

        self.toast = None;
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Enter => self.toggle_detail(),
            KeyCode::Tab => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.switch_page(self.current_page.previous());
                } else {
                    self.switch_page(self.current_page.next());
                }
            }
            KeyCode::BackTab => self.switch_page(self.current_page.previous()),
            KeyCode::Char('r') => self.refresh()?,
            KeyCode::Char('s') => self.request_action(LifecycleAction::Submit),
            KeyCode::Char('a') => self.request_action(LifecycleAction::Approve),
            KeyCode::Char('c') => self.request_action(LifecycleAction::Confirm),
            KeyCode::Char('x') => self.request_action(LifecycleAction::Cancel),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::Home => self.state.select(if self.row_count() == 0 { None } else { Some(0) }),
            KeyCode::End => {
                let len = self.row_count();
                if len > 0 {
                    self.state.select(Some(len - 1));
                }
            }
            _ => {}
        }
        Ok(false)
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if app.handle_key(key.code, key.modifiers)? {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail && app.current_page == Page::Transactions {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(chunks[1]);

        render_transactions(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        match app.current_page {
            Page::Transactions => render_transactions(f, chunks[1], app),
            Page::CapTable => render_cap_table(f, chunks[1], app),
            Page::Shareholders => render_shareholders(f, chunks[1], app),
        }
    }

    render_status_bar(f, chunks[2], app);

    if app.controller.is_open() {
        render_confirm_dialog(f, app);
    }
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn label(text: &str) -> Span<'static> {
    Span::styled(
        format!("  {}: ", text),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )
}

fn status_color(status: TransactionStatus) -> Color {
    match status {
        TransactionStatus::Draft => Color::Gray,
        TransactionStatus::PendingApproval => Color::Magenta,
        TransactionStatus::Submitted => Color::Yellow,
        TransactionStatus::Confirmed => Color::Green,
        TransactionStatus::Failed => Color::Red,
        TransactionStatus::Cancelled => Color::DarkGray,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::Transactions, Page::CapTable, Page::Shareholders];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let open = app
        .transactions
        .iter()
        .filter(|tx| !tx.status.is_terminal())
        .count();

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Transactions: {} ({} open)", app.transactions.len(), open),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Outstanding: {} shares", app.cap_table.total_shares()),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_transactions(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Created", "Type", "Status", "From", "To", "Class", "Quantity"]
        .iter()
        .map(|h| Cell::from(*h).style(header_style()));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let party = |id: &Option<String>| {
        id.as_deref()
            .map(|id| truncate(&app.registry.display_name(id), 18))
            .unwrap_or_else(|| "-".to_string())
    };

    let rows: Vec<Row> = app
        .transactions
        .iter()
        .map(|tx| {
            let color = status_color(tx.status);
            Row::new(vec![
                Cell::from(tx.created_at.format("%Y-%m-%d").to_string()),
                Cell::from(tx.transaction_type.as_str()),
                Cell::from(tx.status.as_str()).style(Style::default().fg(color)),
                Cell::from(party(&tx.from_shareholder_id)),
                Cell::from(party(&tx.to_shareholder_id)),
                Cell::from(truncate(&tx.share_class, 14)),
                Cell::from(match tx.split_ratio {
                    Some(ratio) => format!("x{}", ratio),
                    None => tx.quantity.to_string(),
                }),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Length(13),
            Constraint::Length(17),
            Constraint::Length(19),
            Constraint::Length(19),
            Constraint::Length(15),
            Constraint::Length(12),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Transactions "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_cap_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["Shareholder", "Shares", "Ownership"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = app
        .cap_table
        .ownership()
        .into_iter()
        .map(|stake| {
            Row::new(vec![
                Cell::from(truncate(&app.registry.display_name(&stake.shareholder_id), 30)),
                Cell::from(stake.shares.to_string()),
                Cell::from(format!("{:.2}%", stake.percent)).style(Style::default().fg(Color::Green)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [Constraint::Length(32), Constraint::Length(16), Constraint::Length(12)],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Cap Table - Fully Diluted "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_shareholders(f: &mut Frame, area: Rect, app: &mut App) {
    let header = Row::new(
        ["Name", "Type", "Tax ID", "Email"]
            .iter()
            .map(|h| Cell::from(*h).style(header_style())),
    )
    .style(Style::default().bg(Color::DarkGray))
    .height(1);

    let rows: Vec<Row> = app
        .registry
        .all()
        .into_iter()
        .map(|holder| {
            Row::new(vec![
                Cell::from(truncate(&holder.name, 30)),
                Cell::from(holder.shareholder_type.as_str()),
                Cell::from(holder.formatted_tax_id().unwrap_or_else(|| "-".to_string())),
                Cell::from(holder.email.clone().unwrap_or_default()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(32),
            Constraint::Length(12),
            Constraint::Length(20),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Shareholders "),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Transaction Details ");

    let Some(tx) = app.selected_transaction() else {
        f.render_widget(Paragraph::new("No transaction selected").block(block), area);
        return;
    };

    let mut content = vec![
        Line::from(""),
        Line::from(vec![label("Type"), Span::raw(tx.transaction_type.as_str())]),
        Line::from(vec![
            label("Status"),
            Span::styled(tx.status.as_str(), Style::default().fg(status_color(tx.status))),
        ]),
        Line::from(vec![label("Class"), Span::raw(tx.share_class.clone())]),
    ];

    if let Some(to_class) = &tx.to_share_class {
        content.push(Line::from(vec![label("Converts to"), Span::raw(to_class.clone())]));
    }
    if let Some(from) = &tx.from_shareholder_id {
        content.push(Line::from(vec![label("From"), Span::raw(app.registry.display_name(from))]));
    }
    if let Some(to) = &tx.to_shareholder_id {
        content.push(Line::from(vec![label("To"), Span::raw(app.registry.display_name(to))]));
    }
    match tx.split_ratio {
        Some(ratio) => content.push(Line::from(vec![label("Split ratio"), Span::raw(ratio.to_string())])),
        None => content.push(Line::from(vec![label("Quantity"), Span::raw(tx.quantity.to_string())])),
    }
    if let Some(value) = tx.total_value() {
        content.push(Line::from(vec![label("Total value"), Span::raw(format!("{:.2}", value))]));
    }
    if tx.requires_board_approval {
        content.push(Line::from(vec![label("Board approval"), Span::raw("required")]));
    }
    if let Some(notes) = &tx.notes {
        content.push(Line::from(vec![label("Notes"), Span::raw(notes.clone())]));
    }
    if let Some(reason) = &tx.failure_reason {
        content.push(Line::from(vec![
            label("Failure"),
            Span::styled(reason.clone(), Style::default().fg(Color::Red)),
        ]));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled("  Timeline", header_style())));
    for milestone in tx.milestones() {
        let (marker, color) = match milestone.status {
            MilestoneStatus::Completed => ("✓", Color::Green),
            MilestoneStatus::Active => ("●", Color::Yellow),
            MilestoneStatus::Pending => ("○", Color::DarkGray),
            MilestoneStatus::Error => ("✗", Color::Red),
        };
        let when = milestone
            .at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        content.push(Line::from(vec![
            Span::styled(format!("    {} ", marker), Style::default().fg(color)),
            Span::styled(format!("{:<18}", milestone.kind.label()), Style::default().fg(color)),
            Span::styled(when, Style::default().fg(Color::DarkGray)),
        ]));
    }

    let actions = tx.available_actions();
    if !actions.is_empty() {
        content.push(Line::from(""));
        let mut spans = vec![Span::styled("  Actions: ", header_style())];
        for action in actions {
            let key = match action {
                LifecycleAction::Submit => "s",
                LifecycleAction::Approve => "a",
                LifecycleAction::Confirm | LifecycleAction::Retry => "c",
                LifecycleAction::Cancel => "x",
            };
            spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
            spans.push(Span::raw(format!(" {}  ", action.label())));
        }
        content.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(content).block(block).wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn render_confirm_dialog(f: &mut Frame, app: &App) {
    let Some(dialog) = app.controller.dialog() else {
        return;
    };
    let area = centered_rect(60, 40, f.size());

    let mut content = vec![
        Line::from(""),
        Line::from(Span::raw(format!("  {}", dialog.message()))),
        Line::from(""),
    ];
    if let Some(error) = &dialog.error {
        content.push(Line::from(Span::styled(
            format!("  Error: {}", error),
            Style::default().fg(Color::Red),
        )));
        content.push(Line::from(""));
    }
    if dialog.pending {
        content.push(Line::from(Span::styled("  Working...", Style::default().fg(Color::Yellow))));
    } else {
        content.push(Line::from(vec![
            Span::raw("  "),
            Span::styled("y", Style::default().fg(Color::Yellow)),
            Span::raw(format!(" {}   ", dialog.action.label())),
            Span::styled("n", Style::default().fg(Color::Yellow)),
            Span::raw(" Back"),
        ]));
    }

    let popup = Paragraph::new(content)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(format!(" {} ", dialog.title())),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let status_spans = match &app.toast {
        Some(toast) => vec![Span::styled(
            format!(" {} ", toast.message),
            Style::default().fg(if toast.is_error { Color::Red } else { Color::Green }),
        )],
        None => {
            let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
            let mut spans = vec![Span::styled(
                format!(" Row: {}/{} ", selected, app.row_count()),
                Style::default().fg(Color::Cyan),
            )];
            for (key, text) in [
                ("Enter", " Details | "),
                ("Tab", " Page | "),
                ("s/a/c/x", " Submit/Approve/Confirm/Cancel | "),
                ("r", " Refresh | "),
            ] {
                spans.push(Span::styled(key, Style::default().fg(Color::Yellow)));
                spans.push(Span::raw(text));
            }
            spans.push(Span::styled("q", Style::default().fg(Color::Red)));
            spans.push(Span::raw(" Quit"));
            spans
        }
    };

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
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
        .split(vertical[1])[1]
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
